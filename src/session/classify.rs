//! Response classification
//!
//! Maps a raw `(status, body)` pair onto success or one of the
//! [`SessionError`] variants. The checks run in a fixed precedence:
//!
//! | Order | Condition | Outcome |
//! |-------|-----------|---------|
//! | 1 | HTTP 404 | `NotFound` |
//! | 1 | HTTP 5xx | `Transport` |
//! | 2 | Unstructured body with a limit phrase | `Limit` |
//! | 2 | Unstructured body, HTTP 400 | `NotAllowed` |
//! | 2 | Unstructured body, anything else | `Transport` |
//! | 3 | `status: "fail"` with a limit phrase | `Limit` |
//! | 3 | `status: "fail"` otherwise | `SoftFail` |
//! | 4 | `status` neither `"ok"` nor `"fail"` | `Transport` |
//! | 5 | otherwise | success |

use crate::{SessionError, SessionResult};
use serde_json::{Map, Value};

/// Phrases the remote service uses when it throttles a session
pub const LIMIT_MARKERS: &[&str] = &[
    "please wait a few minutes before you try again",
    "temporarily blocked",
    "rate limited",
];

/// Returns true if `text` carries a rate-limit phrase (case-insensitive)
pub fn contains_limit_marker(text: &str) -> bool {
    let lowered = text.to_lowercase();
    LIMIT_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Classifies the response of an action or query call
///
/// On success the parsed JSON object is returned.
pub fn classify_json(status: u16, body: &str) -> SessionResult<Value> {
    if let Some(err) = classify_status(status) {
        return Err(err);
    }

    let object = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map,
        _ => return Err(classify_unstructured(status, body)),
    };

    match object.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(Value::Object(object)),
        Some("fail") => Err(classify_failure(&object)),
        other => Err(SessionError::Transport(format!(
            "unexpected response status marker: {:?}",
            other
        ))),
    }
}

/// Classifies the response of an HTML page read
///
/// Pages are never structured, so the unstructured rules apply with a 2xx
/// status counting as success.
pub fn classify_page(status: u16, body: String) -> SessionResult<String> {
    if let Some(err) = classify_status(status) {
        return Err(err);
    }
    if contains_limit_marker(&body) {
        return Err(SessionError::Limit);
    }
    if (200..300).contains(&status) {
        return Ok(body);
    }
    Err(classify_unstructured(status, &body))
}

fn classify_status(status: u16) -> Option<SessionError> {
    match status {
        404 => Some(SessionError::NotFound),
        s if s >= 500 => Some(SessionError::Transport(format!("HTTP {}", s))),
        _ => None,
    }
}

fn classify_unstructured(status: u16, body: &str) -> SessionError {
    if contains_limit_marker(body) {
        return SessionError::Limit;
    }
    match status {
        400 => SessionError::NotAllowed,
        200 => SessionError::Transport("unstructured response body".to_string()),
        s => SessionError::Transport(format!("HTTP {} with unstructured body", s)),
    }
}

fn classify_failure(object: &Map<String, Value>) -> SessionError {
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if contains_limit_marker(message) {
        SessionError::Limit
    } else {
        SessionError::SoftFail(message.to_string())
    }
}
