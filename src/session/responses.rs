//! Typed views over loosely structured responses
//!
//! The remote service returns undocumented JSON, sometimes embedded inside
//! an HTML page. Every lookup here is explicit; anything missing or of the
//! wrong shape becomes [`SessionError::Transport`].

use crate::{SessionError, SessionResult};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;

/// Marker preceding the JSON blob embedded in browsing pages
const SHARED_DATA_MARKER: &str = "window._sharedData";

/// Locations of media lists inside the embedded page data, newest layout last
const MEDIA_NODE_POINTERS: &[&str] = &[
    "/entry_data/TagPage/0/tag/top_posts/nodes",
    "/entry_data/TagPage/0/tag/media/nodes",
    "/entry_data/TagPage/0/graphql/hashtag/edge_hashtag_top_posts/edges",
    "/entry_data/TagPage/0/graphql/hashtag/edge_hashtag_to_media/edges",
];

/// Identifier that may arrive as a JSON string or integer
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for String {
    fn from(id: RawId) -> Self {
        match id {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// One account listed on a follower/following page
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountRef {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub username: String,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

#[derive(Debug, Deserialize)]
struct RawPageInfo {
    end_cursor: Option<String>,
    has_next_page: bool,
}

#[derive(Debug, Deserialize)]
struct RawEdge {
    page_info: RawPageInfo,
    nodes: Vec<AccountRef>,
}

/// One page of an account edge (followers or follows)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPage {
    pub accounts: Vec<AccountRef>,
    /// Cursor of the next page; `None` when this is the last page
    pub next_cursor: Option<String>,
}

impl AccountPage {
    /// Extracts the page stored under `edge` in a query response
    pub fn from_response(response: &Value, edge: &str) -> SessionResult<Self> {
        let raw = response
            .get(edge)
            .ok_or_else(|| SessionError::Transport(format!("response has no '{}' edge", edge)))?;
        let raw: RawEdge = serde_json::from_value(raw.clone()).map_err(|e| {
            SessionError::Transport(format!("malformed '{}' edge: {}", edge, e))
        })?;

        let next_cursor = if raw.page_info.has_next_page {
            raw.page_info.end_cursor.filter(|c| !c.is_empty())
        } else {
            None
        };

        Ok(Self {
            accounts: raw.nodes,
            next_cursor,
        })
    }
}

/// Extracts media identifiers from a hashtag browsing page
///
/// Identifiers are returned in page order with duplicates removed.
pub fn parse_tag_media(html: &str) -> SessionResult<Vec<String>> {
    let data = extract_shared_data(html)?;

    let mut found_list = false;
    let mut media = Vec::new();
    for pointer in MEDIA_NODE_POINTERS {
        let Some(nodes) = data.pointer(pointer).and_then(Value::as_array) else {
            continue;
        };
        found_list = true;
        for node in nodes {
            // Graph layouts wrap each item in an `{ "node": ... }` edge.
            let item = node.get("node").unwrap_or(node);
            let Some(id) = item.get("id").and_then(id_string) else {
                continue;
            };
            if !media.contains(&id) {
                media.push(id);
            }
        }
    }

    if !found_list {
        return Err(SessionError::Transport(
            "embedded page data has no media list".to_string(),
        ));
    }
    Ok(media)
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Finds the `window._sharedData = {...};` script and parses its JSON
fn extract_shared_data(html: &str) -> SessionResult<Value> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("script")
        .map_err(|e| SessionError::Transport(format!("invalid selector: {:?}", e)))?;

    for script in document.select(&selector) {
        let text: String = script.text().collect();
        let Some(start) = text.find(SHARED_DATA_MARKER) else {
            continue;
        };
        let rest = &text[start + SHARED_DATA_MARKER.len()..];
        let Some(eq) = rest.find('=') else {
            continue;
        };
        let json = rest[eq + 1..].trim().trim_end_matches(';').trim();
        return serde_json::from_str(json).map_err(|e| {
            SessionError::Transport(format!("malformed embedded page data: {}", e))
        });
    }

    Err(SessionError::Transport(
        "page has no embedded data".to_string(),
    ))
}
