//! Social-Tide: a rate-governed social graph agent
//!
//! This crate crawls the "followed-by" graph of a web service that has no
//! public API, keeps a persistent pool of follow candidates, drives a
//! follow/unfollow cycle over it, and likes media discovered through hashtags.
//! Every outbound call is paced by an adaptive throttle shared per session.

pub mod config;
pub mod crawler;
pub mod follow;
pub mod media;
pub mod service;
pub mod session;
pub mod stats;
pub mod storage;

use thiserror::Error;

/// Main error type for Social-Tide operations
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    /// The configuration leaves a component with nothing to do. Fatal to that
    /// component only.
    #[error("{component} is disabled: {reason}")]
    Disabled {
        component: &'static str,
        reason: String,
    },
}

/// Classified outcome of a failed remote call
///
/// Target-specific variants (`NotAllowed`, `NotFound`) are permanent for the
/// target that produced them. `Limit` and `Transport` are transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Rate limited by remote service")]
    Limit,

    #[error("Action not allowed")]
    NotAllowed,

    #[error("Target not found")]
    NotFound,

    #[error("Remote service reported failure: {0}")]
    SoftFail(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl SessionError {
    /// Returns true for errors that permanently apply to one target
    pub fn is_target_specific(&self) -> bool {
        matches!(self, Self::NotAllowed | Self::NotFound)
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transport("Request timeout".to_string())
        } else if e.is_connect() {
            Self::Transport("Connection refused".to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Result type alias for Social-Tide operations
pub type Result<T> = std::result::Result<T, BotError>;

/// Result type alias for remote calls
pub type SessionResult<T> = std::result::Result<T, SessionError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::GraphCrawler;
pub use follow::FollowCycle;
pub use media::MediaPipeline;
pub use session::RemoteSession;
pub use stats::StatsService;
pub use storage::{GraphNode, SqliteStorage, Storage};
