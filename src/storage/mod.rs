//! Storage module for persisting the social graph
//!
//! This module handles all database operations for the agent, including:
//! - SQLite database initialization and schema management
//! - Graph node persistence with first-writer-wins inserts
//! - The ordered selections used by the crawler and the follow cycle
//! - Statistics queries for the `stats` command

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{init_database, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Store handle shared by the crawler and the follow cycle
///
/// Guards must be dropped before any `.await`.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Opens the database at `path` and wraps it for sharing between tasks
pub fn open_shared(path: &Path) -> StorageResult<SharedStorage> {
    Ok(Arc::new(Mutex::new(SqliteStorage::new(path)?)))
}

/// Locks a shared store, mapping lock poisoning into a storage error
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage
        .lock()
        .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))
}

/// One remote account observed during crawling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub remote_id: String,
    pub username: String,
    pub discovered_at: DateTime<Utc>,
    pub depth: u32,
    pub is_followed: bool,
    pub followed_at: Option<DateTime<Utc>>,
    pub followers_expanded: bool,
}

impl GraphNode {
    /// Returns true if this node is waiting to be followed
    pub fn is_candidate(&self) -> bool {
        self.followed_at.is_none()
    }

    /// Returns true if this node is due for unfollowing at `threshold`
    pub fn is_unfollow_due(&self, threshold: DateTime<Utc>) -> bool {
        self.is_followed && self.followed_at.map(|at| at <= threshold).unwrap_or(false)
    }
}

/// Fields supplied when a node is first inserted
#[derive(Debug, Clone)]
pub struct NewGraphNode {
    pub remote_id: String,
    pub username: String,
    pub depth: u32,
    pub discovered_at: DateTime<Utc>,
    /// Pre-set follow timestamp; `None` makes the node a follow candidate
    pub followed_at: Option<DateTime<Utc>>,
}

impl NewGraphNode {
    /// A freshly discovered follow candidate
    pub fn candidate(remote_id: &str, username: &str, depth: u32, now: DateTime<Utc>) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            username: username.to_string(),
            depth,
            discovered_at: now,
            followed_at: None,
        }
    }
}

/// Formats a timestamp for storage
///
/// Fixed-width UTC with microseconds, so text comparison in SQL matches
/// chronological order.
pub fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parses a stored timestamp
pub fn from_db_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
