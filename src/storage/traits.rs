//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::storage::{GraphNode, NewGraphNode};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Each mutable column has exactly one writer: the crawler owns
/// `followers_expanded`, the follow cycle owns `is_followed` and `followed_at`.
/// Updates touch only their own columns, so interleaved writers never
/// overwrite each other's transitions.
pub trait Storage {
    // ===== Node Management =====

    /// Inserts a node unless one with the same `remote_id` already exists
    ///
    /// # Returns
    ///
    /// `true` if the node was inserted, `false` if it was already present.
    /// An existing node is left untouched, including its depth.
    fn insert_if_absent(&mut self, node: &NewGraphNode) -> StorageResult<bool>;

    /// Gets a node by its remote identifier
    fn get_node(&self, remote_id: &str) -> StorageResult<Option<GraphNode>>;

    // ===== Crawler Selections =====

    /// Counts follow candidates (`followed_at IS NULL`)
    fn count_candidates(&self) -> StorageResult<u64>;

    /// Gets up to `limit` unexpanded nodes in BFS order
    /// (`depth`, then `discovered_at`, ascending)
    fn unexpanded_nodes(&self, limit: u32) -> StorageResult<Vec<GraphNode>>;

    /// Marks a node's followers as fetched (or permanently unavailable)
    fn mark_followers_expanded(&mut self, remote_id: &str) -> StorageResult<()>;

    // ===== Follow Cycle Selections =====

    /// Gets all follow candidates in BFS order
    fn follow_candidates(&self) -> StorageResult<Vec<GraphNode>>;

    /// Gets followed nodes whose `followed_at <= threshold` (inclusive)
    fn nodes_to_unfollow(&self, threshold: DateTime<Utc>) -> StorageResult<Vec<GraphNode>>;

    /// Counts followed nodes whose `followed_at <= threshold`
    fn count_nodes_to_unfollow(&self, threshold: DateTime<Utc>) -> StorageResult<u64>;

    /// Records the follow state of a node
    fn set_follow_state(
        &mut self,
        remote_id: &str,
        is_followed: bool,
        followed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()>;

    /// Records that a node is no longer followed, keeping `followed_at`
    fn set_unfollowed(&mut self, remote_id: &str) -> StorageResult<()>;

    /// Upserts an account known to be followed so that it is unfollowed as
    /// soon as `threshold` has passed
    ///
    /// Existing nodes keep the earlier of their `followed_at` and `threshold`.
    fn upsert_followed(
        &mut self,
        remote_id: &str,
        username: &str,
        threshold: DateTime<Utc>,
    ) -> StorageResult<()>;

    // ===== Statistics =====

    /// Gets total node count
    fn count_nodes(&self) -> StorageResult<u64>;

    /// Counts nodes currently believed followed
    fn count_followed(&self) -> StorageResult<u64>;

    /// Counts nodes whose followers have not been expanded
    fn count_unexpanded(&self) -> StorageResult<u64>;

    /// Gets node count breakdown by depth
    fn get_depth_breakdown(&self) -> StorageResult<HashMap<u32, u64>>;
}
