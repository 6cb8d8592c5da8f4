//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Social-Tide database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per remote account ever observed
CREATE TABLE IF NOT EXISTS graph_nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id TEXT NOT NULL UNIQUE,
    username TEXT NOT NULL,
    discovered_at TEXT NOT NULL,
    depth INTEGER NOT NULL,
    is_followed INTEGER NOT NULL DEFAULT 0,
    followed_at TEXT,
    followers_expanded INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_graph_nodes_unfollow
    ON graph_nodes(is_followed, followed_at);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_follow
    ON graph_nodes(followed_at, depth, discovered_at);
CREATE INDEX IF NOT EXISTS idx_graph_nodes_expansion
    ON graph_nodes(followers_expanded, depth, discovered_at);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
