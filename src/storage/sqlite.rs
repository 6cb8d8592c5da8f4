//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{from_db_time, to_db_time, GraphNode, NewGraphNode};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;

const NODE_COLUMNS: &str = "remote_id, username, discovered_at, depth, is_followed, followed_at, \
                            followers_expanded";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = init_database(path)?;
        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn query_nodes(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> StorageResult<Vec<GraphNode>> {
        let mut stmt = self.conn.prepare(sql)?;
        let nodes = stmt
            .query_map(params, node_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(nodes)
    }

    fn count(&self, sql: &str, params: impl rusqlite::Params) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(sql, params, |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn parse_time(idx: usize, value: String) -> rusqlite::Result<DateTime<Utc>> {
    from_db_time(&value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid timestamp '{}'", value).into(),
        )
    })
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<GraphNode> {
    let followed_at: Option<String> = row.get(5)?;
    Ok(GraphNode {
        remote_id: row.get(0)?,
        username: row.get(1)?,
        discovered_at: parse_time(2, row.get(2)?)?,
        depth: row.get(3)?,
        is_followed: row.get::<_, i32>(4)? != 0,
        followed_at: followed_at.map(|s| parse_time(5, s)).transpose()?,
        followers_expanded: row.get::<_, i32>(6)? != 0,
    })
}

impl Storage for SqliteStorage {
    // ===== Node Management =====

    fn insert_if_absent(&mut self, node: &NewGraphNode) -> StorageResult<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO graph_nodes (remote_id, username, discovered_at, depth, followed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                node.remote_id,
                node.username,
                to_db_time(node.discovered_at),
                node.depth,
                node.followed_at.map(to_db_time),
            ],
        )?;
        Ok(inserted > 0)
    }

    fn get_node(&self, remote_id: &str) -> StorageResult<Option<GraphNode>> {
        let node = self
            .conn
            .query_row(
                &format!("SELECT {} FROM graph_nodes WHERE remote_id = ?1", NODE_COLUMNS),
                params![remote_id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    // ===== Crawler Selections =====

    fn count_candidates(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM graph_nodes WHERE followed_at IS NULL",
            [],
        )
    }

    fn unexpanded_nodes(&self, limit: u32) -> StorageResult<Vec<GraphNode>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM graph_nodes WHERE followers_expanded = 0
                 ORDER BY depth ASC, discovered_at ASC, id ASC LIMIT ?1",
                NODE_COLUMNS
            ),
            params![limit],
        )
    }

    fn mark_followers_expanded(&mut self, remote_id: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE graph_nodes SET followers_expanded = 1 WHERE remote_id = ?1",
            params![remote_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NodeNotFound(remote_id.to_string()));
        }
        Ok(())
    }

    // ===== Follow Cycle Selections =====

    fn follow_candidates(&self) -> StorageResult<Vec<GraphNode>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM graph_nodes WHERE followed_at IS NULL
                 ORDER BY depth ASC, discovered_at ASC, id ASC",
                NODE_COLUMNS
            ),
            [],
        )
    }

    fn nodes_to_unfollow(&self, threshold: DateTime<Utc>) -> StorageResult<Vec<GraphNode>> {
        self.query_nodes(
            &format!(
                "SELECT {} FROM graph_nodes WHERE is_followed = 1 AND followed_at <= ?1
                 ORDER BY followed_at ASC, id ASC",
                NODE_COLUMNS
            ),
            params![to_db_time(threshold)],
        )
    }

    fn count_nodes_to_unfollow(&self, threshold: DateTime<Utc>) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM graph_nodes WHERE is_followed = 1 AND followed_at <= ?1",
            params![to_db_time(threshold)],
        )
    }

    fn set_follow_state(
        &mut self,
        remote_id: &str,
        is_followed: bool,
        followed_at: Option<DateTime<Utc>>,
    ) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE graph_nodes SET is_followed = ?1, followed_at = ?2 WHERE remote_id = ?3",
            params![is_followed as i32, followed_at.map(to_db_time), remote_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NodeNotFound(remote_id.to_string()));
        }
        Ok(())
    }

    fn set_unfollowed(&mut self, remote_id: &str) -> StorageResult<()> {
        let updated = self.conn.execute(
            "UPDATE graph_nodes SET is_followed = 0 WHERE remote_id = ?1",
            params![remote_id],
        )?;
        if updated == 0 {
            return Err(StorageError::NodeNotFound(remote_id.to_string()));
        }
        Ok(())
    }

    fn upsert_followed(
        &mut self,
        remote_id: &str,
        username: &str,
        threshold: DateTime<Utc>,
    ) -> StorageResult<()> {
        let threshold = to_db_time(threshold);
        self.conn.execute(
            "INSERT INTO graph_nodes (remote_id, username, discovered_at, depth, is_followed, followed_at)
             VALUES (?1, ?2, ?3, 0, 1, ?4)
             ON CONFLICT(remote_id) DO UPDATE SET
                username = excluded.username,
                depth = 0,
                is_followed = 1,
                followed_at = CASE
                    WHEN followed_at IS NULL OR followed_at > excluded.followed_at
                    THEN excluded.followed_at
                    ELSE followed_at
                END",
            params![remote_id, username, to_db_time(Utc::now()), threshold],
        )?;
        Ok(())
    }

    // ===== Statistics =====

    fn count_nodes(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM graph_nodes", [])
    }

    fn count_followed(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM graph_nodes WHERE is_followed = 1", [])
    }

    fn count_unexpanded(&self) -> StorageResult<u64> {
        self.count(
            "SELECT COUNT(*) FROM graph_nodes WHERE followers_expanded = 0",
            [],
        )
    }

    fn get_depth_breakdown(&self) -> StorageResult<HashMap<u32, u64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT depth, COUNT(*) FROM graph_nodes GROUP BY depth ORDER BY depth")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut breakdown = HashMap::new();
        for row in rows {
            let (depth, count) = row?;
            breakdown.insert(depth, count as u64);
        }

        Ok(breakdown)
    }
}

/// Initializes or opens a database at the given path
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
