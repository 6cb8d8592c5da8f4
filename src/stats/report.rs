//! Statistics generation from the graph database

use crate::storage::{Storage, StorageResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Graph table summary
#[derive(Debug, Clone)]
pub struct GraphStatistics {
    /// Total number of nodes ever observed
    pub total_nodes: u64,

    /// Nodes waiting to be followed
    pub candidates: u64,

    /// Nodes currently believed followed
    pub followed: u64,

    /// Followed nodes whose window has elapsed
    pub due_for_unfollow: u64,

    /// Nodes whose followers have not been fetched yet
    pub unexpanded: u64,

    /// Node count per BFS depth
    pub by_depth: HashMap<u32, u64>,
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `unfollow_threshold` - Follows at or before this time count as due
pub fn load_statistics(
    storage: &dyn Storage,
    unfollow_threshold: DateTime<Utc>,
) -> StorageResult<GraphStatistics> {
    Ok(GraphStatistics {
        total_nodes: storage.count_nodes()?,
        candidates: storage.count_candidates()?,
        followed: storage.count_followed()?,
        due_for_unfollow: storage.count_nodes_to_unfollow(unfollow_threshold)?,
        unexpanded: storage.count_unexpanded()?,
        by_depth: storage.get_depth_breakdown()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &GraphStatistics) {
    println!("=== Graph Statistics ===\n");

    println!("Overview:");
    println!("  Total nodes: {}", stats.total_nodes);
    println!("  Follow candidates: {}", stats.candidates);
    println!("  Currently followed: {}", stats.followed);
    println!("  Due for unfollowing: {}", stats.due_for_unfollow);
    println!("  Awaiting expansion: {}", stats.unexpanded);
    println!();

    println!("Nodes by Depth:");
    let mut depths: Vec<_> = stats.by_depth.iter().collect();
    depths.sort_by_key(|(depth, _)| **depth);

    for (depth, count) in depths {
        let percentage = if stats.total_nodes > 0 {
            (*count as f64 / stats.total_nodes as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", depth, count, percentage);
    }
}
