//! Breadth-first expansion of the follow candidate pool
//!
//! The crawler walks the "followed-by" relation outwards from the seed
//! account. Each unexpanded node has a bounded number of follower pages
//! fetched; every follower not yet in the graph is inserted one level deeper
//! than its parent. Expansion stops as soon as the candidate pool reaches its
//! target size.
//!
//! The crawler writes only `followers_expanded` on existing rows, so it can
//! run alongside [`FollowCycle`](crate::follow::FollowCycle) on the same
//! store.

use crate::config::FollowingConfig;
use crate::session::RemoteSession;
use crate::stats::{Counter, StatsService};
use crate::storage::{lock, GraphNode, NewGraphNode, SharedStorage, Storage};
use crate::{BotError, ConfigError, Result, SessionError};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Number of unexpanded nodes loaded from storage at a time
const EXPANSION_BATCH: u32 = 50;

/// Fixed pauses of the crawl loop
#[derive(Debug, Clone, Copy)]
pub struct CrawlerPacing {
    /// Pause after a cycle aborted on a non-limit error
    pub error_pause: Duration,
    /// Pause after a completed cycle
    pub idle_pause: Duration,
}

impl Default for CrawlerPacing {
    fn default() -> Self {
        Self {
            error_pause: Duration::from_secs(5),
            idle_pause: Duration::from_secs(60),
        }
    }
}

/// How a crawl cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The pool was already at its target; nothing was fetched
    Saturated { candidates: u64 },
    /// Expansion stopped because the pool reached its target
    TargetReached { inserted: u64, expanded: u64 },
    /// Every node has been expanded
    Exhausted { inserted: u64, expanded: u64 },
}

/// Keeps the candidate pool at or above its target size
pub struct GraphCrawler {
    session: Arc<RemoteSession>,
    storage: SharedStorage,
    stats: Arc<StatsService>,
    target: u64,
    pages_per_user: u32,
    page_size: u32,
    pacing: CrawlerPacing,
}

impl GraphCrawler {
    /// Creates a crawler
    ///
    /// # Errors
    ///
    /// `ConfigError::Disabled` if the configured target pool size is 0.
    pub fn new(
        session: Arc<RemoteSession>,
        storage: SharedStorage,
        stats: Arc<StatsService>,
        config: &FollowingConfig,
    ) -> std::result::Result<Self, ConfigError> {
        if config.users_to_follow_cache_size == 0 {
            return Err(ConfigError::Disabled {
                component: "graph crawler",
                reason: "users-to-follow-cache-size is 0".to_string(),
            });
        }

        Ok(Self {
            session,
            storage,
            stats,
            target: u64::from(config.users_to_follow_cache_size),
            pages_per_user: config.followers_pages_per_user.max(1),
            page_size: config.followers_page_size,
            pacing: CrawlerPacing::default(),
        })
    }

    /// Replaces the loop pauses
    pub fn with_pacing(mut self, pacing: CrawlerPacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Crawls forever
    pub async fn run(&self) {
        tracing::info!(target_size = self.target, "Graph crawler started");

        loop {
            let pause = match self.run_cycle().await {
                Ok(outcome) => {
                    match outcome {
                        CycleOutcome::Saturated { candidates } => {
                            tracing::debug!(candidates, "Candidate pool is full")
                        }
                        CycleOutcome::TargetReached { inserted, expanded } => tracing::info!(
                            inserted,
                            expanded,
                            "Candidate pool reached its target"
                        ),
                        CycleOutcome::Exhausted { inserted, expanded } => tracing::warn!(
                            inserted,
                            expanded,
                            "No unexpanded nodes left below the target"
                        ),
                    }
                    self.pacing.idle_pause
                }
                Err(BotError::Session(e)) => {
                    self.session.recover_from(&e).await;
                    if e == SessionError::Limit {
                        tracing::debug!("Crawl cycle interrupted by rate limit");
                        Duration::ZERO
                    } else {
                        tracing::warn!("Crawl cycle failed: {}", e);
                        self.pacing.error_pause
                    }
                }
                Err(e) => {
                    tracing::warn!("Crawl cycle failed: {}", e);
                    self.pacing.error_pause
                }
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Runs one expansion cycle
    ///
    /// Nodes are expanded in BFS order. A node whose followers cannot be
    /// read (`NotAllowed`, `NotFound`) is marked expanded without inserting
    /// anything. Any other error aborts the cycle and leaves the current node
    /// unexpanded; followers inserted before the error are kept.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let candidates = lock(&self.storage)?.count_candidates()?;
        if candidates >= self.target {
            return Ok(CycleOutcome::Saturated { candidates });
        }

        let mut inserted = 0;
        let mut expanded = 0;
        loop {
            let batch = lock(&self.storage)?.unexpanded_nodes(EXPANSION_BATCH)?;
            if batch.is_empty() {
                return Ok(CycleOutcome::Exhausted { inserted, expanded });
            }

            for node in batch {
                match self.expand(&node).await {
                    Ok(count) => inserted += count,
                    Err(BotError::Session(e)) if e.is_target_specific() => {
                        tracing::debug!(
                            remote_id = %node.remote_id,
                            "Followers of {} unavailable: {}",
                            node.username,
                            e
                        );
                    }
                    Err(e) => return Err(e),
                }

                let candidates = {
                    let mut storage = lock(&self.storage)?;
                    storage.mark_followers_expanded(&node.remote_id)?;
                    storage.count_candidates()?
                };
                expanded += 1;

                if candidates >= self.target {
                    return Ok(CycleOutcome::TargetReached { inserted, expanded });
                }
            }
        }
    }

    /// Fetches up to `pages_per_user` follower pages of `node` and inserts
    /// the unseen followers
    ///
    /// # Returns
    ///
    /// The number of nodes inserted.
    async fn expand(&self, node: &GraphNode) -> Result<u64> {
        let depth = node.depth + 1;
        let mut cursor: Option<String> = None;
        let mut inserted = 0;

        for _ in 0..self.pages_per_user {
            let page = self
                .session
                .followers_page(&node.remote_id, cursor.as_deref(), self.page_size)
                .await?;

            let now = Utc::now();
            {
                let mut storage = lock(&self.storage)?;
                for account in &page.accounts {
                    let new_node = NewGraphNode::candidate(&account.id, &account.username, depth, now);
                    if storage.insert_if_absent(&new_node)? {
                        inserted += 1;
                        self.stats.increment(Counter::UsersToFollowFetched);
                    }
                }
            }

            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        tracing::debug!(
            remote_id = %node.remote_id,
            depth,
            inserted,
            "Expanded followers of {}",
            node.username
        );
        Ok(inserted)
    }
}
