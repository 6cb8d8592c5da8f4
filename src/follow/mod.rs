//! Follow/unfollow state machine over the persisted graph
//!
//! Each cycle first unfollows every followed node whose follow window has
//! elapsed, then follows every candidate in BFS order. Per node:
//!
//! | Phase | Outcome | New state |
//! |-------|---------|-----------|
//! | unfollow | success | `is_followed = false`, `unfollowed` counted |
//! | unfollow | `NotAllowed` / `NotFound` | `is_followed = false` |
//! | follow | success | `is_followed = true`, `followed_at = now`, `followed` counted |
//! | follow | `NotAllowed` / `NotFound` | `is_followed = false`, `followed_at = now - window` |
//!
//! Any other error aborts the cycle before the node is written, so the node
//! is retried on the next cycle. The cycle writes only `is_followed` and
//! `followed_at`, which lets it run alongside the
//! [`GraphCrawler`](crate::crawler::GraphCrawler).

use crate::config::FollowingConfig;
use crate::session::RemoteSession;
use crate::stats::{Counter, StatsService};
use crate::storage::{lock, SharedStorage, Storage};
use crate::{BotError, Result, SessionError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Fixed pauses of the follow loop
#[derive(Debug, Clone, Copy)]
pub struct FollowPacing {
    /// Pause after a cycle aborted on a non-limit error
    pub error_pause: Duration,
    /// Pause after a completed cycle
    pub idle_pause: Duration,
}

impl Default for FollowPacing {
    fn default() -> Self {
        Self {
            error_pause: Duration::from_secs(5),
            idle_pause: Duration::from_secs(10),
        }
    }
}

/// Node counts handled by one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseReport {
    /// Nodes whose action succeeded
    pub succeeded: u64,
    /// Nodes retired after a target-specific error
    pub skipped: u64,
}

/// Counts of one full cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub unfollow: PhaseReport,
    pub follow: PhaseReport,
}

/// Drives follows and unfollows of graph nodes
pub struct FollowCycle {
    session: Arc<RemoteSession>,
    storage: SharedStorage,
    stats: Arc<StatsService>,
    window: chrono::Duration,
    pacing: FollowPacing,
    clock: Clock,
}

impl FollowCycle {
    pub fn new(
        session: Arc<RemoteSession>,
        storage: SharedStorage,
        stats: Arc<StatsService>,
        config: &FollowingConfig,
    ) -> Self {
        Self {
            session,
            storage,
            stats,
            window: config.follow_window(),
            pacing: FollowPacing::default(),
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the loop pauses
    pub fn with_pacing(mut self, pacing: FollowPacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Replaces the wall clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Follows and unfollows forever
    pub async fn run(&self) {
        tracing::info!(
            window_hours = self.window.num_hours(),
            "Follow cycle started"
        );

        loop {
            let pause = match self.run_cycle().await {
                Ok(report) => {
                    tracing::debug!(
                        unfollowed = report.unfollow.succeeded,
                        followed = report.follow.succeeded,
                        skipped = report.unfollow.skipped + report.follow.skipped,
                        "Follow cycle complete"
                    );
                    self.pacing.idle_pause
                }
                Err(BotError::Session(e)) => {
                    self.session.recover_from(&e).await;
                    if e == SessionError::Limit {
                        tracing::debug!("Follow cycle interrupted by rate limit");
                        Duration::ZERO
                    } else {
                        tracing::warn!("Follow cycle failed: {}", e);
                        self.pacing.error_pause
                    }
                }
                Err(e) => {
                    tracing::warn!("Follow cycle failed: {}", e);
                    self.pacing.error_pause
                }
            };
            tokio::time::sleep(pause).await;
        }
    }

    /// Runs the unfollow phase, then the follow phase
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let unfollow = self.unfollow_phase().await?;
        let follow = self.follow_phase().await?;
        Ok(CycleReport { unfollow, follow })
    }

    /// Unfollows every followed node whose window has elapsed
    ///
    /// The window boundary is inclusive.
    pub async fn unfollow_phase(&self) -> Result<PhaseReport> {
        let threshold = (self.clock)() - self.window;
        let due = lock(&self.storage)?.nodes_to_unfollow(threshold)?;

        let mut report = PhaseReport::default();
        for node in due {
            match self.session.unfollow(&node).await {
                Ok(()) => {
                    report.succeeded += 1;
                    self.stats.increment(Counter::Unfollowed);
                    tracing::info!(remote_id = %node.remote_id, "Unfollowed {}", node.username);
                }
                Err(e) if e.is_target_specific() => {
                    report.skipped += 1;
                    tracing::debug!(remote_id = %node.remote_id, "Can't unfollow {}: {}", node.username, e);
                }
                Err(e) => return Err(e.into()),
            }
            lock(&self.storage)?.set_unfollowed(&node.remote_id)?;
        }
        Ok(report)
    }

    /// Follows every candidate in `(depth, discovered_at)` order
    ///
    /// A candidate that cannot be followed is given an already-expired
    /// follow, which retires it from both selections for good.
    pub async fn follow_phase(&self) -> Result<PhaseReport> {
        let expired_at = (self.clock)() - self.window;
        let candidates = lock(&self.storage)?.follow_candidates()?;

        let mut report = PhaseReport::default();
        for node in candidates {
            let (is_followed, followed_at) = match self.session.follow(&node).await {
                Ok(()) => {
                    report.succeeded += 1;
                    self.stats.increment(Counter::Followed);
                    tracing::info!(
                        remote_id = %node.remote_id,
                        depth = node.depth,
                        "Followed {}",
                        node.username
                    );
                    (true, (self.clock)())
                }
                Err(e) if e.is_target_specific() => {
                    report.skipped += 1;
                    tracing::debug!(remote_id = %node.remote_id, "Can't follow {}: {}", node.username, e);
                    (false, expired_at)
                }
                Err(e) => return Err(e.into()),
            };
            lock(&self.storage)?.set_follow_state(&node.remote_id, is_followed, Some(followed_at))?;
        }
        Ok(report)
    }
}
