//! Like loop draining the media queue

use crate::media::queue::MediaQueue;
use crate::session::RemoteSession;
use crate::stats::{Counter, StatsService};
use crate::SessionError;
use std::sync::Arc;
use std::time::Duration;

/// Result of one consumer step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked(String),
    /// The item can never be liked and was discarded
    Dropped(String),
    /// The like failed transiently; the item is kept for the next step
    Retry { media: String, error: SessionError },
}

/// Pops media from the queue and likes them
pub struct LikeConsumer {
    session: Arc<RemoteSession>,
    queue: Arc<MediaQueue>,
    stats: Arc<StatsService>,
    pending: Option<String>,
    error_pause: Duration,
}

impl LikeConsumer {
    pub fn new(session: Arc<RemoteSession>, queue: Arc<MediaQueue>, stats: Arc<StatsService>) -> Self {
        Self {
            session,
            queue,
            stats,
            pending: None,
            error_pause: Duration::from_secs(5),
        }
    }

    pub fn with_error_pause(mut self, error_pause: Duration) -> Self {
        self.error_pause = error_pause;
        self
    }

    /// Item held back for retry, if any
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Likes one item
    ///
    /// A retried item is attempted again before anything new is popped.
    pub async fn consume_once(&mut self) -> LikeOutcome {
        let media = match self.pending.take() {
            Some(media) => media,
            None => self.queue.pop().await,
        };

        match self.session.like(&media).await {
            Ok(()) => {
                self.stats.increment(Counter::Liked);
                tracing::debug!(%media, "Liked media");
                LikeOutcome::Liked(media)
            }
            Err(e) if e.is_target_specific() => {
                tracing::debug!(%media, "Can't like media: {}", e);
                LikeOutcome::Dropped(media)
            }
            Err(error) => {
                self.pending = Some(media.clone());
                LikeOutcome::Retry { media, error }
            }
        }
    }

    /// Consumes forever
    pub async fn run(&mut self) {
        loop {
            let pause = match self.consume_once().await {
                LikeOutcome::Retry { media, error } => {
                    self.session.recover_from(&error).await;
                    if error == SessionError::Limit {
                        tracing::debug!(%media, "Like rate limited");
                        Duration::ZERO
                    } else {
                        tracing::warn!(%media, "Like failed: {}", error);
                        self.error_pause
                    }
                }
                _ => Duration::ZERO,
            };
            tokio::time::sleep(pause).await;
        }
    }
}
