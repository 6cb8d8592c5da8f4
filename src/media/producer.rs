//! Hashtag-driven media discovery

use crate::media::queue::MediaQueue;
use crate::session::RemoteSession;
use crate::SessionError;
use std::sync::Arc;
use std::time::Duration;

/// Result of one producer step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceOutcome {
    /// The queue is at or above the low-water mark; nothing was fetched
    Saturated,
    /// A tag page was fetched
    Fetched { tag: String, added: usize },
    /// Fetching the tag page failed
    Failed { tag: String, error: SessionError },
}

/// Cycles through the configured tags, topping up the media queue
pub struct MediaProducer {
    session: Arc<RemoteSession>,
    queue: Arc<MediaQueue>,
    hashtags: Vec<String>,
    next_tag: usize,
    low_water_mark: usize,
    error_pause: Duration,
    saturated_pause: Duration,
}

impl MediaProducer {
    /// Creates a producer
    ///
    /// `hashtags` must not be empty; [`MediaPipeline`](super::MediaPipeline)
    /// checks this before constructing one.
    pub fn new(
        session: Arc<RemoteSession>,
        queue: Arc<MediaQueue>,
        hashtags: Vec<String>,
        low_water_mark: usize,
    ) -> Self {
        Self {
            session,
            queue,
            hashtags,
            next_tag: 0,
            low_water_mark,
            error_pause: Duration::from_secs(5),
            saturated_pause: Duration::from_secs(5),
        }
    }

    pub fn with_pauses(mut self, error_pause: Duration, saturated_pause: Duration) -> Self {
        self.error_pause = error_pause;
        self.saturated_pause = saturated_pause;
        self
    }

    /// Tag the next fetch will use
    pub fn current_tag(&self) -> Option<&str> {
        self.hashtags.get(self.next_tag).map(String::as_str)
    }

    /// Runs one step: fetch the current tag unless the queue is saturated
    ///
    /// Only a successful fetch advances the rotation; a failed tag is
    /// fetched again on the next step.
    pub async fn produce_once(&mut self) -> ProduceOutcome {
        if self.queue.len() >= self.low_water_mark {
            return ProduceOutcome::Saturated;
        }
        let Some(tag) = self.current_tag().map(str::to_string) else {
            return ProduceOutcome::Saturated;
        };
        match self.session.tag_media(&tag).await {
            Ok(media) => {
                self.next_tag = (self.next_tag + 1) % self.hashtags.len();
                let added = self.queue.extend(media);
                tracing::debug!(%tag, added, queued = self.queue.len(), "Fetched tag media");
                ProduceOutcome::Fetched { tag, added }
            }
            Err(error) => ProduceOutcome::Failed { tag, error },
        }
    }

    /// Produces forever
    pub async fn run(&mut self) {
        loop {
            let pause = match self.produce_once().await {
                ProduceOutcome::Saturated => self.saturated_pause,
                ProduceOutcome::Fetched { .. } => Duration::ZERO,
                ProduceOutcome::Failed { tag, error } => {
                    self.session.recover_from(&error).await;
                    if error == SessionError::Limit {
                        tracing::debug!(%tag, "Tag fetch rate limited");
                        Duration::ZERO
                    } else {
                        tracing::warn!(%tag, "Can't fetch tag media: {}", error);
                        self.error_pause
                    }
                }
            };
            tokio::time::sleep(pause).await;
        }
    }
}
