//! Hashtag media discovery feeding the like loop
//!
//! A [`MediaProducer`] keeps an in-memory [`MediaQueue`] topped up from
//! hashtag pages while a [`LikeConsumer`] drains it. The producer stops
//! fetching while the queue holds at least the low-water mark.

mod consumer;
mod producer;
mod queue;

pub use consumer::{LikeConsumer, LikeOutcome};
pub use producer::{MediaProducer, ProduceOutcome};
pub use queue::MediaQueue;

use crate::config::MediaConfig;
use crate::session::RemoteSession;
use crate::stats::StatsService;
use crate::ConfigError;
use std::sync::Arc;
use std::time::Duration;

/// Fixed pauses of the producer and consumer loops
#[derive(Debug, Clone, Copy)]
pub struct MediaPacing {
    /// Producer pause after a failed tag fetch
    pub producer_error_pause: Duration,
    /// Producer pause while the queue is at or above the low-water mark
    pub saturated_pause: Duration,
    /// Consumer pause after a failed like
    pub consumer_error_pause: Duration,
    /// Consumer poll interval while the queue is empty
    pub poll_interval: Duration,
}

impl Default for MediaPacing {
    fn default() -> Self {
        Self {
            producer_error_pause: Duration::from_secs(5),
            saturated_pause: Duration::from_secs(5),
            consumer_error_pause: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Producer and consumer wired to one queue
pub struct MediaPipeline {
    queue: Arc<MediaQueue>,
    producer: MediaProducer,
    consumer: LikeConsumer,
}

impl MediaPipeline {
    /// Creates the pipeline with production pacing
    ///
    /// # Errors
    ///
    /// `ConfigError::Disabled` if no hashtags are configured.
    pub fn new(
        session: Arc<RemoteSession>,
        stats: Arc<StatsService>,
        config: &MediaConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_pacing(session, stats, config, MediaPacing::default())
    }

    pub fn with_pacing(
        session: Arc<RemoteSession>,
        stats: Arc<StatsService>,
        config: &MediaConfig,
        pacing: MediaPacing,
    ) -> Result<Self, ConfigError> {
        if config.hashtags.is_empty() {
            return Err(ConfigError::Disabled {
                component: "media pipeline",
                reason: "no hashtags configured".to_string(),
            });
        }

        let queue = Arc::new(MediaQueue::new(pacing.poll_interval));
        let producer = MediaProducer::new(
            session.clone(),
            queue.clone(),
            config.hashtags.clone(),
            config.low_water_mark,
        )
        .with_pauses(pacing.producer_error_pause, pacing.saturated_pause);
        let consumer = LikeConsumer::new(session, queue.clone(), stats)
            .with_error_pause(pacing.consumer_error_pause);

        Ok(Self {
            queue,
            producer,
            consumer,
        })
    }

    pub fn queue(&self) -> &Arc<MediaQueue> {
        &self.queue
    }

    /// Runs producer and consumer concurrently, forever
    pub async fn run(self) {
        let Self {
            mut producer,
            mut consumer,
            ..
        } = self;
        tracing::info!("Media pipeline started");
        tokio::join!(producer.run(), consumer.run());
    }
}
