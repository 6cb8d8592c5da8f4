//! Service entry points behind the CLI commands
//!
//! `run` starts every loop the configuration enables. A component whose
//! configuration disables it, or whose session cannot log in, is skipped
//! with a log line while the others keep running.

use crate::config::Config;
use crate::crawler::GraphCrawler;
use crate::follow::FollowCycle;
use crate::media::MediaPipeline;
use crate::session::RemoteSession;
use crate::stats::StatsService;
use crate::storage::{lock, open_shared, NewGraphNode, SharedStorage, Storage};
use crate::{Result, SessionError};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Runs every enabled loop until the process is interrupted
pub async fn run(config: Config) -> Result<()> {
    tracing::info!("Starting Social-Tide");

    let storage = open_shared(Path::new(&config.storage.database_path))?;
    let stats = Arc::new(StatsService::new());
    let mut tasks = JoinSet::new();

    {
        let stats = stats.clone();
        tasks.spawn(async move { stats.run().await });
    }

    start_following(&config, &storage, &stats, &mut tasks).await;
    start_media(&config, &stats, &mut tasks).await;

    if tasks.len() == 1 {
        tracing::warn!("No component could be started; only statistics are running");
    }

    let interrupted = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!("Failed to listen for interrupt: {}", e);
            }
            true
        }
        _ = supervise(&mut tasks) => false,
    };

    if interrupted {
        tracing::info!("Interrupted, shutting down");
        tasks.shutdown().await;
    }
    Ok(())
}

/// Waits on the loops, reporting any that end
async fn supervise(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(()) => tracing::warn!("A component stopped"),
            Err(e) => tracing::error!("A component crashed: {}", e),
        }
    }
}

/// Logs in the crawl/follow session and spawns the crawler and follow cycle
async fn start_following(
    config: &Config,
    storage: &SharedStorage,
    stats: &Arc<StatsService>,
    tasks: &mut JoinSet<()>,
) {
    let session = match logged_in_session("following", config).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            tracing::error!("Follow cycle and graph crawler weren't started: {}", e);
            return;
        }
    };

    match GraphCrawler::new(
        session.clone(),
        storage.clone(),
        stats.clone(),
        &config.following,
    ) {
        Ok(crawler) => {
            tasks.spawn(async move { crawler.run().await });
        }
        Err(e) => tracing::info!("Graph crawler wasn't started: {}", e),
    }

    let follow = FollowCycle::new(session, storage.clone(), stats.clone(), &config.following);
    tasks.spawn(async move { follow.run().await });
}

/// Logs in an independent session and spawns the media pipeline
async fn start_media(config: &Config, stats: &Arc<StatsService>, tasks: &mut JoinSet<()>) {
    if config.media.hashtags.is_empty() {
        tracing::info!("Media pipeline wasn't started: no hashtags configured");
        return;
    }

    let session = match logged_in_session("likes", config).await {
        Ok(session) => Arc::new(session),
        Err(e) => {
            tracing::error!("Media pipeline wasn't started: {}", e);
            return;
        }
    };

    match MediaPipeline::new(session, stats.clone(), &config.media) {
        Ok(pipeline) => {
            tasks.spawn(pipeline.run());
        }
        Err(e) => tracing::info!("Media pipeline wasn't started: {}", e),
    }
}

async fn logged_in_session(label: &str, config: &Config) -> Result<RemoteSession> {
    let session = RemoteSession::new(label, config)?;
    session.login().await?;
    Ok(session)
}

/// Creates the store, records the seed account, then schedules unfollowing
/// of everyone the account already follows
pub async fn install(config: Config) -> Result<()> {
    tracing::info!("Installing Social-Tide");

    let storage = open_shared(Path::new(&config.storage.database_path))?;
    let session = logged_in_session("install", &config).await?;
    let now = Utc::now();

    if insert_seed(&session, &storage, &config, now)? {
        tracing::info!("Seed account {} recorded", config.credentials.username);
    } else {
        tracing::info!("Seed account {} already present", config.credentials.username);
    }

    let scheduled = schedule_unfollow_all(&session, &storage, &config, now).await?;
    tracing::info!("{} followed accounts were saved", scheduled);
    Ok(())
}

/// Marks every account the configured user follows as due for unfollowing
pub async fn unfollow(config: Config) -> Result<()> {
    tracing::info!("Scheduling unfollowing of everyone");

    let storage = open_shared(Path::new(&config.storage.database_path))?;
    let session = logged_in_session("unfollow", &config).await?;

    let scheduled = schedule_unfollow_all(&session, &storage, &config, Utc::now()).await?;
    tracing::info!("{} followed accounts were saved", scheduled);
    Ok(())
}

/// Inserts the logged-in account as the depth-0 seed
///
/// The seed's `followed_at` is set one window in the past with
/// `is_followed = false`, which keeps it out of both follow selections.
///
/// # Returns
///
/// `true` if the seed was inserted, `false` if it already existed.
pub fn insert_seed(
    session: &RemoteSession,
    storage: &SharedStorage,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<bool> {
    let user_id = session
        .user_id()
        .ok_or_else(|| SessionError::Auth("not logged in".to_string()))?;

    let seed = NewGraphNode {
        remote_id: user_id,
        username: config.credentials.username.clone(),
        depth: 0,
        discovered_at: now,
        followed_at: Some(now - config.following.follow_window()),
    };
    Ok(lock(storage)?.insert_if_absent(&seed)?)
}

/// Pages through the accounts the logged-in user follows and upserts each
/// as followed with an already-elapsed window
///
/// # Returns
///
/// The number of accounts saved.
pub async fn schedule_unfollow_all(
    session: &RemoteSession,
    storage: &SharedStorage,
    config: &Config,
    now: DateTime<Utc>,
) -> Result<u64> {
    let user_id = session
        .user_id()
        .ok_or_else(|| SessionError::Auth("not logged in".to_string()))?;
    let threshold = now - config.following.follow_window();

    let mut saved = 0;
    let mut cursor: Option<String> = None;
    loop {
        let page = session
            .followed_page(&user_id, cursor.as_deref(), config.following.followers_page_size)
            .await?;

        {
            let mut storage = lock(storage)?;
            for account in &page.accounts {
                storage.upsert_followed(&account.id, &account.username, threshold)?;
                saved += 1;
            }
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }
    Ok(saved)
}
