//! FollowCycle state transitions, plus the full crawl-follow-unfollow scenario

use crate::common::{
    logged_in_session, memory_storage, mount_action, mount_followers, ok_response,
    received_paths, test_config, OWN_ID,
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use social_tide::follow::{Clock, PhaseReport};
use social_tide::stats::{Counter, StatsService};
use social_tide::storage::{lock, NewGraphNode, SharedStorage, Storage};
use social_tide::{FollowCycle, GraphCrawler};
use std::sync::{Arc, Mutex};
use wiremock::{MockServer, ResponseTemplate};

/// Clock the test moves by hand
#[derive(Clone)]
struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
    fn starting_at(time: DateTime<Utc>) -> Self {
        Self(Arc::new(Mutex::new(time)))
    }

    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }

    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }

    fn clock(&self) -> Clock {
        let clock = self.clone();
        Arc::new(move || clock.now())
    }
}

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn insert_candidate(storage: &SharedStorage, id: &str, depth: u32, discovered_at: DateTime<Utc>) {
    lock(storage)
        .unwrap()
        .insert_if_absent(&NewGraphNode::candidate(id, &format!("user{}", id), depth, discovered_at))
        .unwrap();
}

fn insert_seed(storage: &SharedStorage, now: DateTime<Utc>) {
    let seed = NewGraphNode {
        remote_id: OWN_ID.to_string(),
        username: "tide".to_string(),
        depth: 0,
        discovered_at: now,
        followed_at: Some(now - Duration::hours(1)),
    };
    lock(storage).unwrap().insert_if_absent(&seed).unwrap();
}

#[tokio::test]
async fn test_follow_phase_visits_candidates_in_bfs_order() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    let storage = memory_storage();
    let base = start_time();

    // Depths [2, 0, 1, 0] with increasing discovery times.
    insert_candidate(&storage, "1", 2, base);
    insert_candidate(&storage, "2", 0, base + Duration::seconds(1));
    insert_candidate(&storage, "3", 1, base + Duration::seconds(2));
    insert_candidate(&storage, "4", 0, base + Duration::seconds(3));
    for id in ["1", "2", "3", "4"] {
        mount_action(&server, &format!("/web/friendships/{}/follow/", id), ok_response()).await;
    }

    let stats = Arc::new(StatsService::new());
    let clock = ManualClock::starting_at(base + Duration::minutes(5));
    let cycle = FollowCycle::new(session, storage.clone(), stats.clone(), &config.following)
        .with_clock(clock.clock());

    let report = cycle.follow_phase().await.unwrap();

    assert_eq!(report, PhaseReport { succeeded: 4, skipped: 0 });
    assert_eq!(
        received_paths(&server, "/web/friendships/").await,
        vec![
            "/web/friendships/2/follow/",
            "/web/friendships/4/follow/",
            "/web/friendships/3/follow/",
            "/web/friendships/1/follow/",
        ]
    );
    assert_eq!(stats.hourly(Counter::Followed), 4);

    let storage = lock(&storage).unwrap();
    let node = storage.get_node("2").unwrap().unwrap();
    assert!(node.is_followed);
    assert_eq!(node.followed_at, Some(clock.now()));
    assert_eq!(storage.count_candidates().unwrap(), 0);
}

#[tokio::test]
async fn test_unfollowable_candidate_is_retired() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    let storage = memory_storage();
    let now = start_time();

    insert_candidate(&storage, "1", 1, now);
    insert_candidate(&storage, "2", 1, now + Duration::seconds(1));
    mount_action(&server, "/web/friendships/1/follow/", ResponseTemplate::new(404)).await;
    mount_action(&server, "/web/friendships/2/follow/", ok_response()).await;

    let clock = ManualClock::starting_at(now);
    let cycle = FollowCycle::new(
        session,
        storage.clone(),
        Arc::new(StatsService::new()),
        &config.following,
    )
    .with_clock(clock.clock());

    let report = cycle.run_cycle().await.unwrap();
    assert_eq!(report.follow, PhaseReport { succeeded: 1, skipped: 1 });

    {
        let storage = lock(&storage).unwrap();
        let retired = storage.get_node("1").unwrap().unwrap();
        assert!(!retired.is_followed);
        assert_eq!(retired.followed_at, Some(now - config.following.follow_window()));
    }

    // Much later: only the real follow is unfollowed, the retired node never
    // comes back as a candidate.
    mount_action(&server, "/web/friendships/2/unfollow/", ok_response()).await;
    clock.advance(Duration::hours(5));
    let report = cycle.run_cycle().await.unwrap();

    assert_eq!(report.unfollow, PhaseReport { succeeded: 1, skipped: 0 });
    assert_eq!(report.follow, PhaseReport::default());
    assert_eq!(
        received_paths(&server, "/web/friendships/1/").await,
        vec!["/web/friendships/1/follow/"]
    );
}

#[tokio::test]
async fn test_unfollow_boundary_is_inclusive() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    let storage = memory_storage();
    let now = start_time();
    let window = config.following.follow_window();

    insert_candidate(&storage, "1", 1, now - Duration::hours(3));
    insert_candidate(&storage, "2", 1, now - Duration::hours(3));
    {
        let mut storage = lock(&storage).unwrap();
        storage.set_follow_state("1", true, Some(now - window)).unwrap();
        storage
            .set_follow_state("2", true, Some(now - window + Duration::microseconds(1)))
            .unwrap();
    }
    mount_action(&server, "/web/friendships/1/unfollow/", ok_response()).await;
    mount_action(&server, "/web/friendships/2/unfollow/", ok_response()).await;

    let cycle = FollowCycle::new(
        session,
        storage.clone(),
        Arc::new(StatsService::new()),
        &config.following,
    )
    .with_clock(ManualClock::starting_at(now).clock());

    let report = cycle.unfollow_phase().await.unwrap();

    assert_eq!(report.succeeded, 1);
    let storage = lock(&storage).unwrap();
    let unfollowed = storage.get_node("1").unwrap().unwrap();
    assert!(!unfollowed.is_followed);
    assert_eq!(unfollowed.followed_at, Some(now - window));
    assert!(storage.get_node("2").unwrap().unwrap().is_followed);
}

#[tokio::test]
async fn test_unfollow_of_vanished_account_still_clears_state() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    let storage = memory_storage();
    let now = start_time();

    insert_candidate(&storage, "1", 1, now - Duration::hours(3));
    lock(&storage)
        .unwrap()
        .set_follow_state("1", true, Some(now - Duration::hours(2)))
        .unwrap();
    mount_action(
        &server,
        "/web/friendships/1/unfollow/",
        ResponseTemplate::new(400).set_body_string("<html>blocked</html>"),
    )
    .await;

    let stats = Arc::new(StatsService::new());
    let cycle = FollowCycle::new(session, storage.clone(), stats.clone(), &config.following)
        .with_clock(ManualClock::starting_at(now).clock());

    let report = cycle.unfollow_phase().await.unwrap();

    assert_eq!(report, PhaseReport { succeeded: 0, skipped: 1 });
    assert_eq!(stats.hourly(Counter::Unfollowed), 0);
    assert!(!lock(&storage).unwrap().get_node("1").unwrap().unwrap().is_followed);
}

#[tokio::test]
async fn test_limit_aborts_cycle_without_writing() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    let storage = memory_storage();

    insert_candidate(&storage, "1", 1, start_time());
    insert_candidate(&storage, "2", 1, start_time() + Duration::seconds(1));
    mount_action(
        &server,
        "/web/friendships/1/follow/",
        ResponseTemplate::new(400).set_body_string("Please wait a few minutes before you try again."),
    )
    .await;
    mount_action(&server, "/web/friendships/2/follow/", ok_response()).await;

    let cycle = FollowCycle::new(
        session,
        storage.clone(),
        Arc::new(StatsService::new()),
        &config.following,
    );
    let result = cycle.run_cycle().await;

    assert!(matches!(
        result,
        Err(social_tide::BotError::Session(social_tide::SessionError::Limit))
    ));
    let storage = lock(&storage).unwrap();
    assert!(storage.get_node("1").unwrap().unwrap().is_candidate());
    assert!(storage.get_node("2").unwrap().unwrap().is_candidate());
    assert!(received_paths(&server, "/web/friendships/2/").await.is_empty());
}

#[tokio::test]
async fn test_seed_is_never_followed_or_unfollowed() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    let storage = memory_storage();
    let clock = ManualClock::starting_at(start_time());
    insert_seed(&storage, clock.now());

    let cycle = FollowCycle::new(
        session,
        storage.clone(),
        Arc::new(StatsService::new()),
        &config.following,
    )
    .with_clock(clock.clock());

    for _ in 0..3 {
        let report = cycle.run_cycle().await.unwrap();
        assert_eq!(report.follow, PhaseReport::default());
        assert_eq!(report.unfollow, PhaseReport::default());
        clock.advance(Duration::hours(10));
    }
    assert!(received_paths(&server, "/web/friendships/").await.is_empty());
}

#[tokio::test]
async fn test_crawl_follow_unfollow_scenario() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    let storage = memory_storage();
    let stats = Arc::new(StatsService::new());
    let clock = ManualClock::starting_at(Utc::now());
    insert_seed(&storage, clock.now());

    mount_followers(&server, OWN_ID, &[("1", "ada"), ("2", "bea"), ("3", "cyd")]).await;
    for id in ["1", "2", "3"] {
        mount_followers(&server, id, &[]).await;
        mount_action(&server, &format!("/web/friendships/{}/follow/", id), ok_response()).await;
        mount_action(&server, &format!("/web/friendships/{}/unfollow/", id), ok_response()).await;
    }

    let crawler = GraphCrawler::new(session.clone(), storage.clone(), stats.clone(), &config.following)
        .unwrap();
    let cycle = FollowCycle::new(session, storage.clone(), stats.clone(), &config.following)
        .with_clock(clock.clock());

    crawler.run_cycle().await.unwrap();
    let first = cycle.run_cycle().await.unwrap();
    assert_eq!(first.follow.succeeded, 3);
    assert_eq!(first.unfollow.succeeded, 0);
    assert_eq!(
        received_paths(&server, "/web/friendships/").await,
        vec![
            "/web/friendships/1/follow/",
            "/web/friendships/2/follow/",
            "/web/friendships/3/follow/",
        ]
    );

    clock.advance(config.following.follow_window());
    let second = cycle.run_cycle().await.unwrap();
    assert_eq!(second.unfollow.succeeded, 3);
    assert_eq!(second.follow.succeeded, 0);

    clock.advance(Duration::hours(24));
    let third = cycle.run_cycle().await.unwrap();
    assert_eq!(third.follow, PhaseReport::default());
    assert_eq!(third.unfollow, PhaseReport::default());

    assert_eq!(stats.hourly(Counter::Followed), 3);
    assert_eq!(stats.hourly(Counter::Unfollowed), 3);
    assert_eq!(stats.hourly(Counter::UsersToFollowFetched), 3);

    let storage = lock(&storage).unwrap();
    for id in ["1", "2", "3"] {
        let node = storage.get_node(id).unwrap().unwrap();
        assert!(!node.is_followed);
        assert!(node.followed_at.is_some());
    }
    assert_eq!(storage.count_candidates().unwrap(), 0);
}
