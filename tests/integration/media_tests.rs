//! Media producer backpressure and like consumer retry behavior

use crate::common::{logged_in_session, mount_action, ok_response, received_paths, test_config};
use social_tide::config::MediaConfig;
use social_tide::media::{LikeConsumer, LikeOutcome, MediaPacing, MediaProducer, MediaQueue, ProduceOutcome};
use social_tide::stats::{Counter, StatsService};
use social_tide::{ConfigError, MediaPipeline, RemoteSession, SessionError};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn tag_page(ids: &[&str]) -> String {
    let nodes: Vec<String> = ids.iter().map(|id| format!(r#"{{"id": "{}"}}"#, id)).collect();
    format!(
        r#"<html><body><script type="text/javascript">window._sharedData = {{"entry_data": {{"TagPage": [{{"tag": {{"media": {{"nodes": [{}]}}}}}}]}}}};</script></body></html>"#,
        nodes.join(", ")
    )
}

async fn mount_tag(server: &MockServer, tag: &str, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path(format!("/explore/tags/{}/", tag).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string(tag_page(ids)))
        .mount(server)
        .await;
}

fn queue() -> Arc<MediaQueue> {
    Arc::new(MediaQueue::new(Duration::from_millis(5)))
}

#[tokio::test]
async fn test_pipeline_disabled_without_hashtags() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = Arc::new(RemoteSession::new("likes", &config).unwrap());

    let result = MediaPipeline::new(
        session,
        Arc::new(StatsService::new()),
        &MediaConfig {
            hashtags: vec![],
            low_water_mark: 10,
        },
    );

    assert!(matches!(result, Err(ConfigError::Disabled { .. })));
}

#[tokio::test]
async fn test_producer_respects_low_water_mark() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    mount_tag(&server, "cats", &["m1", "m2", "m3"]).await;
    mount_tag(&server, "dogs", &["m4"]).await;
    for id in ["m1", "m2", "m3"] {
        mount_action(&server, &format!("/web/likes/{}/like/", id), ok_response()).await;
    }

    let queue = queue();
    let stats = Arc::new(StatsService::new());
    let mut producer = MediaProducer::new(
        session.clone(),
        queue.clone(),
        vec!["cats".to_string(), "dogs".to_string()],
        2,
    );
    let mut consumer = LikeConsumer::new(session, queue.clone(), stats.clone());

    assert_eq!(
        producer.produce_once().await,
        ProduceOutcome::Fetched {
            tag: "cats".to_string(),
            added: 3
        }
    );

    // At or above the mark: no fetch, and the rotation does not advance.
    assert_eq!(producer.produce_once().await, ProduceOutcome::Saturated);
    assert_eq!(producer.current_tag(), Some("dogs"));
    assert_eq!(consumer.consume_once().await, LikeOutcome::Liked("m1".to_string()));
    assert_eq!(producer.produce_once().await, ProduceOutcome::Saturated);
    assert_eq!(received_paths(&server, "/explore/tags/").await.len(), 1);

    // Drained below the mark: production resumes with the next tag.
    assert_eq!(consumer.consume_once().await, LikeOutcome::Liked("m2".to_string()));
    assert_eq!(
        producer.produce_once().await,
        ProduceOutcome::Fetched {
            tag: "dogs".to_string(),
            added: 1
        }
    );
    assert_eq!(queue.len(), 2);
    assert_eq!(stats.hourly(Counter::Liked), 2);
}

#[tokio::test]
async fn test_failed_tag_is_retried_before_rotating() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    Mock::given(method("GET"))
        .and(path("/explore/tags/cats/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_tag(&server, "cats", &["c1"]).await;
    mount_tag(&server, "dogs", &["d1"]).await;

    let queue = queue();
    let mut producer = MediaProducer::new(
        session,
        queue.clone(),
        vec!["cats".to_string(), "dogs".to_string()],
        5,
    );

    let outcome = producer.produce_once().await;
    assert!(matches!(
        outcome,
        ProduceOutcome::Failed {
            ref tag,
            error: SessionError::Transport(_),
        } if tag == "cats"
    ));
    assert_eq!(producer.current_tag(), Some("cats"));
    assert!(queue.is_empty());

    assert_eq!(
        producer.produce_once().await,
        ProduceOutcome::Fetched {
            tag: "cats".to_string(),
            added: 1
        }
    );
    assert_eq!(producer.current_tag(), Some("dogs"));
    assert_eq!(
        received_paths(&server, "/explore/tags/").await,
        vec!["/explore/tags/cats/".to_string(), "/explore/tags/cats/".to_string()]
    );
}

#[tokio::test]
async fn test_consumer_drops_unlikeable_media() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    mount_action(&server, "/web/likes/gone/like/", ResponseTemplate::new(404)).await;
    mount_action(&server, "/web/likes/next/like/", ok_response()).await;

    let queue = queue();
    queue.extend(vec!["gone".to_string(), "next".to_string()]);
    let mut consumer = LikeConsumer::new(session, queue.clone(), Arc::new(StatsService::new()));

    assert_eq!(consumer.consume_once().await, LikeOutcome::Dropped("gone".to_string()));
    assert_eq!(consumer.pending(), None);
    assert_eq!(consumer.consume_once().await, LikeOutcome::Liked("next".to_string()));
}

#[tokio::test]
async fn test_consumer_retries_same_media_after_transient_error() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    Mock::given(method("POST"))
        .and(path("/web/likes/m1/like/"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_action(&server, "/web/likes/m1/like/", ok_response()).await;

    let queue = queue();
    queue.extend(vec!["m1".to_string(), "m2".to_string()]);
    let mut consumer = LikeConsumer::new(session, queue.clone(), Arc::new(StatsService::new()));

    assert!(matches!(
        consumer.consume_once().await,
        LikeOutcome::Retry {
            error: SessionError::Transport(_),
            ..
        }
    ));
    assert_eq!(consumer.pending(), Some("m1"));
    assert_eq!(queue.len(), 1);

    assert_eq!(consumer.consume_once().await, LikeOutcome::Liked("m1".to_string()));
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn test_pipeline_run_likes_discovered_media() {
    let server = MockServer::start().await;
    let config = test_config(&server, ":memory:");
    let session = logged_in_session(&server, &config).await;
    mount_tag(&server, "cats", &["m1", "m2"]).await;
    for id in ["m1", "m2"] {
        mount_action(&server, &format!("/web/likes/{}/like/", id), ok_response()).await;
    }

    let stats = Arc::new(StatsService::new());
    let pacing = MediaPacing {
        producer_error_pause: Duration::from_millis(10),
        saturated_pause: Duration::from_millis(10),
        consumer_error_pause: Duration::from_millis(10),
        poll_interval: Duration::from_millis(5),
    };
    let media = MediaConfig {
        hashtags: vec!["cats".to_string()],
        low_water_mark: 1,
    };
    let pipeline = MediaPipeline::with_pacing(session, stats.clone(), &media, pacing).unwrap();

    let handle = tokio::spawn(pipeline.run());
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while stats.hourly(Counter::Liked) < 2 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();

    assert!(stats.hourly(Counter::Liked) >= 2);
}
