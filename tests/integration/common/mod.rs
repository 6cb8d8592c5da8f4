//! Shared fixtures: configuration, mock login, mock graph pages

use serde_json::{json, Value};
use social_tide::config::{
    Config, CredentialsConfig, FollowingConfig, MediaConfig, SessionConfig, StorageConfig,
    ThrottleConfig,
};
use social_tide::storage::{SharedStorage, SqliteStorage};
use social_tide::RemoteSession;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const OWN_ID: &str = "100";
pub const CSRF_TOKEN: &str = "tok123";

/// Throttle that never sleeps
pub fn zero_throttle() -> ThrottleConfig {
    ThrottleConfig {
        limit_sleep_time_min: 0.0,
        limit_sleep_time_coefficient: 2.0,
        success_sleep_time_min: 0.0,
        success_sleep_time_max: 0.0,
        success_sleep_time_coefficient: 0.5,
        relogin_threshold: None,
    }
}

/// Creates a test configuration pointing at the mock server
pub fn test_config(server: &MockServer, db_path: &str) -> Config {
    Config {
        credentials: CredentialsConfig {
            username: "tide".to_string(),
            password: "secret".to_string(),
        },
        session: SessionConfig {
            base_url: format!("{}/", server.uri()),
            user_agent: "TestAgent/1.0".to_string(),
            request_timeout: 5,
        },
        throttle: zero_throttle(),
        following: FollowingConfig {
            following_hours: 1,
            users_to_follow_cache_size: 10,
            followers_pages_per_user: 3,
            followers_page_size: 20,
        },
        media: MediaConfig {
            hashtags: vec!["cats".to_string()],
            low_water_mark: 2,
        },
        storage: StorageConfig {
            database_path: db_path.to_string(),
        },
    }
}

pub fn memory_storage() -> SharedStorage {
    Arc::new(Mutex::new(
        SqliteStorage::new_in_memory().expect("in-memory database"),
    ))
}

/// Mounts the landing page and a successful login for `user_id`
pub async fn mount_login(server: &MockServer, user_id: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("csrftoken={}; Path=/", CSRF_TOKEN).as_str())
                .set_body_string("<html><body>landing</body></html>"),
        )
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/accounts/login/ajax/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", format!("ds_user_id={}; Path=/", user_id).as_str())
                .set_body_json(json!({"status": "ok", "authenticated": true})),
        )
        .mount(server)
        .await;
}

/// Logs a session in against the mock server
pub async fn logged_in_session(server: &MockServer, config: &Config) -> Arc<RemoteSession> {
    mount_login(server, OWN_ID).await;
    let session = RemoteSession::new("test", config).expect("session");
    session.login().await.expect("login");
    Arc::new(session)
}

/// Form-encoded prefix of an edge query for `user_id`
///
/// `first` selects the opening page, otherwise a continuation page.
pub fn edge_query_marker(user_id: &str, edge: &str, first: bool) -> String {
    format!(
        "ig_user%28{}%29+%7B+{}.{}",
        user_id,
        edge,
        if first { "first" } else { "after" }
    )
}

/// Body of one edge page
pub fn edge_page(edge: &str, accounts: &[(&str, &str)], next: Option<&str>) -> Value {
    let nodes: Vec<Value> = accounts
        .iter()
        .map(|(id, username)| json!({"id": id, "username": username}))
        .collect();
    json!({
        "status": "ok",
        edge: {
            "count": nodes.len(),
            "page_info": {
                "end_cursor": next,
                "has_next_page": next.is_some(),
            },
            "nodes": nodes,
        }
    })
}

/// Mounts the first followers page of `user_id`
pub async fn mount_followers(server: &MockServer, user_id: &str, accounts: &[(&str, &str)]) {
    Mock::given(method("POST"))
        .and(path("/query/"))
        .and(body_string_contains(
            edge_query_marker(user_id, "followed_by", true).as_str(),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(edge_page(
            "followed_by",
            accounts,
            None,
        )))
        .mount(server)
        .await;
}

/// Mounts a follow/unfollow/like action response for one path
pub async fn mount_action(server: &MockServer, action_path: &str, response: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path(action_path))
        .respond_with(response)
        .mount(server)
        .await;
}

pub fn ok_response() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"status": "ok"}))
}

/// Paths of the requests the server received, in arrival order
pub async fn received_paths(server: &MockServer, prefix: &str) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|request| request.url.path().to_string())
        .filter(|p| p.starts_with(prefix))
        .collect()
}
