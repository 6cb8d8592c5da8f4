//! Authenticated session against the remote web surface
//!
//! A [`RemoteSession`] owns one browser-like identity: a cookie jar, the
//! anti-forgery token, the logged-in account's identifier, and the adaptive
//! [`Throttle`] that paces every call made through it.
//!
//! Sessions are shared by reference (`Arc<RemoteSession>`). Loops that
//! should look like one visitor share a session and therefore one throttle;
//! loops that must not affect each other's pacing get separate sessions.

mod classify;
pub mod endpoints;
mod responses;
mod throttle;

pub use classify::{classify_json, classify_page, contains_limit_marker, LIMIT_MARKERS};
pub use responses::{parse_tag_media, AccountPage, AccountRef};
pub use throttle::{Throttle, ThrottleState};

use crate::config::{Config, CredentialsConfig, SessionConfig};
use crate::storage::GraphNode;
use crate::{BotError, SessionError, SessionResult};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use url::Url;

/// Target of a [`RemoteSession::call`]
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub method: Method,
    /// Path relative to the configured base URL
    pub path: String,
}

impl Endpoint {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
        }
    }
}

/// State produced by a successful login
struct Authenticated {
    client: Client,
    jar: Arc<Jar>,
    csrf_token: String,
    user_id: String,
}

/// One authenticated identity plus its throttle
pub struct RemoteSession {
    label: String,
    settings: SessionConfig,
    credentials: CredentialsConfig,
    base_url: Url,
    anonymous: Client,
    throttle: Mutex<Throttle>,
    relogin_threshold: Option<f64>,
    auth: RwLock<Option<Authenticated>>,
    /// Number of successful logins so far
    logins: AtomicU64,
    relogin_lock: tokio::sync::Mutex<()>,
}

impl RemoteSession {
    /// Creates a logged-out session
    ///
    /// # Arguments
    ///
    /// * `label` - Name used in log lines to tell sessions apart
    /// * `config` - The agent configuration
    pub fn new(label: &str, config: &Config) -> Result<Self, BotError> {
        let base_url = Url::parse(&config.session.base_url)?;
        let anonymous = build_http_client(&config.session, None)?;

        Ok(Self {
            label: label.to_string(),
            settings: config.session.clone(),
            credentials: config.credentials.clone(),
            base_url,
            anonymous,
            throttle: Mutex::new(Throttle::new(&config.throttle)),
            relogin_threshold: config.throttle.relogin_threshold,
            auth: RwLock::new(None),
            logins: AtomicU64::new(0),
            relogin_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Identifier of the logged-in account, if logged in
    pub fn user_id(&self) -> Option<String> {
        self.auth
            .read()
            .ok()
            .and_then(|auth| auth.as_ref().map(|a| a.user_id.clone()))
    }

    pub fn is_logged_in(&self) -> bool {
        self.user_id().is_some()
    }

    /// Current throttle values
    pub fn throttle_state(&self) -> ThrottleState {
        match self.throttle.lock() {
            Ok(throttle) => throttle.state(),
            Err(poisoned) => poisoned.into_inner().state(),
        }
    }

    /// Current limit delay in seconds
    pub fn limit_delay(&self) -> f64 {
        self.throttle_state().limit_delay
    }

    /// Logs in with the configured credentials
    ///
    /// Loads the landing page for an initial anti-forgery token, submits the
    /// credentials, then re-reads the token and the account identifier from
    /// the cookies the login response set. Login requests are not throttled.
    ///
    /// # Errors
    ///
    /// * `SessionError::Auth` - No token was issued, the credentials were
    ///   rejected, or the identifier cookie is missing after login
    /// * any classified error of the login response
    pub async fn login(&self) -> SessionResult<()> {
        let jar = Arc::new(Jar::default());
        let client = build_http_client(&self.settings, Some(jar.clone()))?;

        let landing = client.get(self.base_url.clone()).send().await?;
        let status = landing.status();
        // Drain the body so the connection can be reused.
        let _ = landing.text().await?;
        if !status.is_success() {
            return Err(SessionError::Auth(format!(
                "landing page returned HTTP {}",
                status.as_u16()
            )));
        }

        let token = cookie_value(&jar, &self.base_url, endpoints::CSRF_COOKIE)
            .ok_or_else(|| SessionError::Auth("no anti-forgery token issued".to_string()))?;

        let login_url = self.url_for(endpoints::LOGIN_PATH)?;
        let response = client
            .post(login_url)
            .headers(ajax_headers(&token, self.base_url.as_str())?)
            .form(&[
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        let value = classify_json(status, &body)?;

        if value.get("authenticated").and_then(Value::as_bool) == Some(false) {
            return Err(SessionError::Auth("credentials rejected".to_string()));
        }

        let csrf_token =
            cookie_value(&jar, &self.base_url, endpoints::CSRF_COOKIE).unwrap_or(token);
        let user_id = cookie_value(&jar, &self.base_url, endpoints::USER_ID_COOKIE)
            .ok_or_else(|| SessionError::Auth("no account identifier after login".to_string()))?;

        tracing::info!(session = %self.label, %user_id, "Logged in as {}", self.credentials.username);

        let mut auth = self
            .auth
            .write()
            .map_err(|_| SessionError::Auth("session state poisoned".to_string()))?;
        *auth = Some(Authenticated {
            client,
            jar,
            csrf_token,
            user_id,
        });
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Logs in again with a fresh cookie jar and resets the throttle
    ///
    /// The previous identity keeps serving calls until the new login
    /// succeeds, and stays in place if it fails. Concurrent relogins are
    /// serialized: a caller that waited while another relogin succeeded
    /// returns without logging in a second time.
    pub async fn relogin(&self) -> SessionResult<()> {
        let seen = self.logins.load(Ordering::SeqCst);
        let _guard = self.relogin_lock.lock().await;
        if self.logins.load(Ordering::SeqCst) != seen {
            tracing::debug!(session = %self.label, "Relogin already completed elsewhere");
            return Ok(());
        }

        tracing::info!(session = %self.label, "Re-authenticating");
        self.login().await?;
        if let Ok(mut throttle) = self.throttle.lock() {
            throttle.reset();
        }
        Ok(())
    }

    /// Re-authenticates when the limit delay has escalated past the
    /// configured threshold
    ///
    /// Failures are logged; the previous identity stays in use.
    pub async fn relogin_if_escalated(&self) {
        let Some(threshold) = self.relogin_threshold else {
            return;
        };
        let limit_delay = self.throttle_state().limit_delay;
        if limit_delay <= threshold {
            return;
        }

        tracing::warn!(
            session = %self.label,
            limit_delay,
            threshold,
            "Limit delay exceeded threshold"
        );
        if let Err(e) = self.relogin().await {
            tracing::warn!(session = %self.label, "Relogin failed: {}", e);
        }
    }

    /// Reacts to a loop-level error on behalf of the loop that observed it
    ///
    /// A limit signal may escalate into a relogin; an authentication failure
    /// always attempts one.
    pub async fn recover_from(&self, error: &SessionError) {
        match error {
            SessionError::Limit => self.relogin_if_escalated().await,
            SessionError::Auth(_) => {
                if let Err(e) = self.relogin().await {
                    tracing::error!(session = %self.label, "Relogin failed: {}", e);
                }
            }
            _ => {}
        }
    }

    /// Issues an authenticated action or query call
    ///
    /// The throttle's post-call delay is always applied before this returns,
    /// whatever the outcome.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Method and path of the call
    /// * `payload` - Form fields (POST) or query parameters (GET)
    /// * `referer` - Referer override; defaults to the base URL
    pub async fn call(
        &self,
        endpoint: &Endpoint,
        payload: &[(&str, &str)],
        referer: Option<&str>,
    ) -> SessionResult<Value> {
        let outcome = self.send_json(endpoint, payload, referer).await;
        self.pace(&endpoint.path, &outcome).await;
        outcome
    }

    /// Reads an HTML page, authenticated if logged in
    ///
    /// Paced by the throttle like [`call`](Self::call).
    pub async fn read_page(&self, url: Url) -> SessionResult<String> {
        let path = url.path().to_string();
        let outcome = self.send_page(url).await;
        self.pace(&path, &outcome).await;
        outcome
    }

    async fn send_json(
        &self,
        endpoint: &Endpoint,
        payload: &[(&str, &str)],
        referer: Option<&str>,
    ) -> SessionResult<Value> {
        let (client, token) = self.authenticated()?;
        let url = self.url_for(&endpoint.path)?;
        let referer = referer.unwrap_or(self.base_url.as_str());

        let request = client
            .request(endpoint.method.clone(), url)
            .headers(ajax_headers(&token, referer)?);
        let request = if endpoint.method == Method::GET {
            request.query(payload)
        } else {
            request.form(payload)
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        classify_json(status, &body)
    }

    async fn send_page(&self, url: Url) -> SessionResult<String> {
        let client = match self.authenticated() {
            Ok((client, _)) => client,
            Err(_) => self.anonymous.clone(),
        };
        let response = client
            .get(url)
            .header(REFERER, self.base_url.as_str())
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        classify_page(status, body)
    }

    /// Applies the throttle delay owed for `outcome`
    async fn pace<T>(&self, path: &str, outcome: &SessionResult<T>) {
        let delay = match self.throttle.lock() {
            Ok(mut throttle) => throttle.after_call(outcome),
            Err(poisoned) => poisoned.into_inner().after_call(outcome),
        };

        match outcome {
            Err(SessionError::Limit) => tracing::warn!(
                session = %self.label,
                path,
                delay = delay.as_secs_f64(),
                "Rate limited, backing off"
            ),
            _ => tracing::trace!(session = %self.label, path, delay = delay.as_secs_f64(), "Pacing"),
        }

        tokio::time::sleep(delay).await;
    }

    /// Client and current anti-forgery token
    ///
    /// The token is re-read from the jar so that rotations by the remote
    /// service are picked up.
    fn authenticated(&self) -> SessionResult<(Client, String)> {
        let auth = self
            .auth
            .read()
            .map_err(|_| SessionError::Auth("session state poisoned".to_string()))?;
        let auth = auth
            .as_ref()
            .ok_or_else(|| SessionError::Auth("not logged in".to_string()))?;
        let token = cookie_value(&auth.jar, &self.base_url, endpoints::CSRF_COOKIE)
            .unwrap_or_else(|| auth.csrf_token.clone());
        Ok((auth.client.clone(), token))
    }

    fn url_for(&self, path: &str) -> SessionResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| SessionError::Transport(format!("invalid endpoint '{}': {}", path, e)))
    }

    fn url_with_segments(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Profile page of an account, used as the referer of relationship actions
    pub fn profile_url(&self, username: &str) -> Url {
        self.url_with_segments(&endpoints::profile_segments(username))
    }

    // ===== Typed Operations =====

    /// Follows an account
    pub async fn follow(&self, node: &GraphNode) -> SessionResult<()> {
        let referer = self.profile_url(&node.username);
        self.call(
            &Endpoint::post(endpoints::follow_path(&node.remote_id)),
            &[],
            Some(referer.as_str()),
        )
        .await
        .map(|_| ())
    }

    /// Unfollows an account
    pub async fn unfollow(&self, node: &GraphNode) -> SessionResult<()> {
        let referer = self.profile_url(&node.username);
        self.call(
            &Endpoint::post(endpoints::unfollow_path(&node.remote_id)),
            &[],
            Some(referer.as_str()),
        )
        .await
        .map(|_| ())
    }

    /// Likes a media item
    pub async fn like(&self, media_id: &str) -> SessionResult<()> {
        self.call(&Endpoint::post(endpoints::like_path(media_id)), &[], None)
            .await
            .map(|_| ())
    }

    /// Fetches one page of the accounts following `user_id`
    pub async fn followers_page(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> SessionResult<AccountPage> {
        self.edge_page(endpoints::FOLLOWERS_EDGE, user_id, cursor, page_size)
            .await
    }

    /// Fetches one page of the accounts `user_id` follows
    pub async fn followed_page(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> SessionResult<AccountPage> {
        self.edge_page(endpoints::FOLLOWS_EDGE, user_id, cursor, page_size)
            .await
    }

    async fn edge_page(
        &self,
        edge: &str,
        user_id: &str,
        cursor: Option<&str>,
        page_size: u32,
    ) -> SessionResult<AccountPage> {
        let query = endpoints::edge_query(edge, user_id, cursor, page_size);
        let response = self
            .call(
                &Endpoint::post(endpoints::QUERY_PATH),
                &[("q", query.as_str()), ("ref", endpoints::FOLLOW_LIST_REF)],
                None,
            )
            .await?;
        AccountPage::from_response(&response, edge)
    }

    /// Fetches the media identifiers currently listed for a hashtag
    pub async fn tag_media(&self, tag: &str) -> SessionResult<Vec<String>> {
        let url = self.url_with_segments(&endpoints::tag_segments(tag));
        let body = self.read_page(url).await?;
        parse_tag_media(&body)
    }
}

/// Builds an HTTP client presenting the configured browser identity
///
/// # Arguments
///
/// * `config` - Session settings (user agent, timeout)
/// * `jar` - Cookie jar for authenticated clients; `None` for anonymous reads
pub fn build_http_client(
    config: &SessionConfig,
    jar: Option<Arc<Jar>>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(config.request_timeout())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true);

    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }

    builder.build()
}

fn ajax_headers(token: &str, referer: &str) -> SessionResult<HeaderMap> {
    let invalid = |what: &str| SessionError::Transport(format!("invalid {} header value", what));

    let mut headers = HeaderMap::new();
    headers.insert(
        "x-csrftoken",
        HeaderValue::from_str(token).map_err(|_| invalid("X-CSRFToken"))?,
    );
    headers.insert("x-instagram-ajax", HeaderValue::from_static("1"));
    headers.insert("x-requested-with", HeaderValue::from_static("XMLHttpRequest"));
    headers.insert(
        REFERER,
        HeaderValue::from_str(referer).map_err(|_| invalid("Referer"))?,
    );
    Ok(headers)
}

/// Reads a cookie value the jar would send to `url`
fn cookie_value(jar: &Jar, url: &Url, name: &str) -> Option<String> {
    let header = jar.cookies(url)?;
    let header = header.to_str().ok()?;
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
