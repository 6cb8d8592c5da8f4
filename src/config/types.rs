use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Social-Tide
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub session: SessionConfig,
    pub throttle: ThrottleConfig,
    pub following: FollowingConfig,
    #[serde(default)]
    pub media: MediaConfig,
    pub storage: StorageConfig,
}

/// Account credentials used by every session
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

/// Remote service connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Root URL of the web surface; every endpoint path is joined onto it
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Request-level timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://www.instagram.com/".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

/// Adaptive throttle bounds, all delays in seconds
#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    /// Floor of the delay applied after a limit signal
    #[serde(rename = "limit-sleep-time-min")]
    pub limit_sleep_time_min: f64,

    /// Growth factor applied to the limit delay after each limit signal
    #[serde(rename = "limit-sleep-time-coefficient")]
    pub limit_sleep_time_coefficient: f64,

    /// Floor the success delay decays towards
    #[serde(rename = "success-sleep-time-min")]
    pub success_sleep_time_min: f64,

    /// Success delay restored by a cool-down reset
    #[serde(rename = "success-sleep-time-max")]
    pub success_sleep_time_max: f64,

    /// Geometric decay factor of the success delay
    #[serde(rename = "success-sleep-time-coefficient")]
    pub success_sleep_time_coefficient: f64,

    /// Limit delay above which loops re-authenticate their session
    #[serde(rename = "relogin-threshold", default)]
    pub relogin_threshold: Option<f64>,
}

/// Graph crawl and follow cycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct FollowingConfig {
    /// How long a followed account stays followed before it is unfollowed
    #[serde(rename = "following-hours")]
    pub following_hours: u32,

    /// Target number of follow candidates kept in the store
    #[serde(rename = "users-to-follow-cache-size", default)]
    pub users_to_follow_cache_size: u32,

    /// Maximum follower pages fetched per expanded account
    #[serde(
        rename = "followers-pages-per-user",
        default = "default_followers_pages_per_user"
    )]
    pub followers_pages_per_user: u32,

    /// Accounts requested per follower page
    #[serde(rename = "followers-page-size", default = "default_followers_page_size")]
    pub followers_page_size: u32,
}

impl FollowingConfig {
    pub fn follow_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.following_hours))
    }
}

fn default_followers_pages_per_user() -> u32 {
    3
}

fn default_followers_page_size() -> u32 {
    20
}

/// Hashtag-driven media discovery
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    #[serde(default)]
    pub hashtags: Vec<String>,

    /// Queue length below which the producer fetches more media
    #[serde(rename = "low-water-mark", default = "default_low_water_mark")]
    pub low_water_mark: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            hashtags: Vec::new(),
            low_water_mark: default_low_water_mark(),
        }
    }
}

fn default_low_water_mark() -> usize {
    100
}

/// Persistent store settings
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}
