use crate::config::types::{
    Config, CredentialsConfig, FollowingConfig, MediaConfig, SessionConfig, StorageConfig,
    ThrottleConfig,
};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_credentials(&config.credentials)?;
    validate_session_config(&config.session)?;
    validate_throttle_config(&config.throttle)?;
    validate_following_config(&config.following)?;
    validate_media_config(&config.media)?;
    validate_storage_config(&config.storage)?;
    Ok(())
}

fn validate_credentials(config: &CredentialsConfig) -> Result<(), ConfigError> {
    if config.username.trim().is_empty() {
        return Err(ConfigError::Validation(
            "username cannot be empty".to_string(),
        ));
    }

    if config.password.is_empty() {
        return Err(ConfigError::Validation(
            "password cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_session_config(config: &SessionConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use HTTP or HTTPS",
            config.base_url
        )));
    }

    // Endpoint paths are joined onto the base, which drops the last segment
    // unless the path ends with a slash.
    if !url.path().ends_with('/') {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must end with '/'",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout == 0 {
        return Err(ConfigError::Validation(
            "request_timeout must be >= 1 second".to_string(),
        ));
    }

    Ok(())
}

/// Validates throttle bounds
///
/// The growth coefficient must escalate (> 1) and the decay coefficient must
/// converge (in (0, 1)), otherwise the throttle degenerates.
fn validate_throttle_config(config: &ThrottleConfig) -> Result<(), ConfigError> {
    let non_negative = [
        ("limit_sleep_time_min", config.limit_sleep_time_min),
        ("success_sleep_time_min", config.success_sleep_time_min),
        ("success_sleep_time_max", config.success_sleep_time_max),
    ];
    for (name, value) in non_negative {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "{} must be a non-negative number of seconds, got {}",
                name, value
            )));
        }
    }

    let growth = config.limit_sleep_time_coefficient;
    if !growth.is_finite() || growth <= 1.0 {
        return Err(ConfigError::Validation(format!(
            "limit_sleep_time_coefficient must be > 1, got {}",
            growth
        )));
    }

    let decay = config.success_sleep_time_coefficient;
    if decay.is_nan() || decay <= 0.0 || decay >= 1.0 {
        return Err(ConfigError::Validation(format!(
            "success_sleep_time_coefficient must be between 0 and 1 (exclusive), got {}",
            decay
        )));
    }

    if config.success_sleep_time_max < config.success_sleep_time_min {
        return Err(ConfigError::Validation(format!(
            "success_sleep_time_max ({}) must be >= success_sleep_time_min ({})",
            config.success_sleep_time_max, config.success_sleep_time_min
        )));
    }

    if let Some(threshold) = config.relogin_threshold {
        if threshold.is_nan() || threshold <= config.limit_sleep_time_min {
            return Err(ConfigError::Validation(format!(
                "relogin_threshold ({}) must be greater than limit_sleep_time_min ({})",
                threshold, config.limit_sleep_time_min
            )));
        }
    }

    Ok(())
}

fn validate_following_config(config: &FollowingConfig) -> Result<(), ConfigError> {
    if config.following_hours < 1 {
        return Err(ConfigError::Validation(format!(
            "following_hours must be >= 1, got {}",
            config.following_hours
        )));
    }

    if config.followers_pages_per_user < 1 {
        return Err(ConfigError::Validation(format!(
            "followers_pages_per_user must be >= 1, got {}",
            config.followers_pages_per_user
        )));
    }

    if config.followers_page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "followers_page_size must be >= 1, got {}",
            config.followers_page_size
        )));
    }

    Ok(())
}

/// An empty hashtag list is valid here: it disables the media pipeline at
/// construction time instead of failing the whole configuration.
fn validate_media_config(config: &MediaConfig) -> Result<(), ConfigError> {
    if config.low_water_mark < 1 {
        return Err(ConfigError::Validation(format!(
            "low_water_mark must be >= 1, got {}",
            config.low_water_mark
        )));
    }

    for tag in &config.hashtags {
        validate_hashtag(tag)?;
    }

    Ok(())
}

fn validate_hashtag(tag: &str) -> Result<(), ConfigError> {
    if tag.is_empty() {
        return Err(ConfigError::Validation(
            "hashtag cannot be empty".to_string(),
        ));
    }

    if tag.starts_with('#') {
        return Err(ConfigError::Validation(format!(
            "hashtag '{}' must be given without the leading '#'",
            tag
        )));
    }

    if tag.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(ConfigError::Validation(format!(
            "hashtag '{}' contains invalid characters",
            tag
        )));
    }

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}
