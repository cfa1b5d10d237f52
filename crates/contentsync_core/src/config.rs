//! Engine configuration.
//!
//! # Responsibility
//! - Hold remote store location, gateway timeout and refresh throttle window.
//! - Resolve values from the environment for hosts without their own config.
//!
//! # Invariants
//! - A validated config has an `http`/`https` base URL and non-zero durations.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_BASE_URL: &str = "CONTENTSYNC_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "CONTENTSYNC_TIMEOUT_MS";
pub const ENV_THROTTLE_MS: &str = "CONTENTSYNC_THROTTLE_MS";

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REFRESH_THROTTLE: Duration = Duration::from_secs(1);

/// Runtime settings shared by gateway, bus subscribers and hosts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Root of the remote content store API.
    pub base_url: String,
    /// Applied by the HTTP transport; expiry surfaces as a network error.
    pub request_timeout: Duration,
    /// Window in which repeated refresh events for one key are ignored.
    pub refresh_throttle: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_throttle: DEFAULT_REFRESH_THROTTLE,
        }
    }
}

impl EngineConfig {
    /// Reads overrides from `CONTENTSYNC_*` environment variables.
    ///
    /// Unset or blank variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`EngineConfig::from_env`] with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = non_blank(lookup(ENV_BASE_URL)) {
            config.base_url = value;
        }
        if let Some(value) = non_blank(lookup(ENV_TIMEOUT_MS)) {
            config.request_timeout = parse_millis(ENV_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = non_blank(lookup(ENV_THROTTLE_MS)) {
            config.refresh_throttle = parse_millis(ENV_THROTTLE_MS, &value)?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration(ENV_TIMEOUT_MS));
        }
        if self.refresh_throttle.is_zero() {
            return Err(ConfigError::ZeroDuration(ENV_THROTTLE_MS));
        }
        Ok(())
    }
}

/// Configuration resolution errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidBaseUrl(String),
    InvalidNumber { name: &'static str, value: String },
    ZeroDuration(&'static str),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => {
                write!(f, "base url must start with http:// or https://, got `{value}`")
            }
            Self::InvalidNumber { name, value } => {
                write!(f, "{name} must be a whole number of milliseconds, got `{value}`")
            }
            Self::ZeroDuration(name) => write!(f, "{name} must be greater than zero"),
        }
    }
}

impl Error for ConfigError {}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|trimmed| !trimmed.is_empty())
}

fn parse_millis(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        })
}
