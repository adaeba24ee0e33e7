//! Stream Client Settings
//!
//! Configuration for the price stream client, loaded from environment
//! variables.

use std::time::Duration;

use crate::infrastructure::feed::reconnect::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY,
};

/// Default price stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "ws://localhost:8000/ws/stocks/realtime";

/// Default bound on how long `connect()` waits for the connection to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Complete stream client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    /// WebSocket endpoint of the price stream.
    pub url: String,
    /// How long `connect()` waits before resolving as failed.
    pub connect_timeout: Duration,
    /// Delay unit for linear reconnection backoff.
    pub reconnect_delay: Duration,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

impl StreamSettings {
    /// Create settings from environment variables.
    ///
    /// - `PRICE_STREAM_URL`: endpoint (default: `ws://localhost:8000/ws/stocks/realtime`)
    /// - `PRICE_STREAM_CONNECT_TIMEOUT_MS`: connect bound (default: 5000)
    /// - `PRICE_STREAM_RECONNECT_DELAY_MS`: backoff unit (default: 1000)
    /// - `PRICE_STREAM_MAX_RECONNECT_ATTEMPTS`: retry bound (default: 5)
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is empty or not a `ws://`/`wss://` URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create settings from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is empty or not a `ws://`/`wss://` URL.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let url = lookup("PRICE_STREAM_URL").unwrap_or(defaults.url);
        validate_url(&url)?;

        Ok(Self {
            url,
            connect_timeout: parse_duration_millis(
                &lookup,
                "PRICE_STREAM_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout,
            ),
            reconnect_delay: parse_duration_millis(
                &lookup,
                "PRICE_STREAM_RECONNECT_DELAY_MS",
                defaults.reconnect_delay,
            ),
            max_reconnect_attempts: parse_u32(
                &lookup,
                "PRICE_STREAM_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Endpoint is not a WebSocket URL.
    #[error("invalid stream URL {0:?}: expected ws:// or wss://")]
    InvalidUrl(String),
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::EmptyValue("PRICE_STREAM_URL".to_string()));
    }

    if url.starts_with("ws://") || url.starts_with("wss://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl(url.to_string()))
    }
}

fn parse_u32<F>(lookup: &F, key: &str, default: u32) -> u32
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_millis<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
