//! Stream Client Settings
//!
//! Everything a `MarketStreamClient` needs is supplied here at
//! construction; nothing is read from ambient state afterwards.
//! `from_env` reads `LIVE_STREAM_*` variables, falling back to defaults
//! for unset or unparsable numbers.

use std::str::FromStr;
use std::time::Duration;

use crate::domain::error::StreamError;
use crate::domain::fallback::{FallbackEntry, FallbackTable, reference_entries};
use crate::domain::market::Symbol;
use crate::infrastructure::feed::reconnect::{ReconnectConfig, ReconnectMode};

/// Default live feed base URL.
pub const DEFAULT_FEED_BASE_URL: &str = "ws://localhost:8000";

/// Default path segment between the base URL and the symbol.
pub const DEFAULT_STREAM_PATH: &str = "ws";

/// Default wait before fallback data is applied.
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(3);

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable holds a value that cannot be used.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// The fallback table file could not be loaded.
    #[error("fallback table: {0}")]
    FallbackTable(String),
}

impl From<ConfigError> for StreamError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Stream client configuration.
#[derive(Debug, Clone)]
pub struct StreamClientConfig {
    /// `ws://` or `wss://` base URL of the live feed.
    pub feed_base_url: String,
    /// Path segment inserted before the symbol.
    pub stream_path: String,
    /// Wait for live data before the fallback is applied.
    pub fallback_timeout: Duration,
    /// Behavior once a connection ends.
    pub reconnect: ReconnectMode,
    /// Reference rows; the first is the default.
    pub fallback_table: Vec<FallbackEntry>,
}

impl Default for StreamClientConfig {
    fn default() -> Self {
        Self {
            feed_base_url: DEFAULT_FEED_BASE_URL.to_string(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
            reconnect: ReconnectMode::Never,
            fallback_table: reference_entries(),
        }
    }
}

impl StreamClientConfig {
    /// Configuration pointing at `feed_base_url`, defaults elsewhere.
    #[must_use]
    pub fn new(feed_base_url: impl Into<String>) -> Self {
        Self {
            feed_base_url: feed_base_url.into(),
            ..Self::default()
        }
    }

    /// Set the fallback timeout.
    #[must_use]
    pub const fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// Set the reconnect mode.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectMode) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Replace the fallback rows.
    #[must_use]
    pub fn with_fallback_table(mut self, entries: Vec<FallbackEntry>) -> Self {
        self.fallback_table = entries;
        self
    }

    /// Set the stream path segment.
    #[must_use]
    pub fn with_stream_path(mut self, path: impl Into<String>) -> Self {
        self.stream_path = path.into();
        self
    }

    /// Load from `LIVE_STREAM_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown reconnect mode, a non-WebSocket base
    /// URL, or an unreadable fallback table file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`StreamClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let feed_base_url = lookup("LIVE_STREAM_WS_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.feed_base_url);
        let stream_path = lookup("LIVE_STREAM_PATH").unwrap_or(defaults.stream_path);
        let fallback_timeout = Duration::from_millis(parse_or(
            &lookup,
            "LIVE_STREAM_FALLBACK_TIMEOUT_MS",
            3_000,
        ));

        let reconnect = match lookup("LIVE_STREAM_RECONNECT")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("" | "never") => ReconnectMode::Never,
            Some("backoff") => ReconnectMode::Backoff(reconnect_config(&lookup)),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LIVE_STREAM_RECONNECT".to_string(),
                    value: other.to_string(),
                });
            }
        };

        let fallback_table = match lookup("LIVE_STREAM_FALLBACK_TABLE").filter(|p| !p.is_empty()) {
            Some(path) => FallbackTable::from_json_file(&path)
                .map_err(|e| ConfigError::FallbackTable(e.to_string()))?
                .entries()
                .to_vec(),
            None => defaults.fallback_table,
        };

        let config = Self {
            feed_base_url,
            stream_path,
            fallback_timeout,
            reconnect,
            fallback_table,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the base URL scheme.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` unless the URL is `ws://` or `wss://`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.feed_base_url.trim();
        let has_host = url
            .strip_prefix("wss://")
            .or_else(|| url.strip_prefix("ws://"))
            .is_some_and(|rest| !rest.trim_matches('/').is_empty());
        if !has_host {
            return Err(ConfigError::InvalidValue {
                key: "feed_base_url".to_string(),
                value: self.feed_base_url.clone(),
            });
        }
        Ok(())
    }

    /// Live feed URL for `symbol`.
    #[must_use]
    pub fn endpoint_for(&self, symbol: &Symbol) -> String {
        let base = self.feed_base_url.trim().trim_end_matches('/');
        let path = self.stream_path.trim_matches('/');
        if path.is_empty() {
            format!("{base}/{symbol}")
        } else {
            format!("{base}/{path}/{symbol}")
        }
    }
}

/// Settings used only by the watcher binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Symbols to subscribe at startup.
    pub symbols: Vec<String>,
    /// Prometheus port (0 = disabled).
    pub metrics_port: u16,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["btc".to_string()],
            metrics_port: 9090,
        }
    }
}

impl WatcherSettings {
    /// Load from `LIVE_STREAM_SYMBOLS` and `LIVE_STREAM_METRICS_PORT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let symbols: Vec<String> = lookup("LIVE_STREAM_SYMBOLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            symbols: if symbols.is_empty() {
                defaults.symbols
            } else {
                symbols
            },
            metrics_port: parse_or(&lookup, "LIVE_STREAM_METRICS_PORT", defaults.metrics_port),
        }
    }
}

fn reconnect_config(lookup: &impl Fn(&str) -> Option<String>) -> ReconnectConfig {
    let defaults = ReconnectConfig::default();
    ReconnectConfig {
        initial_delay: Duration::from_millis(parse_or(
            lookup,
            "LIVE_STREAM_RECONNECT_DELAY_INITIAL_MS",
            5_000,
        )),
        max_delay: Duration::from_secs(parse_or(
            lookup,
            "LIVE_STREAM_RECONNECT_DELAY_MAX_SECS",
            defaults.max_delay.as_secs(),
        )),
        multiplier: parse_or(
            lookup,
            "LIVE_STREAM_RECONNECT_DELAY_MULTIPLIER",
            defaults.multiplier,
        ),
        jitter_factor: defaults.jitter_factor,
        max_attempts: parse_or(lookup, "LIVE_STREAM_MAX_RECONNECT_ATTEMPTS", 0),
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
