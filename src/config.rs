//! Configuration loading and management.
//!
//! Supports TOML configuration files with environment variable overrides.
//! Environment variables follow the pattern: `HERALD_<SECTION>_<KEY>`

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    pub server: ServerConfig,

    /// Web Push configuration.
    pub push: PushConfig,

    /// Chat/subscription store configuration.
    pub store: StoreConfig,

    /// Notification rate limit configuration.
    pub rate_limit: RateLimitConfig,

    /// Metrics configuration.
    pub metrics: MetricsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the trigger/health HTTP server.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    10
}

/// Web Push (VAPID) configuration.
///
/// When push is disabled or the key path is empty, the server still runs but
/// every dispatch is a soft no-op.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// Whether Web Push delivery is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Path to the PEM-encoded VAPID private key. Generated on first run
    /// if the file does not exist.
    #[serde(default)]
    pub vapid_key_path: String,

    /// Contact URI placed in the VAPID `sub` claim (`mailto:` or `https:`).
    #[serde(default)]
    pub contact: String,

    /// TTL in seconds the push service may hold an undelivered message.
    #[serde(default = "default_push_ttl")]
    pub ttl_secs: u32,

    /// Per-attempt delivery timeout in seconds.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_push_ttl() -> u32 {
    86_400
}

fn default_send_timeout() -> u64 {
    10
}

/// Store connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Store connection URL.
    #[serde(default)]
    pub url: String,

    /// Service credential for the store connection.
    #[serde(default)]
    pub service_key: String,
}

/// Notification rate limit configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Minimum interval between notifications for one (user, room) pair,
    /// in seconds. Triggers inside the window are coalesced.
    #[serde(default = "default_min_interval")]
    pub min_interval_secs: u64,

    /// Maximum tracked (user, room) pairs (LRU eviction).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

fn default_min_interval() -> u64 {
    60
}

fn default_max_entries() -> usize {
    100_000
}

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether Prometheus metrics are enabled.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error", "off".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "pretty".
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl AppConfig {
    /// Load configuration from a file path with environment variable overrides.
    ///
    /// Environment variables follow the pattern: `HERALD_<SECTION>_<KEY>`
    /// For example: `HERALD_SERVER_BIND_ADDRESS`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::builder_with_defaults()?
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("HERALD")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }

    /// Load configuration from environment variables only (no config file).
    pub fn from_env() -> Result<Self> {
        Self::builder_with_defaults()?
            .add_source(
                Environment::with_prefix("HERALD")
                    .separator("_")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }

    fn builder_with_defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        Ok(Config::builder()
            .set_default("server.bind_address", "0.0.0.0:8080")?
            .set_default("server.shutdown_timeout_secs", 10)?
            .set_default("push.enabled", false)?
            .set_default("push.vapid_key_path", "")?
            .set_default("push.contact", "")?
            .set_default("push.ttl_secs", 86_400)?
            .set_default("push.send_timeout_secs", 10)?
            .set_default("store.url", "")?
            .set_default("store.service_key", "")?
            .set_default("rate_limit.min_interval_secs", 60)?
            .set_default("rate_limit.max_entries", 100_000_i64)?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "json")?)
    }
}

impl PushConfig {
    /// Returns true if push credentials are present and delivery can run.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.vapid_key_path.is_empty()
    }

    /// Per-attempt delivery timeout.
    #[must_use]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

impl StoreConfig {
    /// Returns true if store credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty() && !self.service_key.is_empty()
    }
}

impl RateLimitConfig {
    /// Minimum inter-notification interval.
    #[must_use]
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }
}
