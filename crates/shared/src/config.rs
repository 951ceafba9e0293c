//! Application configuration management.

use std::time::Duration;

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Balance recalculation configuration.
    #[serde(default)]
    pub recalculation: RecalculationConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Balance recalculation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RecalculationConfig {
    /// Seconds between two runs of the periodic driver.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Seconds to wait before retrying a failed periodic run.
    #[serde(default = "default_retry_cooldown_secs")]
    pub retry_cooldown_secs: u64,
    /// How far back the first run starts when no balance exists yet.
    #[serde(default = "default_bootstrap_lookback_days")]
    pub bootstrap_lookback_days: u32,
    /// Whether the batch walk also snapshots the current (still open) day.
    #[serde(default)]
    pub snapshot_today: bool,
    /// Upper bound of stock pairs recalculated concurrently.
    #[serde(default = "default_max_parallel_pairs")]
    pub max_parallel_pairs: usize,
}

fn default_interval_secs() -> u64 {
    86_400 // once per day
}

fn default_retry_cooldown_secs() -> u64 {
    300 // 5 minutes
}

fn default_bootstrap_lookback_days() -> u32 {
    7
}

fn default_max_parallel_pairs() -> usize {
    4
}

impl Default for RecalculationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            retry_cooldown_secs: default_retry_cooldown_secs(),
            bootstrap_lookback_days: default_bootstrap_lookback_days(),
            snapshot_today: false,
            max_parallel_pairs: default_max_parallel_pairs(),
        }
    }
}

impl RecalculationConfig {
    /// Interval between periodic runs.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Cooldown before a failed periodic run is retried.
    #[must_use]
    pub const fn retry_cooldown(&self) -> Duration {
        Duration::from_secs(self.retry_cooldown_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter, used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "stockbook=info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("STOCKBOOK").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
