//! Configuration for the RAT link
//!
//! Loads configuration from a TOML file. Every section and key is optional;
//! missing values fall back to the historical deployment (device at
//! `10.0.0.116:5007`, 20 second connect window, 1 second retries).

use crate::error::Result;
use crate::link::reconnect::Backoff;
use crate::link::session::ConnectOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub link: LinkConfig,
    pub logging: LoggingConfig,
}

/// Network endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Device address the operator connects to
    ///
    /// Examples:
    /// - `10.0.0.116:5007` - RAT on the bench network
    /// - `127.0.0.1:5007` - Simulated device on the same host
    pub address: String,

    /// Address the device listens on
    pub bind_address: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "10.0.0.116:5007".to_string(),
            bind_address: "0.0.0.0:5007".to_string(),
        }
    }
}

/// Backoff strategy between connect attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant retry interval
    #[default]
    Fixed,
    /// Doubling interval capped at `max_retry_interval_ms`
    Exponential,
}

/// Link timing parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Connect window in milliseconds
    pub connect_timeout_ms: u64,
    /// Interval between connect attempts in milliseconds
    pub retry_interval_ms: u64,
    /// Backoff strategy
    pub backoff: BackoffKind,
    /// Upper bound for exponential backoff in milliseconds
    pub max_retry_interval_ms: u64,
    /// How long the operator waits for telemetry (0 = forever)
    pub read_timeout_ms: u64,
    /// Device idle poll interval used to check the shutdown flag
    pub poll_interval_ms: u64,
    /// Disable Nagle's algorithm so 2-byte frames leave immediately
    pub nodelay: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 20_000,
            retry_interval_ms: 1_000,
            backoff: BackoffKind::Fixed,
            max_retry_interval_ms: 8_000,
            read_timeout_ms: 5_000,
            poll_interval_ms: 500,
            nodelay: true,
        }
    }
}

impl LinkConfig {
    /// Backoff policy described by this configuration
    pub fn backoff(&self) -> Backoff {
        let interval = Duration::from_millis(self.retry_interval_ms);
        match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed(interval),
            BackoffKind::Exponential => Backoff::Exponential {
                initial: interval,
                max: Duration::from_millis(self.max_retry_interval_ms.max(self.retry_interval_ms)),
            },
        }
    }

    /// Options for establishing operator sessions
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            timeout: Duration::from_millis(self.connect_timeout_ms),
            backoff: self.backoff(),
            read_timeout: self.read_timeout(),
            nodelay: self.nodelay,
        }
    }

    /// Operator read timeout, `None` when configured as 0
    pub fn read_timeout(&self) -> Option<Duration> {
        (self.read_timeout_ms > 0).then(|| Duration::from_millis(self.read_timeout_ms))
    }

    /// Device idle poll interval (never zero)
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Example
    /// ```no_run
    /// use rat_link::config::Config;
    ///
    /// let config = Config::load("rat-link.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
