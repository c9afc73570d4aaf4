//! Configuration management for Tollgate.
//!
//! Configuration is read from an optional YAML file and then overridden by
//! `TOLLGATE_`-prefixed environment variables, with `__` separating nested
//! keys (for example `TOLLGATE_LIMITER__BURST=8`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::{Result, TollgateError};

/// Prefix for environment variable overrides.
const ENV_PREFIX: &str = "TOLLGATE";

/// Main configuration for the Tollgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// Deployment environment, reported by the health check
    #[serde(default = "default_env")]
    pub env: String,

    /// Longest a request may spend in the router, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long open connections may drain after a shutdown signal, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            env: default_env(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4000))
}

fn default_env() -> String {
    "development".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl ServerConfig {
    /// Deadline for producing a response.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Deadline for the graceful drain.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Reject timeouts of zero.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(TollgateError::Config(
                "server.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(TollgateError::Config(
                "server.shutdown_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-client admission limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Whether requests are limited at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Token refill rate of each client bucket
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Capacity of each client bucket
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// How often idle clients are swept, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Inactivity after which a client is forgotten, in seconds
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,

    /// Number of registry shards; 0 or 1 keeps a single lock
    #[serde(default)]
    pub shards: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            sweep_interval_secs: default_sweep_interval(),
            idle_ttl_secs: default_idle_ttl(),
            shards: 0,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_requests_per_second() -> f64 {
    2.0
}

fn default_burst() -> u32 {
    4
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_ttl() -> u64 {
    180
}

impl LimiterConfig {
    /// Interval between two reaper sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Idle time after which a client entry is evicted.
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Check the limiter settings for values the limiter cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.burst == 0 {
            return Err(TollgateError::Config(
                "limiter.burst must be at least 1".to_string(),
            ));
        }
        if !self.requests_per_second.is_finite() || self.requests_per_second < 0.0 {
            return Err(TollgateError::Config(format!(
                "limiter.requests_per_second must be a finite, non-negative number (got {})",
                self.requests_per_second
            )));
        }
        if self.sweep_interval_secs == 0 {
            return Err(TollgateError::Config(
                "limiter.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.idle_ttl_secs == 0 {
            return Err(TollgateError::Config(
                "limiter.idle_ttl_secs must be greater than zero".to_string(),
            ));
        }
        if self.idle_ttl_secs < self.sweep_interval_secs.saturating_mul(3) {
            warn!(
                idle_ttl_secs = self.idle_ttl_secs,
                sweep_interval_secs = self.sweep_interval_secs,
                "Idle TTL is shorter than three sweep intervals; clients may be evicted mid-burst"
            );
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit one JSON object per log line
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TollgateConfig {
    /// Load configuration from an optional file, layered under environment overrides.
    ///
    /// Nothing is logged and nothing is validated here: the logging section
    /// is part of the result, so callers install their subscriber first and
    /// then call [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Load configuration from a file path, without environment overrides.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TollgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TollgateError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.limiter.validate()
    }
}
