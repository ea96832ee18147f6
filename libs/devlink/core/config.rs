//! Session configuration
//!
//! ```yaml
//! host: 192.168.1.40
//! port: 4999
//! reconnect_interval_secs: 3     # 0 disables auto-reconnect
//! response_timeout_secs: 5
//! connect_timeout_secs: 2        # optional, defaults to response_timeout_secs
//! idle_timeout_secs: 0           # optional, 0 disables idle detection
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable overriding `host`
pub const HOST_ENV: &str = "DEVLINK_HOST";
/// Environment variable overriding `port`
pub const PORT_ENV: &str = "DEVLINK_PORT";

/// Connection settings for one remote endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Peer host name or address
    #[serde(alias = "ip")]
    pub host: String,
    pub port: u16,
    /// Delay before an automatic reconnect; `<= 0` disables it
    #[serde(default = "default_reconnect_interval")]
    pub reconnect_interval_secs: f64,
    /// Per-request deadline, and the default for the other two deadlines
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: f64,
    #[serde(default)]
    pub connect_timeout_secs: Option<f64>,
    #[serde(default)]
    pub idle_timeout_secs: Option<f64>,
}

fn default_reconnect_interval() -> f64 {
    3.0
}

fn default_response_timeout() -> f64 {
    5.0
}

/// Non-positive values are zero; values too large for a `Duration` saturate
fn secs(value: f64) -> Duration {
    if value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

impl SessionConfig {
    /// Defaults for `host:port`
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            reconnect_interval_secs: default_reconnect_interval(),
            response_timeout_secs: default_response_timeout(),
            connect_timeout_secs: None,
            idle_timeout_secs: None,
        }
    }

    /// Load configuration from a YAML file
    ///
    /// `DEVLINK_HOST` and `DEVLINK_PORT` take precedence over the file.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: SessionConfig = serde_yaml::from_str(&yaml_content)?;

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse and validate YAML without touching the environment
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SessionConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply endpoint overrides from `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup(HOST_ENV) {
            info!("Overriding host from {}", HOST_ENV);
            self.host = host;
        }

        if let Some(port) = lookup(PORT_ENV) {
            info!("Overriding port from {}", PORT_ENV);
            self.port = port.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!("{} is not a valid port: {}", PORT_ENV, port))
            })?;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "host must not be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(ConfigError::ValidationError(
                "port must be greater than 0".to_string(),
            ));
        }

        if !self.reconnect_interval_secs.is_finite() {
            return Err(ConfigError::ValidationError(
                "reconnect_interval_secs must be a finite number".to_string(),
            ));
        }

        if !self.response_timeout_secs.is_finite() || self.response_timeout_secs <= 0.0 {
            return Err(ConfigError::ValidationError(
                "response_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if let Some(connect) = self.connect_timeout_secs {
            if !connect.is_finite() || connect <= 0.0 {
                return Err(ConfigError::ValidationError(
                    "connect_timeout_secs must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(idle) = self.idle_timeout_secs {
            if !idle.is_finite() || idle < 0.0 {
                return Err(ConfigError::ValidationError(
                    "idle_timeout_secs must not be negative".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Zero when auto-reconnect is disabled
    pub fn reconnect_interval(&self) -> Duration {
        if self.reconnect_interval_secs <= 0.0 {
            Duration::ZERO
        } else {
            secs(self.reconnect_interval_secs)
        }
    }

    pub fn response_timeout(&self) -> Duration {
        secs(self.response_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout_secs
            .map(secs)
            .unwrap_or_else(|| self.response_timeout())
    }

    /// `None` when idle detection is disabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        let timeout = self
            .idle_timeout_secs
            .map(secs)
            .unwrap_or_else(|| self.response_timeout());
        (!timeout.is_zero()).then_some(timeout)
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Session configuration:");
        info!("  Endpoint: {}", self.endpoint());
        info!("  Reconnect interval: {:?}", self.reconnect_interval());
        info!("  Response timeout: {:?}", self.response_timeout());
        info!("  Connect timeout: {:?}", self.connect_timeout());
        info!("  Idle timeout: {:?}", self.idle_timeout());
    }
}
