//! Console configuration
//!
//! The session settings plus a few console-only keys, in one YAML file:
//!
//! ```yaml
//! host: 192.168.1.40
//! port: 4999
//! reconnect_interval_secs: 3
//! response_timeout_secs: 5
//! log_level: info
//! decoder: lines        # raw | lines
//! line_ending: "\r\n"
//! ```

use devlink::{ConfigError, LineDecoder, RawChunks, SessionBuilder, SessionConfig, Transport};
use devlink::states::HasEndpoint;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// How the console splits incoming bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecoderKind {
    /// Every read chunk is one frame
    Raw,
    /// Newline-terminated frames
    #[default]
    Lines,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(flatten)]
    pub session: SessionConfig,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub decoder: DecoderKind,
    /// Appended to every command typed at the prompt
    #[serde(default = "default_line_ending")]
    pub line_ending: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_line_ending() -> String {
    "\r\n".to_string()
}

impl ConsoleConfig {
    /// Load configuration from YAML file
    ///
    /// Endpoint environment overrides apply as for [`SessionConfig::load`].
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: ConsoleConfig = serde_yaml::from_str(&yaml_content)?;

        config
            .session
            .apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Apply the configured decoder to a session builder
    pub fn apply_decoder<T: Transport>(
        &self,
        builder: SessionBuilder<HasEndpoint, T>,
    ) -> SessionBuilder<HasEndpoint, T> {
        match self.decoder {
            DecoderKind::Raw => builder.decoder(RawChunks),
            DecoderKind::Lines => builder.decoder(LineDecoder::new()),
        }
    }

    /// Log configuration summary
    pub fn log(&self) {
        self.session.log();
        info!("  Decoder: {:?}", self.decoder);
        info!("  Log level: {}", self.log_level);
    }
}
