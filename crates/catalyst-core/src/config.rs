//! Configuration loading and typed config structures for Catalyst Live.
//!
//! The configuration lives in `catalyst-config.yaml` at the project root
//! (path overridable through `CATALYST_CONFIG`). Every section is optional
//! and falls back to the defaults below, so an empty file is a valid
//! configuration running the built-in methanation model on port 3001.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::model::{ModelDefinition, ModelError};

/// Default config file name.
pub const DEFAULT_CONFIG_PATH: &str = "catalyst-config.yaml";

/// Environment variable selecting the config file.
pub const CONFIG_PATH_ENV: &str = "CATALYST_CONFIG";

/// Environment variable overriding `server.port`.
pub const PORT_ENV: &str = "PORT";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is syntactically valid but unusable.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted field path.
        field: &'static str,
        /// What is wrong.
        reason: String,
    },

    /// The model section is inconsistent.
    #[error("invalid model: {0}")]
    Model(#[from] ModelError),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalystConfig {
    /// HTTP control surface settings.
    #[serde(default)]
    pub server: ServerSection,

    /// Worker pacing and buffer sizes.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// The simulated model.
    #[serde(default)]
    pub model: ModelDefinition,
}

impl CatalystConfig {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate it.
    ///
    /// `PORT` overrides `server.port`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment
    /// overrides, and validate it.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.server.apply_port_override(std::env::var(PORT_ENV).ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve the config path from `CATALYST_CONFIG`, falling back to
    /// [`DEFAULT_CONFIG_PATH`].
    pub fn path_from_env() -> std::path::PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| DEFAULT_CONFIG_PATH.into(), Into::into)
    }

    /// Check value ranges and model consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.worker.steps_per_frame == 0 {
            return Err(ConfigError::Invalid {
                field: "worker.steps_per_frame",
                reason: String::from("must be at least 1"),
            });
        }
        if !(self.worker.frame_rate_hz.is_finite() && self.worker.frame_rate_hz > 0.0) {
            return Err(ConfigError::Invalid {
                field: "worker.frame_rate_hz",
                reason: format!("must be a positive number, got {}", self.worker.frame_rate_hz),
            });
        }
        if self.worker.history_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "worker.history_capacity",
                reason: String::from("must be at least 1"),
            });
        }
        if self.worker.parameter_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "worker.parameter_channel_capacity",
                reason: String::from("must be at least 1"),
            });
        }
        self.model.validate()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Listen address of the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSection {
    /// Bind host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSection {
    /// Replace `port` with the value of `PORT` when it is set.
    pub fn apply_port_override(&mut self, value: Option<&str>) -> Result<(), ConfigError> {
        if let Some(raw) = value {
            self.port = raw.trim().parse().map_err(|e| ConfigError::Invalid {
                field: "PORT",
                reason: format!("'{raw}' is not a port number: {e}"),
            })?;
        }
        Ok(())
    }
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Worker pacing and sizing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkerConfig {
    /// kMC steps executed per frame.
    #[serde(default = "default_steps_per_frame")]
    pub steps_per_frame: u64,

    /// Target frames per second.
    #[serde(default = "default_frame_rate_hz")]
    pub frame_rate_hz: f64,

    /// Frames kept in the history window.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Pending parameter updates accepted before backpressure.
    #[serde(default = "default_parameter_channel_capacity")]
    pub parameter_channel_capacity: usize,

    /// Random seed for engines that support one.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl WorkerConfig {
    /// Wall-clock period of one frame.
    pub fn frame_period(&self) -> Duration {
        if self.frame_rate_hz.is_finite() && self.frame_rate_hz > 0.0 {
            Duration::try_from_secs_f64(self.frame_rate_hz.recip()).unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            steps_per_frame: default_steps_per_frame(),
            frame_rate_hz: default_frame_rate_hz(),
            history_capacity: default_history_capacity(),
            parameter_channel_capacity: default_parameter_channel_capacity(),
            seed: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
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

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

const fn default_port() -> u16 {
    3001
}

const fn default_steps_per_frame() -> u64 {
    50_000
}

const fn default_frame_rate_hz() -> f64 {
    33.0
}

const fn default_history_capacity() -> usize {
    30
}

const fn default_parameter_channel_capacity() -> usize {
    10
}

fn default_log_level() -> String {
    "info".to_owned()
}
