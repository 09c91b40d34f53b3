//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod messaging;
mod resources;

pub use messaging::{AmqpConfig, WorkerSettings, DEFAULT_EXCHANGE};
pub use resources::ResourceConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "EVENTSYNC_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "EVENTSYNC";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "EVENTSYNC_LOG";

use serde::Deserialize;

use crate::error::WorkerError;

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection and exchange settings.
    pub amqp: AmqpConfig,
    /// Per-worker settings (queue naming).
    pub worker: WorkerSettings,
    /// Resource kinds and the store they are loaded from.
    pub resources: ResourceConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, WorkerError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| WorkerError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| WorkerError::Config(e.to_string()))
    }

    /// Create config for testing.
    ///
    /// Uses a short reconnect delay so lifecycle tests do not stall.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.amqp.reconnect_delay_ms = 10;
        config
    }
}
