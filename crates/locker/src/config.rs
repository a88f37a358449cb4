//! Configuration loading

use anyhow::{Context, Result, bail};
use locker_storage::{DiskConfig, StorageConfig};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_storages")]
    pub storages: Vec<StorageConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_storages() -> Vec<StorageConfig> {
    vec![
        StorageConfig::disk("Disk", DiskConfig::default()),
        StorageConfig::ram("Ram"),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            storages: default_storages(),
        }
    }
}

impl Config {
    /// Load configuration from a file; a missing file yields the defaults
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        config.validate()?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            bail!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            );
        }

        let mut names = HashSet::new();
        for storage in &self.storages {
            if storage.name.trim().is_empty() {
                bail!("storage names must not be empty");
            }
            if !names.insert(storage.name.as_str()) {
                bail!("duplicate storage name: {}", storage.name);
            }
        }
        Ok(())
    }
}
