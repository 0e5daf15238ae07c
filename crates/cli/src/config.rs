//! Configuration loading from zcap.toml.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use zcap::VerifierOptions;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Capability store configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Verification policy.
    #[serde(default)]
    pub verifier: VerifierOptions,

    /// Log levels.
    #[serde(default)]
    pub log: LogConfig,
}

/// Capability store configuration.
#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database. Defaults to the user data directory.
    pub path: Option<PathBuf>,
}

/// Log level table.
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Level for modules without an entry in `modules`.
    #[serde(default = "default_level")]
    pub level: String,

    /// Per-module levels, e.g. `zcap = "debug"`.
    #[serde(default)]
    pub modules: BTreeMap<String, String>,

    /// Modules whose log lines include file and line.
    #[serde(default)]
    pub caller_info: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            modules: BTreeMap::new(),
            caller_info: Vec::new(),
        }
    }
}

fn default_level() -> String {
    "warn".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config
            .verifier
            .validate()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
