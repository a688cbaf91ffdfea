//! Configuration management for shard lifecycle

mod index_settings;

pub use index_settings::IndexSettings;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Node-level configuration
    pub node: NodeConfig,
    /// Settings for the managed index
    pub index: IndexSettings,
}

/// Node configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory holding per-shard lock files
    pub data_dir: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        if self.node.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("node.data_dir must not be empty".into()));
        }
        self.index.validate()
    }
}
