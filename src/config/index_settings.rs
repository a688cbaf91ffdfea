//! Per-index settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::types::{Index, INDEX_UUID_NA_VALUE};
use crate::Result;

/// Default bound on shard lock acquisition
pub const DEFAULT_SHARD_LOCK_TIMEOUT_MS: u64 = 5_000;

/// Settings for a single managed index
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexSettings {
    /// Index name
    pub name: String,
    /// Stable index UUID
    pub uuid: String,
    /// Maximum time to wait for a shard lock, in milliseconds
    pub shard_lock_timeout_ms: u64,
    /// Number of shards the binary creates at startup
    pub number_of_shards: u32,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            name: "index".to_string(),
            uuid: INDEX_UUID_NA_VALUE.to_string(),
            shard_lock_timeout_ms: DEFAULT_SHARD_LOCK_TIMEOUT_MS,
            number_of_shards: 1,
        }
    }
}

impl IndexSettings {
    /// Settings for a named index with all other values defaulted
    pub fn named(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            ..Default::default()
        }
    }

    /// Index identifier described by these settings
    pub fn index(&self) -> Index {
        Index::new(self.name.clone(), self.uuid.clone())
    }

    /// Shard lock acquisition bound
    pub fn shard_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.shard_lock_timeout_ms)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("index.name must not be empty".into()));
        }

        if self.uuid.is_empty() {
            return Err(Error::Config("index.uuid must not be empty".into()));
        }

        if self.shard_lock_timeout_ms == 0 {
            return Err(Error::Config("index.shard_lock_timeout_ms must be positive".into()));
        }

        Ok(())
    }
}
