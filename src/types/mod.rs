//! Core identifier types for index shards

use std::fmt;
use std::sync::Arc;

/// Shard ordinal within an index
pub type Ordinal = u32;

/// UUID reported for indices created without one
pub const INDEX_UUID_NA_VALUE: &str = "_na_";

/// Logical index identifier (name plus stable UUID)
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Index {
    /// Index name
    name: Arc<str>,
    /// Stable index UUID
    uuid: Arc<str>,
}

impl Index {
    /// Create a new index identifier
    pub fn new(name: impl Into<String>, uuid: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            uuid: Arc::from(uuid.into()),
        }
    }

    /// Create an index identifier without a known UUID
    pub fn unassigned(name: impl Into<String>) -> Self {
        Self::new(name, INDEX_UUID_NA_VALUE)
    }

    /// Index name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index UUID
    pub fn uuid(&self) -> &str {
        &self.uuid
    }
}

impl fmt::Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.name)
    }
}

/// Shard identifier: the owning index plus the shard ordinal
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ShardId {
    /// Owning index
    index: Index,
    /// Ordinal within the index
    ordinal: Ordinal,
}

impl ShardId {
    /// Create a new shard identifier
    pub fn new(index: Index, ordinal: Ordinal) -> Self {
        Self { index, ordinal }
    }

    /// Owning index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Ordinal within the index
    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}][{}]", self.index.name(), self.ordinal)
    }
}
