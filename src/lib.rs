//! Shard lifecycle management for a single index
//!
//! Owns the live shards of one index: serialized creation and removal,
//! ordered best-effort teardown, and lock-free shard lookup through
//! copy-on-write registry snapshots.

#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod index;
pub mod shard;
pub mod types;

// Re-export main types
pub use config::{Config, IndexSettings};
pub use error::{Error, Result, SubsystemError};
pub use index::{IndexService, IndexServiceBuilder};
pub use shard::{Shard, ShardState};
pub use types::{Index, Ordinal, ShardId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
