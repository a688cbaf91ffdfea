//! Core error types for shard lifecycle management

use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::types::ShardId;

/// Main error type for shard lifecycle operations
#[derive(Error, Debug)]
pub enum Error {
    /// Creation attempted after the index was closed
    #[error("Can't create shard {shard_id}, index closed")]
    IndexClosed { shard_id: ShardId },

    /// A shard with the same ordinal is already registered
    #[error("Shard {0} already exists")]
    ShardAlreadyExists(ShardId),

    /// Shard lock could not be acquired in time
    #[error("Failed to obtain shard lock for {shard_id} within {timeout:?}")]
    ShardLockTimeout { shard_id: ShardId, timeout: Duration },

    /// Subsystem construction failed; the shard was rolled back
    #[error("Failed to create shard {shard_id}: {source}")]
    ShardCreation {
        shard_id: ShardId,
        #[source]
        source: SubsystemError,
    },

    /// Requested shard is not registered
    #[error("Shard {0} missing")]
    ShardMissing(ShardId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error from system operations
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether re-issuing the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ShardLockTimeout { .. })
    }

    /// Shard the error refers to, if any
    pub fn shard_id(&self) -> Option<&ShardId> {
        match self {
            Error::IndexClosed { shard_id }
            | Error::ShardLockTimeout { shard_id, .. }
            | Error::ShardCreation { shard_id, .. } => Some(shard_id),
            Error::ShardAlreadyExists(shard_id) | Error::ShardMissing(shard_id) => Some(shard_id),
            _ => None,
        }
    }
}

/// Errors raised by per-shard subsystems during construction or close
#[derive(Error, Debug)]
pub enum SubsystemError {
    /// Invalid subsystem configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A dependency was missing or unusable
    #[error("dependency wiring error: {0}")]
    Wiring(String),

    /// The subsystem was already closed
    #[error("already closed")]
    AlreadyClosed,

    /// Any other failure
    #[error("{0}")]
    Other(String),
}

impl SubsystemError {
    /// Failures that only signal an idempotent repeat close
    pub fn is_benign(&self) -> bool {
        matches!(self, SubsystemError::AlreadyClosed)
    }
}
