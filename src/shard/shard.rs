//! Live shard handle

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::error::SubsystemError;
use crate::types::{Ordinal, ShardId};

use super::lock::ShardLock;
use super::subsystem::SubsystemBundle;

/// Shard lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShardState {
    /// Shard has been constructed but not yet recovered
    Created,
    /// Shard is recovering its data
    Recovering,
    /// Recovery finished, shard not yet started
    PostRecovery,
    /// Shard is serving operations
    Started,
    /// Shard has been handed over to another node
    Relocated,
    /// Shard is closed (terminal)
    Closed,
}

impl ShardState {
    /// Lowercase label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            ShardState::Created => "created",
            ShardState::Recovering => "recovering",
            ShardState::PostRecovery => "post_recovery",
            ShardState::Started => "started",
            ShardState::Relocated => "relocated",
            ShardState::Closed => "closed",
        }
    }
}

impl fmt::Display for ShardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A constructed shard together with its subsystems.
///
/// Shards are shared as `Arc<Shard>` between the registry snapshot and any
/// reader that looked them up. The shard lock travels with the shard from
/// registration until the closer takes it back out during removal.
pub struct Shard {
    /// Shard identifier
    shard_id: ShardId,
    /// Current state
    state: RwLock<ShardState>,
    /// Per-shard subsystems
    bundle: SubsystemBundle,
    /// File-level ownership of the shard location
    lock: Mutex<Option<ShardLock>>,
    /// Construction time
    created_at: Instant,
}

impl Shard {
    pub(crate) fn new(shard_id: ShardId, bundle: SubsystemBundle, lock: ShardLock) -> Self {
        Self {
            shard_id,
            state: RwLock::new(ShardState::Created),
            bundle,
            lock: Mutex::new(Some(lock)),
            created_at: Instant::now(),
        }
    }

    /// Get shard ID
    pub fn shard_id(&self) -> &ShardId {
        &self.shard_id
    }

    /// Get the shard ordinal
    pub fn ordinal(&self) -> Ordinal {
        self.shard_id.ordinal()
    }

    /// Current state
    pub fn state(&self) -> ShardState {
        *self.state.read()
    }

    /// Whether the shard has been closed
    pub fn is_closed(&self) -> bool {
        self.state() == ShardState::Closed
    }

    /// Per-shard subsystems
    pub fn bundle(&self) -> &SubsystemBundle {
        &self.bundle
    }

    /// Time since the shard was constructed
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Whether the shard still owns its lock
    pub fn holds_lock(&self) -> bool {
        self.lock.lock().is_some()
    }

    /// Move the shard to a new non-terminal state.
    ///
    /// Returns the previous state, or `None` if the shard is already closed.
    /// Callers go through `IndexService::update_shard_state` so listeners
    /// observe the transition.
    pub(crate) fn update_state(&self, next: ShardState) -> Option<ShardState> {
        if next == ShardState::Closed {
            return None;
        }
        let mut state = self.state.write();
        if *state == ShardState::Closed {
            return None;
        }
        let previous = *state;
        *state = next;
        Some(previous)
    }

    /// Stop routing operations to this shard.
    ///
    /// Returns the state the shard was in before closing.
    pub(crate) fn close(&self, reason: &str) -> Result<ShardState, SubsystemError> {
        let mut state = self.state.write();
        if *state == ShardState::Closed {
            return Err(SubsystemError::AlreadyClosed);
        }
        let previous = *state;
        *state = ShardState::Closed;
        tracing::debug!("{} state: [{}]->[closed], reason [{}]", self.shard_id, previous, reason);
        Ok(previous)
    }

    pub(crate) fn take_lock(&self) -> Option<ShardLock> {
        self.lock.lock().take()
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("shard_id", &self.shard_id)
            .field("state", &self.state())
            .finish()
    }
}
