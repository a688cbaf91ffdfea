//! Shard lifecycle notifications

use std::sync::Arc;

use crate::types::ShardId;

use super::shard::{Shard, ShardState};

/// Observer of shard creation and removal.
///
/// All hooks default to no-ops so listeners only implement what they need.
pub trait IndexLifecycleListener: Send + Sync {
    /// Called once the shard lock is held, before any subsystem is built
    fn before_shard_created(&self, _shard_id: &ShardId) {}

    /// Called once the shard is fully wired, before it becomes visible
    fn after_shard_created(&self, _shard: &Arc<Shard>) {}

    /// Called on every state transition this crate drives
    fn index_shard_state_changed(
        &self,
        _shard: &Arc<Shard>,
        _previous: Option<ShardState>,
        _reason: &str,
    ) {
    }

    /// Called after the shard is unpublished, before teardown starts
    fn before_shard_closed(&self, _shard_id: &ShardId, _shard: &Arc<Shard>) {}

    /// Called after teardown, while the store is still open
    fn after_shard_closed(&self, _shard_id: &ShardId, _shard: &Arc<Shard>) {}
}

/// Fan-out over registered listeners, in registration order
#[derive(Clone, Default)]
pub struct LifecycleListeners {
    listeners: Vec<Arc<dyn IndexLifecycleListener>>,
}

impl LifecycleListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&mut self, listener: Arc<dyn IndexLifecycleListener>) {
        self.listeners.push(listener);
    }

    /// Builder-style variant of [`add`](Self::add)
    pub fn with(mut self, listener: Arc<dyn IndexLifecycleListener>) -> Self {
        self.add(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl IndexLifecycleListener for LifecycleListeners {
    fn before_shard_created(&self, shard_id: &ShardId) {
        for listener in &self.listeners {
            listener.before_shard_created(shard_id);
        }
    }

    fn after_shard_created(&self, shard: &Arc<Shard>) {
        for listener in &self.listeners {
            listener.after_shard_created(shard);
        }
    }

    fn index_shard_state_changed(
        &self,
        shard: &Arc<Shard>,
        previous: Option<ShardState>,
        reason: &str,
    ) {
        for listener in &self.listeners {
            listener.index_shard_state_changed(shard, previous, reason);
        }
    }

    fn before_shard_closed(&self, shard_id: &ShardId, shard: &Arc<Shard>) {
        for listener in &self.listeners {
            listener.before_shard_closed(shard_id, shard);
        }
    }

    fn after_shard_closed(&self, shard_id: &ShardId, shard: &Arc<Shard>) {
        for listener in &self.listeners {
            listener.after_shard_closed(shard_id, shard);
        }
    }
}
