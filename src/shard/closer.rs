//! Shard removal path
//!
//! Teardown is best-effort: every step runs in its own guard, so a failing
//! or panicking subsystem is logged and the remaining steps still run. The
//! order below is fixed.
//!
//! 1. plugin shard services
//! 2. translog service
//! 3. the shard itself (no more operations are routed to it)
//! 4. engine
//! 5. merge scheduler, then merge policy
//! 6. shard gateway
//! 7. translog
//! 8. percolator queries registry
//! 9. `after_shard_closed` listeners, then the store
//! 10. shard lock, then the remaining per-shard scope

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::types::{Ordinal, ShardId};

use super::listener::{IndexLifecycleListener, LifecycleListeners};
use super::lock::ShardLockManager;
use super::registry::ShardRegistry;
use super::shard::Shard;
use super::subsystem::{SubsystemFactory, SubsystemHandle, SubsystemKind, SubsystemResult};

/// Removes shards from the registry and tears down their subsystems.
///
/// Callers must serialize `remove` against creation for the same index.
pub(crate) struct ShardCloser {
    registry: Arc<ShardRegistry>,
    locks: Arc<dyn ShardLockManager>,
    factory: Arc<dyn SubsystemFactory>,
    listeners: LifecycleListeners,
}

impl ShardCloser {
    pub(crate) fn new(
        registry: Arc<ShardRegistry>,
        locks: Arc<dyn ShardLockManager>,
        factory: Arc<dyn SubsystemFactory>,
        listeners: LifecycleListeners,
    ) -> Self {
        Self {
            registry,
            locks,
            factory,
            listeners,
        }
    }

    /// Unpublish and tear down the shard `ordinal`.
    ///
    /// Returns `false` if no such shard was registered. Teardown failures are
    /// logged, never returned.
    pub(crate) fn remove(&self, ordinal: Ordinal, reason: &str) -> bool {
        let Some(shard) = self.registry.remove(ordinal) else {
            return false;
        };
        teardown(&shard, reason, self.locks.as_ref(), self.factory.as_ref(), &self.listeners);
        true
    }
}

/// Tear down a shard that is no longer published, firing the close hooks
pub(crate) fn teardown(
    shard: &Arc<Shard>,
    reason: &str,
    locks: &dyn ShardLockManager,
    factory: &dyn SubsystemFactory,
    listeners: &LifecycleListeners,
) {
    let shard_id = shard.shard_id();
    tracing::debug!("{} closing... (reason: [{}])", shard_id, reason);

    listeners.before_shard_closed(shard_id, shard);

    close_subsystems(shard, reason, listeners);

    // Listeners may still use the store while cleaning up
    listeners.after_shard_closed(shard_id, shard);
    close_store(shard);

    match shard.take_lock() {
        Some(lock) => locks.release(lock),
        None => tracing::warn!("{} shard lock already released", shard_id),
    }

    close_scoped(shard);
    factory.release_scope(shard_id);

    tracing::debug!("{} closed (reason: [{}])", shard_id, reason);
}

/// Close everything that must go before the store, in teardown order
fn close_subsystems(shard: &Arc<Shard>, reason: &str, listeners: &LifecycleListeners) {
    let shard_id = shard.shard_id();
    let bundle = shard.bundle();

    for plugin in &bundle.plugins {
        close_handle(shard_id, SubsystemKind::Plugin, plugin);
    }
    close_handle(shard_id, SubsystemKind::TranslogService, &bundle.translog_service);

    guarded(shard_id, "index shard", || {
        let previous = shard.close(reason)?;
        listeners.index_shard_state_changed(shard, Some(previous), reason);
        Ok(())
    });

    close_handle(shard_id, SubsystemKind::Engine, &bundle.engine);
    close_handle(shard_id, SubsystemKind::MergeScheduler, &bundle.merge_scheduler);
    close_handle(shard_id, SubsystemKind::MergePolicy, &bundle.merge_policy);
    close_handle(shard_id, SubsystemKind::Gateway, &bundle.gateway);
    close_handle(shard_id, SubsystemKind::Translog, &bundle.translog);
    close_handle(shard_id, SubsystemKind::PercolatorRegistry, &bundle.percolator_registry);
}

/// Close the store; runs after every other subsystem is down
fn close_store(shard: &Shard) {
    close_handle(shard.shard_id(), SubsystemKind::Store, &shard.bundle().store);
}

/// Close collaborators not covered by the ordered teardown
fn close_scoped(shard: &Shard) {
    for (kind, handle) in shard.bundle().scoped() {
        close_handle(shard.shard_id(), kind, handle);
    }
}

fn close_handle(shard_id: &ShardId, kind: SubsystemKind, handle: &SubsystemHandle) {
    guarded(shard_id, kind.as_str(), || handle.close());
}

/// Run one teardown step, absorbing errors and panics.
///
/// Repeat closes are expected during teardown and only logged at debug.
fn guarded<F>(shard_id: &ShardId, what: &str, step: F)
where
    F: FnOnce() -> SubsystemResult<()>,
{
    match panic::catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_benign() => {
            tracing::debug!("{} {} already closed", shard_id, what);
        }
        Ok(Err(e)) => {
            tracing::warn!("{} failed to close {}: {}", shard_id, what, e);
        }
        Err(_) => {
            tracing::warn!("{} panicked while closing {}", shard_id, what);
        }
    }
}
