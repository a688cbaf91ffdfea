//! Shard creation path

use std::sync::Arc;

use crate::config::IndexSettings;
use crate::error::Error;
use crate::types::{Index, Ordinal, ShardId};
use crate::Result;

use super::closer::teardown;
use super::listener::{IndexLifecycleListener, LifecycleListeners};
use super::lock::ShardLockManager;
use super::registry::ShardRegistry;
use super::shard::Shard;
use super::subsystem::{build_bundle, ShardContext, SubsystemFactory};

/// Reason reported with the initial state transition
pub const SHARD_CREATED_REASON: &str = "shard created";

/// Reason reported when a concurrently registered duplicate is torn down
const DUPLICATE_SHARD_REASON: &str = "duplicate shard";

/// Builds shards and publishes them into the registry.
///
/// Callers must serialize `create` against removal for the same index.
pub(crate) struct ShardCreator {
    index: Index,
    settings: Arc<IndexSettings>,
    registry: Arc<ShardRegistry>,
    locks: Arc<dyn ShardLockManager>,
    factory: Arc<dyn SubsystemFactory>,
    listeners: LifecycleListeners,
}

impl ShardCreator {
    pub(crate) fn new(
        settings: Arc<IndexSettings>,
        registry: Arc<ShardRegistry>,
        locks: Arc<dyn ShardLockManager>,
        factory: Arc<dyn SubsystemFactory>,
        listeners: LifecycleListeners,
    ) -> Self {
        Self {
            index: registry.index().clone(),
            settings,
            registry,
            locks,
            factory,
            listeners,
        }
    }

    /// Create, wire and publish the shard `ordinal`.
    ///
    /// On any failure the shard lock is released and the registry is left
    /// untouched.
    pub(crate) fn create(&self, ordinal: Ordinal) -> Result<Arc<Shard>> {
        let shard_id = ShardId::new(self.index.clone(), ordinal);

        // Checked before locking: a live shard holds its own lock
        if self.registry.contains(ordinal) {
            return Err(Error::ShardAlreadyExists(shard_id));
        }

        let lock = self
            .locks
            .acquire(&shard_id, self.settings.shard_lock_timeout())?;

        self.listeners.before_shard_created(&shard_id);
        tracing::debug!("creating shard_id {}", shard_id);

        let ctx = ShardContext {
            shard_id: &shard_id,
            settings: &self.settings,
        };
        let bundle = match build_bundle(self.factory.as_ref(), &ctx) {
            Ok(bundle) => bundle,
            Err(source) => {
                self.locks.release(lock);
                tracing::debug!("{} creation failed, rolled back: {}", shard_id, source);
                return Err(Error::ShardCreation { shard_id, source });
            }
        };

        let shard = Arc::new(Shard::new(shard_id.clone(), bundle, lock));
        self.listeners
            .index_shard_state_changed(&shard, None, SHARD_CREATED_REASON);
        self.listeners.after_shard_created(&shard);

        if let Err(e) = self.registry.insert(shard.clone()) {
            self.discard(&shard);
            return Err(e);
        }

        tracing::debug!("{} created", shard_id);
        Ok(shard)
    }

    /// Undo a shard that was built but lost the race to registration.
    ///
    /// Listeners already saw it created, so it is closed through the regular
    /// teardown to keep their view balanced.
    fn discard(&self, shard: &Arc<Shard>) {
        tracing::warn!("{} registered concurrently, discarding new instance", shard.shard_id());
        teardown(
            shard,
            DUPLICATE_SHARD_REASON,
            self.locks.as_ref(),
            self.factory.as_ref(),
            &self.listeners,
        );
    }
}
