//! Per-index shard coordinator

use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::IndexSettings;
use crate::error::Error;
use crate::shard::{
    IndexLifecycleListener, LifecycleListeners, Shard, ShardCloser, ShardCreator,
    ShardLockManager, ShardRegistry, ShardState, SubsystemFactory,
};
use crate::types::{Index, Ordinal, ShardId};
use crate::Result;

use super::component::{IndexComponent, WeakShardLookup};

/// Builder for [`IndexService`]
pub struct IndexServiceBuilder {
    settings: IndexSettings,
    locks: Arc<dyn ShardLockManager>,
    factory: Arc<dyn SubsystemFactory>,
    listeners: LifecycleListeners,
    components: Vec<Arc<dyn IndexComponent>>,
}

impl IndexServiceBuilder {
    /// Register a lifecycle listener
    pub fn listener(mut self, listener: Arc<dyn IndexLifecycleListener>) -> Self {
        self.listeners.add(listener);
        self
    }

    /// Register an index-level component that needs shard lookup
    pub fn component(mut self, component: Arc<dyn IndexComponent>) -> Self {
        self.components.push(component);
        self
    }

    /// Validate settings and wire the service
    pub fn build(self) -> Result<IndexService> {
        self.settings.validate()?;

        let index = self.settings.index();
        let settings = Arc::new(self.settings);
        let registry = Arc::new(ShardRegistry::new(index.clone()));

        let creator = ShardCreator::new(
            settings.clone(),
            registry.clone(),
            self.locks.clone(),
            self.factory.clone(),
            self.listeners.clone(),
        );
        let closer = ShardCloser::new(
            registry.clone(),
            self.locks,
            self.factory,
            self.listeners.clone(),
        );

        // Post-construction wiring of components that need the registry
        for component in &self.components {
            component.bind_shard_lookup(Arc::new(WeakShardLookup::new(&registry)));
        }

        tracing::debug!("{} index service created ({} components)", index, self.components.len());

        Ok(IndexService {
            index,
            settings,
            registry,
            creator,
            closer,
            listeners: self.listeners,
            components: self.components,
            section: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }
}

/// Owns the shards of one index.
///
/// `create_shard`, `remove_shard` and `close` are serialized against each
/// other. Read accessors never take that section and always observe one
/// complete registry snapshot.
pub struct IndexService {
    /// Managed index
    index: Index,
    /// Index settings
    settings: Arc<IndexSettings>,
    /// Live shards
    registry: Arc<ShardRegistry>,
    /// Create path
    creator: ShardCreator,
    /// Remove path
    closer: ShardCloser,
    /// Lifecycle listeners, also notified of state updates
    listeners: LifecycleListeners,
    /// Index-level components bound to the registry
    components: Vec<Arc<dyn IndexComponent>>,
    /// Exclusive section for structural changes
    section: Mutex<()>,
    /// Set once by `close`
    closed: AtomicBool,
}

impl IndexService {
    /// Start building a service for the index described by `settings`
    pub fn builder(
        settings: IndexSettings,
        locks: Arc<dyn ShardLockManager>,
        factory: Arc<dyn SubsystemFactory>,
    ) -> IndexServiceBuilder {
        IndexServiceBuilder {
            settings,
            locks,
            factory,
            listeners: LifecycleListeners::new(),
            components: Vec::new(),
        }
    }

    /// Managed index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Index UUID
    pub fn index_uuid(&self) -> &str {
        self.index.uuid()
    }

    /// Index settings
    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    /// Shared registry of live shards
    pub fn registry(&self) -> &Arc<ShardRegistry> {
        &self.registry
    }

    /// Index-level components
    pub fn components(&self) -> &[Arc<dyn IndexComponent>] {
        &self.components
    }

    /// Whether the index has been closed
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of live shards
    pub fn number_of_shards(&self) -> usize {
        self.registry.count()
    }

    /// Ordinals of the live shards
    pub fn shard_ids(&self) -> BTreeSet<Ordinal> {
        self.registry.ids()
    }

    /// Whether shard `ordinal` is live
    pub fn has_shard(&self, ordinal: Ordinal) -> bool {
        self.registry.contains(ordinal)
    }

    /// Return the shard with the provided ordinal, if live
    pub fn shard(&self, ordinal: Ordinal) -> Option<Arc<Shard>> {
        self.registry.get(ordinal)
    }

    /// Return the shard with the provided ordinal, or [`Error::ShardMissing`]
    pub fn shard_safe(&self, ordinal: Ordinal) -> Result<Arc<Shard>> {
        self.registry.get_or_fail(ordinal)
    }

    /// All live shards from one snapshot, in ordinal order
    pub fn shards(&self) -> Vec<Arc<Shard>> {
        self.registry.snapshot().iter().cloned().collect()
    }

    /// Move live shard `ordinal` to a new non-terminal state.
    ///
    /// Listeners see the transition. Returns the previous state, or `None`
    /// if the shard was closed concurrently or `next` is `Closed`.
    pub fn update_shard_state(
        &self,
        ordinal: Ordinal,
        next: ShardState,
        reason: &str,
    ) -> Result<Option<ShardState>> {
        let shard = self.registry.get_or_fail(ordinal)?;
        let previous = shard.update_state(next);
        if let Some(previous) = previous {
            tracing::debug!("{} state: [{}]->[{}], reason [{}]", shard.shard_id(), previous, next, reason);
            self.listeners
                .index_shard_state_changed(&shard, Some(previous), reason);
        }
        Ok(previous)
    }

    /// Create and publish shard `ordinal`
    pub fn create_shard(&self, ordinal: Ordinal) -> Result<Arc<Shard>> {
        let _section = self.section.lock();
        if self.is_closed() {
            return Err(Error::IndexClosed {
                shard_id: ShardId::new(self.index.clone(), ordinal),
            });
        }
        self.creator.create(ordinal)
    }

    /// Remove shard `ordinal`.
    ///
    /// Removing a shard that is not live is a no-op. Teardown failures are
    /// logged and do not fail the call.
    pub fn remove_shard(&self, ordinal: Ordinal, reason: &str) -> Result<()> {
        let _section = self.section.lock();
        self.closer.remove(ordinal, reason);
        Ok(())
    }

    /// Close the index, removing every live shard.
    ///
    /// Only the first call does any work; later calls return immediately.
    pub fn close(&self, reason: &str) {
        let _section = self.section.lock();
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        let ordinals = self.registry.ids();
        tracing::debug!("{} closing {} shards (reason: [{}])", self.index, ordinals.len(), reason);

        for ordinal in ordinals {
            let removed = panic::catch_unwind(AssertUnwindSafe(|| {
                self.closer.remove(ordinal, reason);
            }));
            if removed.is_err() {
                tracing::warn!("{}[{}] failed to close shard", self.index, ordinal);
            }
        }
    }
}

impl Drop for IndexService {
    fn drop(&mut self) {
        if !self.is_closed() && self.number_of_shards() > 0 {
            tracing::warn!(
                "{} dropped with {} open shards, closing",
                self.index,
                self.number_of_shards()
            );
            self.close("index service dropped");
        }
    }
}
