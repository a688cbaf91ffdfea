//! Index-level components that need to see the index's shards
//!
//! Such components are built before the index service exists, so the shard
//! lookup is injected afterwards through [`IndexComponent::bind_shard_lookup`].
//! The lookup holds the registry weakly and never keeps the index alive.

use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::shard::{Shard, ShardLookup, ShardRegistry};
use crate::types::Ordinal;

/// Component owned by an index service that looks up the index's shards
pub trait IndexComponent: Send + Sync {
    /// Inject the shard lookup once the index service is wired
    fn bind_shard_lookup(&self, lookup: Arc<dyn ShardLookup>);
}

/// Lookup over a registry that may already be gone
pub(crate) struct WeakShardLookup {
    registry: Weak<ShardRegistry>,
}

impl WeakShardLookup {
    pub(crate) fn new(registry: &Arc<ShardRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }
}

impl ShardLookup for WeakShardLookup {
    fn shard(&self, ordinal: Ordinal) -> Option<Arc<Shard>> {
        self.registry.upgrade()?.get(ordinal)
    }

    fn shard_ids(&self) -> BTreeSet<Ordinal> {
        self.registry
            .upgrade()
            .map(|registry| registry.ids())
            .unwrap_or_default()
    }
}

/// Slot holding an injected shard lookup.
///
/// Embed in an [`IndexComponent`] and forward `bind_shard_lookup` to
/// [`LookupSlot::bind`].
#[derive(Default)]
pub struct LookupSlot {
    lookup: RwLock<Option<Arc<dyn ShardLookup>>>,
}

impl LookupSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the lookup, replacing any previous one
    pub fn bind(&self, lookup: Arc<dyn ShardLookup>) {
        *self.lookup.write() = Some(lookup);
    }

    /// Whether a lookup has been injected
    pub fn is_bound(&self) -> bool {
        self.lookup.read().is_some()
    }

    /// Look up a shard; `None` before binding
    pub fn shard(&self, ordinal: Ordinal) -> Option<Arc<Shard>> {
        self.lookup.read().as_ref()?.shard(ordinal)
    }

    /// Registered ordinals; empty before binding
    pub fn shard_ids(&self) -> BTreeSet<Ordinal> {
        self.lookup
            .read()
            .as_ref()
            .map(|lookup| lookup.shard_ids())
            .unwrap_or_default()
    }
}
