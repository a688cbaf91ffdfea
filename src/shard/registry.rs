//! Copy-on-write registry of live shards.
//!
//! Readers load the current [`RegistrySnapshot`] with a single atomic load and
//! never block. Writers build a new snapshot from the current one plus one
//! insertion or deletion and publish it with a compare-and-swap; a published
//! snapshot is never mutated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::Error;
use crate::types::{Index, Ordinal, ShardId};
use crate::Result;

use super::shard::Shard;

/// Immutable point-in-time view of the registered shards
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    shards: BTreeMap<Ordinal, Arc<Shard>>,
    version: u64,
}

impl RegistrySnapshot {
    /// Look up a shard by ordinal
    pub fn get(&self, ordinal: Ordinal) -> Option<&Arc<Shard>> {
        self.shards.get(&ordinal)
    }

    /// Check if an ordinal is registered
    pub fn contains(&self, ordinal: Ordinal) -> bool {
        self.shards.contains_key(&ordinal)
    }

    /// Registered ordinals
    pub fn ordinals(&self) -> BTreeSet<Ordinal> {
        self.shards.keys().copied().collect()
    }

    /// Iterate shards in ordinal order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Shard>> {
        self.shards.values()
    }

    /// Number of registered shards
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Publication counter, incremented on every change
    pub fn version(&self) -> u64 {
        self.version
    }

    fn with_inserted(&self, shard: Arc<Shard>) -> Self {
        let mut shards = self.shards.clone();
        shards.insert(shard.ordinal(), shard);
        Self {
            shards,
            version: self.version + 1,
        }
    }

    fn with_removed(&self, ordinal: Ordinal) -> Self {
        let mut shards = self.shards.clone();
        shards.remove(&ordinal);
        Self {
            shards,
            version: self.version + 1,
        }
    }
}

/// Lookup-only view of an index's shards
pub trait ShardLookup: Send + Sync {
    /// Look up a shard by ordinal
    fn shard(&self, ordinal: Ordinal) -> Option<Arc<Shard>>;

    /// Registered ordinals
    fn shard_ids(&self) -> BTreeSet<Ordinal>;
}

/// Registry of the live shards of one index
pub struct ShardRegistry {
    /// Owning index
    index: Index,
    /// Currently published snapshot
    current: ArcSwap<RegistrySnapshot>,
}

impl ShardRegistry {
    /// Create an empty registry
    pub fn new(index: Index) -> Self {
        Self {
            index,
            current: ArcSwap::from_pointee(RegistrySnapshot::default()),
        }
    }

    /// Owning index
    pub fn index(&self) -> &Index {
        &self.index
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.load_full()
    }

    /// Look up a shard by ordinal
    pub fn get(&self, ordinal: Ordinal) -> Option<Arc<Shard>> {
        self.current.load().get(ordinal).cloned()
    }

    /// Look up a shard, failing with [`Error::ShardMissing`] if absent
    pub fn get_or_fail(&self, ordinal: Ordinal) -> Result<Arc<Shard>> {
        self.get(ordinal)
            .ok_or_else(|| Error::ShardMissing(ShardId::new(self.index.clone(), ordinal)))
    }

    /// Check if an ordinal is registered
    pub fn contains(&self, ordinal: Ordinal) -> bool {
        self.current.load().contains(ordinal)
    }

    /// Registered ordinals at call time
    pub fn ids(&self) -> BTreeSet<Ordinal> {
        self.current.load().ordinals()
    }

    /// Number of registered shards
    pub fn count(&self) -> usize {
        self.current.load().len()
    }

    /// Publish a snapshot containing `shard`.
    ///
    /// Fails with [`Error::ShardAlreadyExists`] if the ordinal is taken in
    /// the snapshot being replaced.
    pub(crate) fn insert(&self, shard: Arc<Shard>) -> Result<()> {
        let mut current = self.current.load_full();
        loop {
            if current.contains(shard.ordinal()) {
                return Err(Error::ShardAlreadyExists(shard.shard_id().clone()));
            }
            let next = Arc::new(current.with_inserted(shard.clone()));
            if self.publish(&current, next) {
                return Ok(());
            }
            current = self.current.load_full();
        }
    }

    /// Publish a snapshot without `ordinal`, returning the removed shard
    pub(crate) fn remove(&self, ordinal: Ordinal) -> Option<Arc<Shard>> {
        let mut current = self.current.load_full();
        loop {
            let removed = current.get(ordinal)?.clone();
            let next = Arc::new(current.with_removed(ordinal));
            if self.publish(&current, next) {
                return Some(removed);
            }
            current = self.current.load_full();
        }
    }

    /// Swap in `next` if `expected` is still the published snapshot
    fn publish(&self, expected: &Arc<RegistrySnapshot>, next: Arc<RegistrySnapshot>) -> bool {
        let prev = self.current.compare_and_swap(expected, next);
        Arc::ptr_eq(&prev, expected)
    }
}

impl ShardLookup for ShardRegistry {
    fn shard(&self, ordinal: Ordinal) -> Option<Arc<Shard>> {
        self.get(ordinal)
    }

    fn shard_ids(&self) -> BTreeSet<Ordinal> {
        self.ids()
    }
}
