//! Shard lifecycle metrics

use std::sync::Arc;

use prometheus::proto::MetricFamily;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};

use crate::types::ShardId;
use crate::Result;

use super::listener::IndexLifecycleListener;
use super::shard::{Shard, ShardState};

/// Prometheus-backed lifecycle listener
pub struct ShardMetrics {
    /// Prometheus registry
    registry: Registry,
    /// Shards published into the registry
    created: IntCounter,
    /// Shards fully torn down
    closed: IntCounter,
    /// Shards currently live
    active: IntGauge,
    /// State transitions, labelled by target state
    state_changes: IntCounterVec,
}

impl ShardMetrics {
    /// Create metrics labelled with the owning index
    pub fn new(index_name: &str) -> Result<Self> {
        let registry = Registry::new();

        let created = IntCounter::with_opts(
            Opts::new("index_shards_created_total", "Total shards created")
                .const_label("index", index_name),
        )?;
        registry.register(Box::new(created.clone()))?;

        let closed = IntCounter::with_opts(
            Opts::new("index_shards_closed_total", "Total shards closed")
                .const_label("index", index_name),
        )?;
        registry.register(Box::new(closed.clone()))?;

        let active = IntGauge::with_opts(
            Opts::new("index_shards_active", "Shards currently registered")
                .const_label("index", index_name),
        )?;
        registry.register(Box::new(active.clone()))?;

        let state_changes = IntCounterVec::new(
            Opts::new("index_shard_state_changes_total", "Shard state transitions")
                .const_label("index", index_name),
            &["state"],
        )?;
        registry.register(Box::new(state_changes.clone()))?;

        Ok(Self {
            registry,
            created,
            closed,
            active,
            state_changes,
        })
    }

    /// Total shards created
    pub fn created(&self) -> u64 {
        self.created.get()
    }

    /// Total shards closed
    pub fn closed(&self) -> u64 {
        self.closed.get()
    }

    /// Shards currently live
    pub fn active(&self) -> i64 {
        self.active.get()
    }

    /// Transitions into `state`
    pub fn state_changes(&self, state: ShardState) -> u64 {
        self.state_changes.with_label_values(&[state.as_str()]).get()
    }

    /// Get prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Collect all metric families
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }
}

impl IndexLifecycleListener for ShardMetrics {
    fn after_shard_created(&self, _shard: &Arc<Shard>) {
        self.created.inc();
        self.active.inc();
    }

    fn index_shard_state_changed(
        &self,
        shard: &Arc<Shard>,
        _previous: Option<ShardState>,
        _reason: &str,
    ) {
        self.state_changes
            .with_label_values(&[shard.state().as_str()])
            .inc();
    }

    fn after_shard_closed(&self, _shard_id: &ShardId, _shard: &Arc<Shard>) {
        self.closed.inc();
        self.active.dec();
    }
}
