//! Per-shard subsystems and their dependency-ordered construction

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::config::IndexSettings;
use crate::error::SubsystemError;
use crate::types::ShardId;

/// Result type for subsystem construction and close
pub type SubsystemResult<T> = std::result::Result<T, SubsystemError>;

/// Close contract shared by every per-shard collaborator.
///
/// `close` must be idempotent. A repeated close may report
/// [`SubsystemError::AlreadyClosed`].
pub trait Subsystem: Send + Sync + 'static {
    /// Release the resources held by this subsystem
    fn close(&self) -> SubsystemResult<()>;

    /// Downcast support for callers that know the concrete type
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to a subsystem
pub type SubsystemHandle = Arc<dyn Subsystem>;

/// Kinds of per-shard subsystems, in construction order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    Plugin,
    Store,
    DeletionPolicy,
    MergePolicy,
    MergeScheduler,
    FilterCache,
    QueryCache,
    BitsetFilterCache,
    FieldData,
    Translog,
    TranslogService,
    Engine,
    Gateway,
    PercolatorRegistry,
    TermVectors,
    Snapshot,
    Suggest,
}

impl SubsystemKind {
    /// Human readable name used in log messages
    pub fn as_str(&self) -> &'static str {
        match self {
            SubsystemKind::Plugin => "plugin shard service",
            SubsystemKind::Store => "store",
            SubsystemKind::DeletionPolicy => "deletion policy",
            SubsystemKind::MergePolicy => "merge policy",
            SubsystemKind::MergeScheduler => "merge scheduler",
            SubsystemKind::FilterCache => "filter cache",
            SubsystemKind::QueryCache => "query cache",
            SubsystemKind::BitsetFilterCache => "bitset filter cache",
            SubsystemKind::FieldData => "field data",
            SubsystemKind::Translog => "translog",
            SubsystemKind::TranslogService => "translog service",
            SubsystemKind::Engine => "engine",
            SubsystemKind::Gateway => "shard gateway",
            SubsystemKind::PercolatorRegistry => "percolator queries registry",
            SubsystemKind::TermVectors => "term vectors service",
            SubsystemKind::Snapshot => "snapshot service",
            SubsystemKind::Suggest => "suggest service",
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs available to every construction call
pub struct ShardContext<'a> {
    /// Shard being constructed
    pub shard_id: &'a ShardId,
    /// Settings of the owning index
    pub settings: &'a IndexSettings,
}

/// Per-shard caches
pub struct ShardCaches {
    pub filter: SubsystemHandle,
    pub query: SubsystemHandle,
    pub bitset_filter: SubsystemHandle,
}

/// Dependencies the engine is constructed against
pub struct EngineDeps<'a> {
    pub store: &'a SubsystemHandle,
    pub translog: &'a SubsystemHandle,
    pub deletion_policy: &'a SubsystemHandle,
    pub merge_policy: &'a SubsystemHandle,
    pub merge_scheduler: &'a SubsystemHandle,
}

/// Auxiliary per-shard services built on top of the engine
pub struct AuxiliaryServices {
    pub term_vectors: SubsystemHandle,
    pub snapshot: SubsystemHandle,
    pub suggest: SubsystemHandle,
}

/// Builds the per-shard subsystems.
///
/// Each method receives the subsystems it depends on, which have already
/// been constructed by the time it is called.
pub trait SubsystemFactory: Send + Sync {
    /// Plugin-provided per-shard services
    fn plugin_services(&self, _ctx: &ShardContext<'_>) -> SubsystemResult<Vec<SubsystemHandle>> {
        Ok(Vec::new())
    }

    fn store(&self, ctx: &ShardContext<'_>) -> SubsystemResult<SubsystemHandle>;

    fn deletion_policy(
        &self,
        ctx: &ShardContext<'_>,
        store: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle>;

    fn merge_policy(&self, ctx: &ShardContext<'_>) -> SubsystemResult<SubsystemHandle>;

    fn merge_scheduler(
        &self,
        ctx: &ShardContext<'_>,
        merge_policy: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle>;

    fn caches(&self, ctx: &ShardContext<'_>) -> SubsystemResult<ShardCaches>;

    fn field_data(&self, ctx: &ShardContext<'_>) -> SubsystemResult<SubsystemHandle>;

    fn translog(
        &self,
        ctx: &ShardContext<'_>,
        store: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle>;

    fn translog_service(
        &self,
        ctx: &ShardContext<'_>,
        translog: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle>;

    fn engine(
        &self,
        ctx: &ShardContext<'_>,
        deps: EngineDeps<'_>,
    ) -> SubsystemResult<SubsystemHandle>;

    fn gateway(
        &self,
        ctx: &ShardContext<'_>,
        engine: &SubsystemHandle,
        translog: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle>;

    fn percolator_registry(
        &self,
        ctx: &ShardContext<'_>,
        engine: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle>;

    fn auxiliary_services(
        &self,
        ctx: &ShardContext<'_>,
        engine: &SubsystemHandle,
    ) -> SubsystemResult<AuxiliaryServices>;

    /// Drop whatever per-shard scope the factory keeps once the shard is gone
    fn release_scope(&self, _shard_id: &ShardId) {}
}

/// Fully wired per-shard subsystems
pub struct SubsystemBundle {
    pub plugins: Vec<SubsystemHandle>,
    pub store: SubsystemHandle,
    pub deletion_policy: SubsystemHandle,
    pub merge_policy: SubsystemHandle,
    pub merge_scheduler: SubsystemHandle,
    pub caches: ShardCaches,
    pub field_data: SubsystemHandle,
    pub translog: SubsystemHandle,
    pub translog_service: SubsystemHandle,
    pub engine: SubsystemHandle,
    pub gateway: SubsystemHandle,
    pub percolator_registry: SubsystemHandle,
    pub auxiliary: AuxiliaryServices,
}

impl SubsystemBundle {
    /// Collaborators that teardown does not close explicitly, in reverse
    /// construction order
    pub(crate) fn scoped(&self) -> [(SubsystemKind, &SubsystemHandle); 8] {
        [
            (SubsystemKind::Suggest, &self.auxiliary.suggest),
            (SubsystemKind::Snapshot, &self.auxiliary.snapshot),
            (SubsystemKind::TermVectors, &self.auxiliary.term_vectors),
            (SubsystemKind::FieldData, &self.field_data),
            (SubsystemKind::BitsetFilterCache, &self.caches.bitset_filter),
            (SubsystemKind::QueryCache, &self.caches.query),
            (SubsystemKind::FilterCache, &self.caches.filter),
            (SubsystemKind::DeletionPolicy, &self.deletion_policy),
        ]
    }
}

/// Subsystems built so far; closed in reverse order if wiring fails
#[derive(Default)]
struct PartialBundle {
    built: Vec<(SubsystemKind, SubsystemHandle)>,
}

impl PartialBundle {
    fn track(&mut self, kind: SubsystemKind, handle: &SubsystemHandle) {
        self.built.push((kind, handle.clone()));
    }

    fn add(&mut self, kind: SubsystemKind, handle: SubsystemHandle) -> SubsystemHandle {
        self.track(kind, &handle);
        handle
    }

    fn unwind(self, shard_id: &ShardId) {
        for (kind, handle) in self.built.into_iter().rev() {
            if let Err(e) = handle.close() {
                tracing::debug!("{} failed to close {} during rollback: {}", shard_id, kind, e);
            }
        }
    }
}

/// Build every subsystem of a shard in dependency order.
///
/// On failure the subsystems constructed so far are closed in reverse order
/// and the root cause is returned.
pub fn build_bundle(
    factory: &dyn SubsystemFactory,
    ctx: &ShardContext<'_>,
) -> SubsystemResult<SubsystemBundle> {
    let mut partial = PartialBundle::default();
    match wire(factory, ctx, &mut partial) {
        Ok(bundle) => Ok(bundle),
        Err(e) => {
            partial.unwind(ctx.shard_id);
            Err(e)
        }
    }
}

fn wire(
    factory: &dyn SubsystemFactory,
    ctx: &ShardContext<'_>,
    partial: &mut PartialBundle,
) -> SubsystemResult<SubsystemBundle> {
    let plugins = factory.plugin_services(ctx)?;
    for plugin in &plugins {
        partial.track(SubsystemKind::Plugin, plugin);
    }

    let store = partial.add(SubsystemKind::Store, factory.store(ctx)?);
    let deletion_policy = partial.add(
        SubsystemKind::DeletionPolicy,
        factory.deletion_policy(ctx, &store)?,
    );
    let merge_policy = partial.add(SubsystemKind::MergePolicy, factory.merge_policy(ctx)?);
    let merge_scheduler = partial.add(
        SubsystemKind::MergeScheduler,
        factory.merge_scheduler(ctx, &merge_policy)?,
    );

    let caches = factory.caches(ctx)?;
    partial.track(SubsystemKind::FilterCache, &caches.filter);
    partial.track(SubsystemKind::QueryCache, &caches.query);
    partial.track(SubsystemKind::BitsetFilterCache, &caches.bitset_filter);

    let field_data = partial.add(SubsystemKind::FieldData, factory.field_data(ctx)?);
    let translog = partial.add(SubsystemKind::Translog, factory.translog(ctx, &store)?);
    let translog_service = partial.add(
        SubsystemKind::TranslogService,
        factory.translog_service(ctx, &translog)?,
    );

    let engine = factory.engine(
        ctx,
        EngineDeps {
            store: &store,
            translog: &translog,
            deletion_policy: &deletion_policy,
            merge_policy: &merge_policy,
            merge_scheduler: &merge_scheduler,
        },
    )?;
    let engine = partial.add(SubsystemKind::Engine, engine);

    let gateway = partial.add(
        SubsystemKind::Gateway,
        factory.gateway(ctx, &engine, &translog)?,
    );
    let percolator_registry = partial.add(
        SubsystemKind::PercolatorRegistry,
        factory.percolator_registry(ctx, &engine)?,
    );

    let auxiliary = factory.auxiliary_services(ctx, &engine)?;

    Ok(SubsystemBundle {
        plugins,
        store,
        deletion_policy,
        merge_policy,
        merge_scheduler,
        caches,
        field_data,
        translog,
        translog_service,
        engine,
        gateway,
        percolator_registry,
        auxiliary,
    })
}
