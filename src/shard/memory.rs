//! In-memory subsystems with no persistence
//!
//! Every slot of the bundle is filled with a [`MemorySubsystem`] that only
//! tracks whether it has been closed. Used by the binary and by tests that do
//! not care about subsystem behaviour.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::SubsystemError;

use super::subsystem::{
    AuxiliaryServices, EngineDeps, ShardCaches, ShardContext, Subsystem, SubsystemFactory,
    SubsystemHandle, SubsystemKind, SubsystemResult,
};

/// Subsystem with no resources besides its closed flag
#[derive(Debug)]
pub struct MemorySubsystem {
    kind: SubsystemKind,
    closed: AtomicBool,
}

impl MemorySubsystem {
    pub fn new(kind: SubsystemKind) -> Self {
        Self {
            kind,
            closed: AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> SubsystemKind {
        self.kind
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Subsystem for MemorySubsystem {
    fn close(&self) -> SubsystemResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(SubsystemError::AlreadyClosed);
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory producing [`MemorySubsystem`]s for every slot
#[derive(Debug, Default, Clone)]
pub struct MemorySubsystemFactory;

impl MemorySubsystemFactory {
    pub fn new() -> Self {
        Self
    }

    fn make(kind: SubsystemKind) -> SubsystemHandle {
        Arc::new(MemorySubsystem::new(kind))
    }
}

impl SubsystemFactory for MemorySubsystemFactory {
    fn store(&self, _ctx: &ShardContext<'_>) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::Store))
    }

    fn deletion_policy(
        &self,
        _ctx: &ShardContext<'_>,
        _store: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::DeletionPolicy))
    }

    fn merge_policy(&self, _ctx: &ShardContext<'_>) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::MergePolicy))
    }

    fn merge_scheduler(
        &self,
        _ctx: &ShardContext<'_>,
        _merge_policy: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::MergeScheduler))
    }

    fn caches(&self, _ctx: &ShardContext<'_>) -> SubsystemResult<ShardCaches> {
        Ok(ShardCaches {
            filter: Self::make(SubsystemKind::FilterCache),
            query: Self::make(SubsystemKind::QueryCache),
            bitset_filter: Self::make(SubsystemKind::BitsetFilterCache),
        })
    }

    fn field_data(&self, _ctx: &ShardContext<'_>) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::FieldData))
    }

    fn translog(
        &self,
        _ctx: &ShardContext<'_>,
        _store: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::Translog))
    }

    fn translog_service(
        &self,
        _ctx: &ShardContext<'_>,
        _translog: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::TranslogService))
    }

    fn engine(
        &self,
        _ctx: &ShardContext<'_>,
        _deps: EngineDeps<'_>,
    ) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::Engine))
    }

    fn gateway(
        &self,
        _ctx: &ShardContext<'_>,
        _engine: &SubsystemHandle,
        _translog: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::Gateway))
    }

    fn percolator_registry(
        &self,
        _ctx: &ShardContext<'_>,
        _engine: &SubsystemHandle,
    ) -> SubsystemResult<SubsystemHandle> {
        Ok(Self::make(SubsystemKind::PercolatorRegistry))
    }

    fn auxiliary_services(
        &self,
        _ctx: &ShardContext<'_>,
        _engine: &SubsystemHandle,
    ) -> SubsystemResult<AuxiliaryServices> {
        Ok(AuxiliaryServices {
            term_vectors: Self::make(SubsystemKind::TermVectors),
            snapshot: Self::make(SubsystemKind::Snapshot),
            suggest: Self::make(SubsystemKind::Suggest),
        })
    }
}
