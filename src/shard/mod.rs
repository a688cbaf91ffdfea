//! Shard lifecycle: construction, registration and teardown

pub mod shard;
pub mod registry;
pub mod lock;
pub mod subsystem;
pub mod listener;
pub mod creator;
pub mod closer;
pub mod stats;
pub mod memory;

pub use shard::{Shard, ShardState};
pub use registry::{RegistrySnapshot, ShardLookup, ShardRegistry};
pub use lock::{LockReleaser, NodeShardLocks, ShardLock, ShardLockManager};
pub use subsystem::{
    build_bundle, AuxiliaryServices, EngineDeps, ShardCaches, ShardContext, Subsystem,
    SubsystemBundle, SubsystemFactory, SubsystemHandle, SubsystemKind, SubsystemResult,
};
pub use listener::{IndexLifecycleListener, LifecycleListeners};
pub(crate) use creator::ShardCreator;
pub(crate) use closer::ShardCloser;
pub use stats::ShardMetrics;
pub use memory::{MemorySubsystem, MemorySubsystemFactory};
