//! Index-level coordination of shard lifecycles

pub mod component;
pub mod service;

pub use component::{IndexComponent, LookupSlot};
pub use service::{IndexService, IndexServiceBuilder};
