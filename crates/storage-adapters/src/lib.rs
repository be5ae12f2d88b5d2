//! # storage-adapters
//!
//! Persistence implementations of the `domains` ports.

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "memory")]
pub mod snapshot;

#[cfg(feature = "memory")]
pub use memory::{MemoryStore, MemoryUnitOfWork};
#[cfg(feature = "memory")]
pub use snapshot::{Snapshot, SnapshotError};
