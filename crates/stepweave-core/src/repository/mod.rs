//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (stepweave-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod execution;

#[cfg(test)]
pub(crate) mod in_memory;

pub use execution::{ExecutionRepository, memory_context};
