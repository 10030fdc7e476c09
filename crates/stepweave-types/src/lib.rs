//! Shared domain types for stepweave.
//!
//! Workflow definitions, execution records, checkpoints, events and
//! configuration used across the engine, storage adapters and CLI.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod event;
pub mod execution;
pub mod workflow;
