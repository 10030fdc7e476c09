//! Workflow orchestration engine and repository trait definitions for stepweave.
//!
//! This crate defines the "ports" (repository and capability traits) that the
//! infrastructure layer implements. It depends only on `stepweave-types` --
//! never on `stepweave-infra` or any database/IO crate.

pub mod event;
pub mod repository;
pub mod workflow;
