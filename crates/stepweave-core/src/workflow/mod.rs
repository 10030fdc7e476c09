//! Workflow engine core: definitions, evaluation, execution and recovery.
//!
//! - `definition` -- YAML/JSON parsing, validation, file loading
//! - `dag` -- successor graph and static cycle analysis
//! - `expression` -- single-comparison condition evaluator
//! - `context` -- data context, `{{key}}` interpolation, result merging
//! - `condition` -- next-step resolution for if/switch conditions
//! - `state` -- in-memory execution state and its checkpoint form
//! - `step_runner` -- per-kind step dispatch and the capability traits
//! - `parallel` -- fan-out/fan-in for parallel groups
//! - `checkpoint` -- durable checkpoint writes
//! - `engine` -- the driving loop
//! - `recovery` -- stale scan and operator recovery

pub mod checkpoint;
pub mod condition;
pub mod context;
pub mod dag;
pub mod definition;
pub mod engine;
pub mod expression;
pub mod parallel;
pub mod recovery;
pub mod state;
pub mod step_runner;

pub use engine::{EngineError, ExecutionOutcome, ExecutionStatusView, WorkflowEngine};
pub use recovery::{RecoveryError, RecoveryReport, RecoveryService};
pub use step_runner::{
    AgentExecutor, Capabilities, DecisionLog, MemoryProvider, ScriptExecutor, ScriptRequest,
    StepError,
};
