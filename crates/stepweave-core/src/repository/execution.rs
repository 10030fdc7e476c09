//! Execution repository trait definition.
//!
//! Defines the storage interface for stored workflows, execution records,
//! the append-only step-result and decision logs, and workflow memory. The
//! infrastructure layer (stepweave-infra) implements this trait with SQLite
//! persistence.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use stepweave_types::error::RepositoryError;
use stepweave_types::execution::{
    DecisionRecord, ExecutionRecord, ExecutionStatus, MemoryEntry, StepResultRecord,
    WorkflowStats,
};
use stepweave_types::workflow::Workflow;
use uuid::Uuid;

/// Repository trait for workflow execution persistence.
///
/// Record updates are single-row upserts; the engine assumes at most one
/// active writer per execution id and performs no locking of its own.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ExecutionRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Workflows
    // -----------------------------------------------------------------------

    /// Upsert a stored workflow (insert or replace by ID).
    fn save_workflow(
        &self,
        workflow: &Workflow,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a stored workflow by its UUID.
    fn get_workflow(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Workflow>, RepositoryError>> + Send;

    /// List stored workflows, newest first.
    fn list_workflows(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<Workflow>, RepositoryError>> + Send;

    /// Enable or disable a workflow. Returns `true` if it existed.
    fn set_workflow_enabled(
        &self,
        id: &Uuid,
        enabled: bool,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Executions
    // -----------------------------------------------------------------------

    /// Create a new execution record.
    fn create_execution(
        &self,
        record: &ExecutionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an execution record by its UUID.
    fn get_execution(
        &self,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ExecutionRecord>, RepositoryError>> + Send;

    /// List executions, optionally for one workflow, newest first.
    fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionRecord>, RepositoryError>> + Send;

    /// Set the status, error message and execution time. Terminal statuses
    /// stamp `completed_at`; non-terminal statuses clear it.
    fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        execution_time_ms: Option<u64>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Shallow-merge `patch` into the record's output object. Keys not in
    /// `patch` are kept.
    fn merge_execution_output(
        &self,
        id: &Uuid,
        patch: &Map<String, Value>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Counts and execution-time aggregates over the executions of
    /// `workflow_id` started after `since`.
    fn workflow_stats(
        &self,
        workflow_id: &Uuid,
        since: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<WorkflowStats, RepositoryError>> + Send;

    /// Executions still `running` or `pending` that started before `cutoff`.
    fn list_stale_executions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<Vec<ExecutionRecord>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Append-only logs
    // -----------------------------------------------------------------------

    /// Append a step result row.
    fn append_step_result(
        &self,
        result: &StepResultRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All step result rows for an execution, oldest first.
    fn list_step_results(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepResultRecord>, RepositoryError>> + Send;

    /// Append a decision row.
    fn append_decision(
        &self,
        decision: &DecisionRecord,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All decision rows for an execution, oldest first.
    fn list_decisions(
        &self,
        execution_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<DecisionRecord>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Memory
    // -----------------------------------------------------------------------

    /// Store a memory entry, replacing any entry with the same scope and key.
    fn put_memory(
        &self,
        entry: &MemoryEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Workflow-wide entries plus, when `execution_id` is given, entries
    /// scoped to that execution. Oldest first.
    fn list_memory(
        &self,
        workflow_id: &Uuid,
        execution_id: Option<&Uuid>,
    ) -> impl std::future::Future<Output = Result<Vec<MemoryEntry>, RepositoryError>> + Send;
}

/// Fold memory entries into the map handed to agents. Execution-scoped
/// entries win over workflow-wide ones with the same key.
pub fn memory_context(entries: &[MemoryEntry]) -> Map<String, Value> {
    let mut context = Map::new();
    for entry in entries.iter().filter(|e| e.execution_id.is_none()) {
        context.insert(entry.key.clone(), entry.value.clone());
    }
    for entry in entries.iter().filter(|e| e.execution_id.is_some()) {
        context.insert(entry.key.clone(), entry.value.clone());
    }
    context
}
