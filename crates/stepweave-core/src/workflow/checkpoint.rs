//! Durable checkpoint manager for execution state.
//!
//! Wraps `ExecutionRepository` with the writes the engine makes as a run
//! progresses: a checkpoint merged into the record's output after every
//! completed step, append-only step result rows, and status transitions.

use std::sync::Arc;

use serde_json::{Map, Value};
use stepweave_types::execution::{
    CHECKPOINT_KEY, Checkpoint, ExecutionRecord, ExecutionStatus, StepResultRecord,
};
use uuid::Uuid;

use crate::repository::execution::ExecutionRepository;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints.
///
/// Generic over `R: ExecutionRepository` so it works with any storage backend
/// (SQLite, in-memory mock, etc.).
pub struct CheckpointManager<R: ExecutionRepository> {
    repo: Arc<R>,
}

impl<R: ExecutionRepository> CheckpointManager<R> {
    pub fn new(repo: Arc<R>) -> Self {
        Self { repo }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    /// Merge `checkpoint` into the record's output under `checkpoint`.
    /// Other output keys survive.
    pub async fn save_checkpoint(
        &self,
        execution_id: Uuid,
        checkpoint: &Checkpoint,
    ) -> Result<(), CheckpointError> {
        let encoded = serde_json::to_value(checkpoint)
            .map_err(|e| CheckpointError::Encode(e.to_string()))?;
        let mut patch = Map::new();
        patch.insert(CHECKPOINT_KEY.to_string(), encoded);
        self.merge_output(execution_id, patch).await?;

        tracing::debug!(
            execution_id = %execution_id,
            current_step = %checkpoint.current_step,
            completed = checkpoint.completed_steps.len(),
            "checkpoint saved"
        );
        Ok(())
    }

    /// The record together with its decoded checkpoint, if any.
    pub async fn load(
        &self,
        execution_id: Uuid,
    ) -> Result<(ExecutionRecord, Option<Checkpoint>), CheckpointError> {
        let record = self
            .repo
            .get_execution(&execution_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?
            .ok_or(CheckpointError::ExecutionNotFound(execution_id))?;
        let checkpoint = record.checkpoint();
        if checkpoint.is_none() && record.output.contains_key(CHECKPOINT_KEY) {
            tracing::warn!(execution_id = %execution_id, "ignoring undecodable checkpoint");
        }
        Ok((record, checkpoint))
    }

    /// Shallow-merge arbitrary keys into the record's output.
    pub async fn merge_output(
        &self,
        execution_id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .merge_execution_output(&execution_id, &patch)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Step results
    // -----------------------------------------------------------------------

    pub async fn record_step_completed(
        &self,
        execution_id: Uuid,
        step_id: &str,
        output: &Value,
    ) -> Result<(), CheckpointError> {
        let row = StepResultRecord::completed(execution_id, step_id, output.clone());
        self.repo
            .append_step_result(&row)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    pub async fn record_step_failed(
        &self,
        execution_id: Uuid,
        step_id: &str,
        error: &str,
    ) -> Result<(), CheckpointError> {
        let row = StepResultRecord::failed(execution_id, step_id, error);
        self.repo
            .append_step_result(&row)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Every step result row for the execution, oldest first.
    pub async fn step_results(
        &self,
        execution_id: Uuid,
    ) -> Result<Vec<StepResultRecord>, CheckpointError> {
        self.repo
            .list_step_results(&execution_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub async fn mark_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        self.write_status(execution_id, status, error, None).await
    }

    /// Terminal status of a run, with how long the run took.
    pub async fn mark_finished(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        duration_ms: u64,
    ) -> Result<(), CheckpointError> {
        self.write_status(execution_id, status, error, Some(duration_ms))
            .await
    }

    async fn write_status(
        &self,
        execution_id: Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        duration_ms: Option<u64>,
    ) -> Result<(), CheckpointError> {
        self.repo
            .update_execution_status(&execution_id, status, error, duration_ms)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(execution_id = %execution_id, status = %status, "execution status updated");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    /// The checkpoint could not be serialized.
    #[error("checkpoint encode error: {0}")]
    Encode(String),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
