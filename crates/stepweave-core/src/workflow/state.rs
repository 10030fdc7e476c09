//! In-memory execution state and its checkpoint form.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::{Map, Value};
use stepweave_types::execution::{Checkpoint, ExecutionStatus, StepResultRecord, StepRunStatus};
use uuid::Uuid;

/// Per-run progress, owned by the engine's coordinating path.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionState {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    /// Step to run next. Empty once the run has reached its end.
    pub current_step: String,
    pub completed_steps: BTreeMap<String, bool>,
    pub step_results: BTreeMap<String, Value>,
    pub status: ExecutionStatus,
}

impl ExecutionState {
    /// Fresh state positioned at `start_step`.
    pub fn new(execution_id: Uuid, workflow_id: Uuid, start_step: &str) -> Self {
        Self {
            execution_id,
            workflow_id,
            current_step: start_step.to_string(),
            completed_steps: BTreeMap::new(),
            step_results: BTreeMap::new(),
            status: ExecutionStatus::Running,
        }
    }

    /// Rebuild state from a persisted checkpoint.
    pub fn from_checkpoint(execution_id: Uuid, workflow_id: Uuid, checkpoint: &Checkpoint) -> Self {
        Self {
            execution_id,
            workflow_id,
            current_step: checkpoint.current_step.clone(),
            completed_steps: checkpoint.completed_steps.clone(),
            step_results: checkpoint.step_results.clone(),
            status: ExecutionStatus::Running,
        }
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.completed_steps.get(step_id).copied().unwrap_or(false)
    }

    /// Record a result and mark the step completed in one move, so the
    /// checkpoint invariant (completed implies a stored result) always holds.
    pub fn complete(&mut self, step_id: &str, result: Value) {
        self.step_results.insert(step_id.to_string(), result);
        self.completed_steps.insert(step_id.to_string(), true);
    }

    /// Stored result of a completed step.
    pub fn result_of(&self, step_id: &str) -> Option<&Value> {
        if self.is_completed(step_id) {
            self.step_results.get(step_id)
        } else {
            None
        }
    }

    /// Overlay completed rows of the step-results table. Rows are applied in
    /// order, so the latest completion of a step wins.
    pub fn absorb_step_results(&mut self, rows: &[StepResultRecord]) {
        for row in rows {
            if row.status == StepRunStatus::Completed {
                let output = row.output.clone().unwrap_or(Value::Null);
                self.complete(&row.step_id, output);
            }
        }
    }

    /// Snapshot the state, optionally with the current data context.
    pub fn to_checkpoint(&self, data: Option<&Map<String, Value>>) -> Checkpoint {
        Checkpoint {
            current_step: self.current_step.clone(),
            completed_steps: self.completed_steps.clone(),
            step_results: self.step_results.clone(),
            checkpoint_time: Utc::now(),
            data: data.cloned(),
        }
    }

    /// Ids of all completed steps, sorted.
    pub fn completed_ids(&self) -> Vec<String> {
        self.completed_steps
            .iter()
            .filter(|(_, done)| **done)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
