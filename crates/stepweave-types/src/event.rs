//! Event types for the stepweave execution event bus.
//!
//! `ExecutionEvent` is broadcast by the engine as a run progresses.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events emitted during workflow execution and recovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// An execution has started (or resumed).
    ExecutionStarted {
        execution_id: Uuid,
        workflow_id: Uuid,
        start_step: String,
        resumed: bool,
    },

    /// A step has been dispatched.
    StepStarted {
        execution_id: Uuid,
        step_id: String,
        kind: String,
    },

    /// A step completed successfully.
    StepCompleted {
        execution_id: Uuid,
        step_id: String,
        duration_ms: u64,
    },

    /// A step failed.
    StepFailed {
        execution_id: Uuid,
        step_id: String,
        error: String,
    },

    /// A parallel group finished its barrier join.
    ParallelGroupJoined {
        execution_id: Uuid,
        step_id: String,
        succeeded: usize,
        failed: usize,
    },

    /// An execution completed successfully.
    ExecutionCompleted {
        execution_id: Uuid,
        steps_executed: u32,
        duration_ms: u64,
    },

    /// An execution failed.
    ExecutionFailed { execution_id: Uuid, error: String },

    /// A stale or failed execution was resumed to completion by recovery.
    ExecutionRecovered {
        execution_id: Uuid,
        from_step: String,
    },
}

impl ExecutionEvent {
    /// The execution every variant belongs to.
    pub fn execution_id(&self) -> Uuid {
        match self {
            ExecutionEvent::ExecutionStarted { execution_id, .. }
            | ExecutionEvent::StepStarted { execution_id, .. }
            | ExecutionEvent::StepCompleted { execution_id, .. }
            | ExecutionEvent::StepFailed { execution_id, .. }
            | ExecutionEvent::ParallelGroupJoined { execution_id, .. }
            | ExecutionEvent::ExecutionCompleted { execution_id, .. }
            | ExecutionEvent::ExecutionFailed { execution_id, .. }
            | ExecutionEvent::ExecutionRecovered { execution_id, .. } => *execution_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_failed_serde_roundtrip() {
        let event = ExecutionEvent::StepFailed {
            execution_id: Uuid::now_v7(),
            step_id: "profile".to_string(),
            error: "timeout".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"step_failed\""));
        let parsed: ExecutionEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ExecutionEvent::StepFailed { .. }));
    }

    #[test]
    fn test_execution_id_accessor() {
        let id = Uuid::now_v7();
        let event = ExecutionEvent::ParallelGroupJoined {
            execution_id: id,
            step_id: "fan".to_string(),
            succeeded: 2,
            failed: 1,
        };
        assert_eq!(event.execution_id(), id);
    }
}
