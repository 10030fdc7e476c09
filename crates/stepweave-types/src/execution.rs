//! Execution tracking types for stepweave.
//!
//! `ExecutionRecord` is the durable row for one run of a workflow. Progress is
//! captured two ways: a `Checkpoint` merged into the record's output after each
//! step, and an append-only stream of `StepResultRecord`s.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Output key under which the latest checkpoint is stored.
pub const CHECKPOINT_KEY: &str = "checkpoint";

/// Output key under which the final data context is stored.
pub const RESULT_KEY: &str = "result";

// ---------------------------------------------------------------------------
// Execution status
// ---------------------------------------------------------------------------

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the execution has stopped for good (until an operator resumes it).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cancelled" => Ok(ExecutionStatus::Cancelled),
            other => Err(format!("invalid execution status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution record
// ---------------------------------------------------------------------------

/// Persisted record of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// UUIDv7 execution id.
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// Initial data context.
    pub input: serde_json::Map<String, serde_json::Value>,
    /// Holds `checkpoint`, `result` and recovery markers.
    pub output: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall time of the attempt that reached the terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
}

impl ExecutionRecord {
    /// A new `running` record for `workflow_id`.
    pub fn start(workflow_id: Uuid, input: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            id: Uuid::now_v7(),
            workflow_id,
            status: ExecutionStatus::Running,
            input,
            output: serde_json::Map::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            execution_time_ms: None,
        }
    }

    /// Decode the embedded checkpoint, if one was written and is well-formed.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.output
            .get(CHECKPOINT_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Durable snapshot of execution progress.
///
/// Every id in `completed_steps` has an entry in `step_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Step to run next. Empty when the run had reached its end.
    pub current_step: String,
    #[serde(default)]
    pub completed_steps: BTreeMap<String, bool>,
    #[serde(default)]
    pub step_results: BTreeMap<String, serde_json::Value>,
    pub checkpoint_time: DateTime<Utc>,
    /// Data context at checkpoint time. Older checkpoints may lack it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Map<String, serde_json::Value>>,
}

// ---------------------------------------------------------------------------
// Append-only logs
// ---------------------------------------------------------------------------

/// Outcome of a single step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepRunStatus {
    Completed,
    Failed,
}

impl StepRunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepRunStatus::Completed => "completed",
            StepRunStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for StepRunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(StepRunStatus::Completed),
            "failed" => Ok(StepRunStatus::Failed),
            other => Err(format!("invalid step status: '{other}'")),
        }
    }
}

/// One row of the step-results table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResultRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: String,
    pub status: StepRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl StepResultRecord {
    pub fn completed(execution_id: Uuid, step_id: &str, output: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            step_id: step_id.to_string(),
            status: StepRunStatus::Completed,
            output: Some(output),
            error: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(execution_id: Uuid, step_id: &str, error: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            execution_id,
            step_id: step_id.to_string(),
            status: StepRunStatus::Failed,
            output: None,
            error: Some(error.into()),
            recorded_at: Utc::now(),
        }
    }
}

/// A decision taken by an agent step with `track_decision` enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub id: Uuid,
    pub execution_id: Uuid,
    /// Step id at which the decision was taken.
    pub decision_point: String,
    /// Display rendering of the agent result.
    pub decision_value: String,
    /// Full agent result.
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A key/value entry of workflow memory handed to agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub workflow_id: Uuid,
    /// `None` for workflow-wide memory shared by all executions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Monitoring
// ---------------------------------------------------------------------------

/// Look-back window for workflow statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatsWindow {
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl StatsWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            StatsWindow::Hour => "1h",
            StatsWindow::Day => "24h",
            StatsWindow::Week => "7d",
        }
    }

    pub fn duration(self) -> chrono::Duration {
        match self {
            StatsWindow::Hour => chrono::Duration::hours(1),
            StatsWindow::Day => chrono::Duration::hours(24),
            StatsWindow::Week => chrono::Duration::days(7),
        }
    }

    /// Start of the window ending at `now`.
    pub fn since(self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl std::fmt::Display for StatsWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatsWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" | "1hour" => Ok(StatsWindow::Hour),
            "24h" | "1day" => Ok(StatsWindow::Day),
            "7d" | "1week" => Ok(StatsWindow::Week),
            other => Err(format!("invalid time window: '{other}' (expected 1h, 24h or 7d)")),
        }
    }
}

/// Aggregate outcome of a workflow's executions started since a cutoff.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Executions without a recorded duration are left out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_execution_time_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time_ms: Option<u64>,
}

impl WorkflowStats {
    /// Completed share of all executions in the window, 0.0 when empty.
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_terminality() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_from_str_roundtrip() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<ExecutionStatus>().unwrap(), status);
        }
        assert!("paused".parse::<ExecutionStatus>().is_err());
    }

    #[test]
    fn test_record_checkpoint_decodes_embedded_value() {
        let mut record = ExecutionRecord::start(Uuid::now_v7(), serde_json::Map::new());
        assert!(record.checkpoint().is_none());

        record.output.insert(
            CHECKPOINT_KEY.to_string(),
            json!({
                "current_step": "s2",
                "completed_steps": {"s1": true},
                "step_results": {"s1": {"rows": 3}},
                "checkpoint_time": "2026-01-01T00:00:00Z"
            }),
        );
        let cp = record.checkpoint().unwrap();
        assert_eq!(cp.current_step, "s2");
        assert_eq!(cp.completed_steps.get("s1"), Some(&true));
        assert_eq!(cp.step_results["s1"], json!({"rows": 3}));
        assert!(cp.data.is_none());
    }

    #[test]
    fn test_malformed_checkpoint_is_ignored() {
        let mut record = ExecutionRecord::start(Uuid::now_v7(), serde_json::Map::new());
        record
            .output
            .insert(CHECKPOINT_KEY.to_string(), json!("not a checkpoint"));
        assert!(record.checkpoint().is_none());
    }

    #[test]
    fn test_step_result_constructors() {
        let exec = Uuid::now_v7();
        let ok = StepResultRecord::completed(exec, "s1", json!(1));
        assert_eq!(ok.status, StepRunStatus::Completed);
        assert!(ok.error.is_none());

        let bad = StepResultRecord::failed(exec, "s2", "boom");
        assert_eq!(bad.status, StepRunStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("boom"));
        assert!(bad.output.is_none());
    }

    #[test]
    fn test_stats_window_parsing() {
        assert_eq!("1h".parse::<StatsWindow>().unwrap(), StatsWindow::Hour);
        assert_eq!("1day".parse::<StatsWindow>().unwrap(), StatsWindow::Day);
        assert_eq!("7d".parse::<StatsWindow>().unwrap(), StatsWindow::Week);
        assert!("30d".parse::<StatsWindow>().is_err());
        assert_eq!(StatsWindow::default(), StatsWindow::Day);

        let now = Utc::now();
        assert_eq!(now - StatsWindow::Week.since(now), chrono::Duration::days(7));
    }

    #[test]
    fn test_success_rate() {
        assert_eq!(WorkflowStats::default().success_rate(), 0.0);
        let stats = WorkflowStats {
            total: 4,
            succeeded: 3,
            failed: 1,
            ..Default::default()
        };
        assert!((stats.success_rate() - 0.75).abs() < f64::EPSILON);
    }
}
