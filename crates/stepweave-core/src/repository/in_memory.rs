//! In-memory `ExecutionRepository` used by engine and recovery tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use stepweave_types::error::RepositoryError;
use stepweave_types::execution::{
    DecisionRecord, ExecutionRecord, ExecutionStatus, MemoryEntry, StepResultRecord,
    WorkflowStats,
};
use stepweave_types::workflow::Workflow;
use uuid::Uuid;

use super::execution::{ExecutionRepository, memory_context};
use crate::workflow::step_runner::{DecisionLog, MemoryProvider, StepError};

#[derive(Default)]
pub struct InMemoryRepository {
    workflows: Mutex<HashMap<Uuid, Workflow>>,
    executions: Mutex<HashMap<Uuid, ExecutionRecord>>,
    step_results: Mutex<Vec<StepResultRecord>>,
    decisions: Mutex<Vec<DecisionRecord>>,
    memory: Mutex<Vec<MemoryEntry>>,
    /// When set, output merges fail with a query error.
    pub fail_output_merges: AtomicBool,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execution(&self, id: Uuid) -> ExecutionRecord {
        self.executions.lock().unwrap()[&id].clone()
    }

    pub fn steps(&self, id: Uuid) -> Vec<StepResultRecord> {
        self.step_results
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.execution_id == id)
            .cloned()
            .collect()
    }

    pub fn decision_count(&self) -> usize {
        self.decisions.lock().unwrap().len()
    }
}

impl ExecutionRepository for InMemoryRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.workflows
            .lock()
            .unwrap()
            .insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflows.lock().unwrap().get(id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let mut all: Vec<Workflow> = self.workflows.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn set_workflow_enabled(&self, id: &Uuid, enabled: bool) -> Result<bool, RepositoryError> {
        match self.workflows.lock().unwrap().get_mut(id) {
            Some(wf) => {
                wf.enabled = enabled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn create_execution(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        self.executions
            .lock()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<ExecutionRecord>, RepositoryError> {
        Ok(self.executions.lock().unwrap().get(id).cloned())
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let mut all: Vec<ExecutionRecord> = self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|r| workflow_id.is_none_or(|w| &r.workflow_id == w))
            .cloned()
            .collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all.truncate(limit as usize);
        Ok(all)
    }

    async fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        execution_time_ms: Option<u64>,
    ) -> Result<(), RepositoryError> {
        let mut executions = self.executions.lock().unwrap();
        let record = executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.status = status;
        record.error = error.map(str::to_string);
        record.completed_at = status.is_terminal().then(Utc::now);
        record.execution_time_ms = execution_time_ms;
        Ok(())
    }

    async fn workflow_stats(
        &self,
        workflow_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<WorkflowStats, RepositoryError> {
        let executions = self.executions.lock().unwrap();
        let in_window: Vec<&ExecutionRecord> = executions
            .values()
            .filter(|r| &r.workflow_id == workflow_id && r.started_at > since)
            .collect();

        let times: Vec<u64> = in_window.iter().filter_map(|r| r.execution_time_ms).collect();
        Ok(WorkflowStats {
            total: in_window.len() as u64,
            succeeded: in_window
                .iter()
                .filter(|r| r.status == ExecutionStatus::Completed)
                .count() as u64,
            failed: in_window
                .iter()
                .filter(|r| r.status == ExecutionStatus::Failed)
                .count() as u64,
            avg_execution_time_ms: (!times.is_empty())
                .then(|| times.iter().sum::<u64>() as f64 / times.len() as f64),
            max_execution_time_ms: times.iter().copied().max(),
        })
    }

    async fn merge_execution_output(
        &self,
        id: &Uuid,
        patch: &Map<String, Value>,
    ) -> Result<(), RepositoryError> {
        if self.fail_output_merges.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        let mut executions = self.executions.lock().unwrap();
        let record = executions.get_mut(id).ok_or(RepositoryError::NotFound)?;
        for (k, v) in patch {
            record.output.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn list_stale_executions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let mut stale: Vec<ExecutionRecord> = self
            .executions
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                matches!(r.status, ExecutionStatus::Running | ExecutionStatus::Pending)
                    && r.started_at < cutoff
            })
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(stale)
    }

    async fn append_step_result(&self, result: &StepResultRecord) -> Result<(), RepositoryError> {
        self.step_results.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn list_step_results(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<StepResultRecord>, RepositoryError> {
        Ok(self.steps(*execution_id))
    }

    async fn append_decision(&self, decision: &DecisionRecord) -> Result<(), RepositoryError> {
        self.decisions.lock().unwrap().push(decision.clone());
        Ok(())
    }

    async fn list_decisions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<DecisionRecord>, RepositoryError> {
        Ok(self
            .decisions
            .lock()
            .unwrap()
            .iter()
            .filter(|d| &d.execution_id == execution_id)
            .cloned()
            .collect())
    }

    async fn put_memory(&self, entry: &MemoryEntry) -> Result<(), RepositoryError> {
        let mut memory = self.memory.lock().unwrap();
        memory.retain(|m| {
            !(m.workflow_id == entry.workflow_id
                && m.execution_id == entry.execution_id
                && m.key == entry.key)
        });
        memory.push(entry.clone());
        Ok(())
    }

    async fn list_memory(
        &self,
        workflow_id: &Uuid,
        execution_id: Option<&Uuid>,
    ) -> Result<Vec<MemoryEntry>, RepositoryError> {
        Ok(self
            .memory
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                &m.workflow_id == workflow_id
                    && (m.execution_id.is_none() || m.execution_id.as_ref() == execution_id)
            })
            .cloned()
            .collect())
    }
}

impl MemoryProvider for InMemoryRepository {
    fn get(
        &self,
        workflow_id: Uuid,
        execution_id: Uuid,
    ) -> BoxFuture<'_, Result<Map<String, Value>, StepError>> {
        Box::pin(async move {
            let entries = self
                .list_memory(&workflow_id, Some(&execution_id))
                .await
                .map_err(|e| StepError::Agent(e.to_string()))?;
            Ok(memory_context(&entries))
        })
    }
}

impl DecisionLog for InMemoryRepository {
    fn record(&self, decision: DecisionRecord) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move { self.append_decision(&decision).await })
    }
}
