//! Crash recovery for executions left behind by a stopped process.
//!
//! Both the scheduled stale scan and the operator-triggered recover go
//! through [`WorkflowEngine::resume`], so they rebuild state the same way and
//! run the remaining steps to the end. Recovery bookkeeping writes (the
//! `recovered` marker, the failure status after a failed recovery) are best
//! effort: failures are logged, never escalated.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value, json};
use stepweave_types::config::RecoveryConfig;
use stepweave_types::error::RepositoryError;
use stepweave_types::event::ExecutionEvent;
use stepweave_types::execution::ExecutionStatus;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::execution::ExecutionRepository;

use super::engine::{EngineError, ExecutionOutcome, WorkflowEngine};

/// Output key set on executions completed by recovery.
pub const RECOVERED_KEY: &str = "recovered";
/// Output key holding when recovery completed the execution.
pub const RECOVERED_AT_KEY: &str = "recovered_at";

// ---------------------------------------------------------------------------
// RecoveryReport
// ---------------------------------------------------------------------------

/// What one stale scan did.
#[derive(Debug, Clone, Default)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub recovered: Vec<Uuid>,
    /// Executions whose recovery failed, with the recorded error.
    pub failed: Vec<(Uuid, String)>,
    /// Stale records already being driven by this engine.
    pub skipped: Vec<Uuid>,
}

// ---------------------------------------------------------------------------
// RecoveryService
// ---------------------------------------------------------------------------

pub struct RecoveryService<R: ExecutionRepository> {
    engine: Arc<WorkflowEngine<R>>,
    config: RecoveryConfig,
}

impl<R: ExecutionRepository + 'static> RecoveryService<R> {
    pub fn new(engine: Arc<WorkflowEngine<R>>, config: RecoveryConfig) -> Self {
        Self { engine, config }
    }

    /// Resume every `running`/`pending` execution older than the staleness
    /// threshold from its last checkpoint.
    ///
    /// A record that fails to recover is marked failed with
    /// `Recovery failed: <error>` and the scan moves on.
    pub async fn recover_stale(&self) -> Result<RecoveryReport, RecoveryError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.stale_after_secs as i64);
        let stale = self.engine.repo().list_stale_executions(cutoff).await?;

        let mut report = RecoveryReport {
            scanned: stale.len(),
            ..RecoveryReport::default()
        };

        for record in stale {
            if self.engine.is_active(&record.id) {
                report.skipped.push(record.id);
                continue;
            }

            tracing::info!(
                execution_id = %record.id,
                workflow_id = %record.workflow_id,
                status = %record.status,
                started_at = %record.started_at,
                "recovering stale execution"
            );

            let error = match self.engine.resume(record.id, None).await {
                Ok(outcome) if outcome.is_success() => {
                    self.mark_recovered(&outcome).await;
                    report.recovered.push(record.id);
                    continue;
                }
                Ok(outcome) => outcome
                    .error
                    .unwrap_or_else(|| format!("execution ended {}", outcome.status)),
                Err(e) => e.to_string(),
            };

            let message = format!("Recovery failed: {error}");
            if let Err(e) = self
                .engine
                .repo()
                .update_execution_status(&record.id, ExecutionStatus::Failed, Some(&message), None)
                .await
            {
                tracing::warn!(
                    execution_id = %record.id,
                    error = %e,
                    "failed to mark execution as failed after recovery"
                );
            }
            tracing::error!(execution_id = %record.id, error = %error, "recovery failed");
            report.failed.push((record.id, message));
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                recovered = report.recovered.len(),
                failed = report.failed.len(),
                skipped = report.skipped.len(),
                "stale execution scan finished"
            );
        }
        Ok(report)
    }

    /// Operator-triggered recovery of a failed execution, optionally from a
    /// specific step.
    pub async fn recover_execution(
        &self,
        execution_id: Uuid,
        from_step: Option<&str>,
    ) -> Result<ExecutionOutcome, RecoveryError> {
        let record = self
            .engine
            .repo()
            .get_execution(&execution_id)
            .await?
            .ok_or(RecoveryError::ExecutionNotFound(execution_id))?;
        if record.status != ExecutionStatus::Failed {
            return Err(RecoveryError::NotFailed {
                execution_id,
                status: record.status,
            });
        }

        tracing::info!(
            execution_id = %execution_id,
            from_step = from_step.unwrap_or("<checkpoint>"),
            "recovering failed execution"
        );

        let outcome = self.engine.resume(execution_id, from_step).await?;
        if outcome.is_success() {
            self.mark_recovered(&outcome).await;
        }
        Ok(outcome)
    }

    /// Run [`Self::recover_stale`] every `interval` until `cancel` fires.
    pub fn spawn_periodic_scan(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(interval_secs = interval.as_secs(), "periodic recovery scan started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = self.recover_stale().await {
                            tracing::warn!(error = %e, "stale execution scan failed");
                        }
                    }
                }
            }

            tracing::info!("periodic recovery scan stopped");
        })
    }

    async fn mark_recovered(&self, outcome: &ExecutionOutcome) {
        let mut patch = Map::new();
        patch.insert(RECOVERED_KEY.to_string(), Value::Bool(true));
        patch.insert(RECOVERED_AT_KEY.to_string(), json!(Utc::now()));
        if let Err(e) = self
            .engine
            .repo()
            .merge_execution_output(&outcome.execution_id, &patch)
            .await
        {
            tracing::warn!(
                execution_id = %outcome.execution_id,
                error = %e,
                "failed to mark execution as recovered"
            );
        }

        self.engine
            .event_bus()
            .publish(ExecutionEvent::ExecutionRecovered {
                execution_id: outcome.execution_id,
                from_step: outcome.entry_step.clone(),
            });
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("execution is not in failed state (execution {execution_id} is {status})")]
    NotFailed {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
