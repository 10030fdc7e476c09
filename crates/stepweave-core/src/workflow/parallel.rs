//! Fan-out/fan-in execution of parallel step groups.
//!
//! Each member runs in its own task against the same immutable data snapshot
//! and reports back over an mpsc channel sized to the group. The coordinator
//! waits for every member (strict barrier) before it writes anything into the
//! execution state, so only one path ever mutates it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use stepweave_types::workflow::WorkflowDefinition;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::context::DataContext;
use super::state::ExecutionState;
use super::step_runner::{RunIds, StepError, StepRunner};

/// What one member reported.
#[derive(Debug, Clone)]
pub struct MemberReport {
    pub step_id: String,
    pub outcome: Result<Value, StepError>,
    pub duration_ms: u64,
    /// The member had completed before and its stored result was reused.
    pub replayed: bool,
}

/// A member that did not succeed.
#[derive(Debug, Clone)]
pub struct MemberFailure {
    pub step_id: String,
    pub error: StepError,
}

impl std::fmt::Display for MemberFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "step {} failed: {}", self.step_id, self.error)
    }
}

/// Result of a barrier join.
#[derive(Debug, Clone, Default)]
pub struct GroupOutcome {
    /// Member id to result. Failed members map to `null`.
    pub results: Map<String, Value>,
    /// Reports in arrival order.
    pub reports: Vec<MemberReport>,
    pub failures: Vec<MemberFailure>,
}

impl GroupOutcome {
    pub fn succeeded(&self) -> usize {
        self.reports.len() - self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs the members of a parallel group concurrently.
pub struct ParallelExecutor {
    runner: Arc<StepRunner>,
    member_timeout: Duration,
}

impl ParallelExecutor {
    pub fn new(runner: Arc<StepRunner>, member_timeout: Duration) -> Self {
        Self {
            runner,
            member_timeout,
        }
    }

    /// Run every member and join on all of them.
    ///
    /// Members already completed in `state` replay their stored result.
    /// After the join, every member that succeeded is marked completed in
    /// `state`; failed members are left untouched so a resume retries them.
    pub async fn run_group(
        &self,
        members: &[String],
        definition: &WorkflowDefinition,
        snapshot: Arc<DataContext>,
        state: &mut ExecutionState,
        ids: RunIds,
        cancel: &CancellationToken,
    ) -> GroupOutcome {
        let (tx, mut rx) = mpsc::channel::<MemberReport>(members.len().max(1));
        let mut tasks = JoinSet::new();

        for member_id in members {
            if let Some(stored) = state.result_of(member_id) {
                tracing::debug!(
                    execution_id = %ids.execution_id,
                    step_id = %member_id,
                    "replaying completed parallel member"
                );
                let report = MemberReport {
                    step_id: member_id.clone(),
                    outcome: Ok(stored.clone()),
                    duration_ms: 0,
                    replayed: true,
                };
                // Capacity equals the member count, so this never waits.
                let _ = tx.send(report).await;
                continue;
            }

            let Some(step) = definition.step(member_id).cloned() else {
                let report = MemberReport {
                    step_id: member_id.clone(),
                    outcome: Err(StepError::NotFound(member_id.clone())),
                    duration_ms: 0,
                    replayed: false,
                };
                let _ = tx.send(report).await;
                continue;
            };

            let runner = Arc::clone(&self.runner);
            let snapshot = Arc::clone(&snapshot);
            let tx = tx.clone();
            let cancel = cancel.child_token();
            let member_timeout = self.member_timeout;

            tasks.spawn(async move {
                let started = Instant::now();
                let outcome = tokio::select! {
                    _ = cancel.cancelled() => Err(StepError::Cancelled),
                    res = tokio::time::timeout(member_timeout, runner.run(&step, &snapshot, ids)) => {
                        res.unwrap_or(Err(StepError::Timeout { secs: member_timeout.as_secs() }))
                    }
                };
                let report = MemberReport {
                    step_id: step.id.clone(),
                    outcome,
                    duration_ms: started.elapsed().as_millis() as u64,
                    replayed: false,
                };
                let _ = tx.send(report).await;
            });
        }
        drop(tx);

        let mut outcome = GroupOutcome::default();
        while outcome.reports.len() < members.len() {
            let Some(report) = rx.recv().await else {
                break;
            };
            match &report.outcome {
                Ok(value) => {
                    outcome.results.insert(report.step_id.clone(), value.clone());
                    state.complete(&report.step_id, value.clone());
                }
                Err(error) => {
                    outcome.results.insert(report.step_id.clone(), Value::Null);
                    outcome.failures.push(MemberFailure {
                        step_id: report.step_id.clone(),
                        error: error.clone(),
                    });
                }
            }
            outcome.reports.push(report);
        }

        // A member task that panicked never reported.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(execution_id = %ids.execution_id, error = %e, "parallel member task aborted");
            }
        }
        for member_id in members {
            if !outcome.reports.iter().any(|r| &r.step_id == member_id) {
                let error = StepError::Unsupported("member task aborted before reporting".to_string());
                outcome.results.insert(member_id.clone(), Value::Null);
                outcome.failures.push(MemberFailure {
                    step_id: member_id.clone(),
                    error: error.clone(),
                });
                outcome.reports.push(MemberReport {
                    step_id: member_id.clone(),
                    outcome: Err(error),
                    duration_ms: 0,
                    replayed: false,
                });
            }
        }

        outcome
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
