//! Workflow engine: the driving loop over a definition's step graph.
//!
//! The `WorkflowEngine` walks a definition one step at a time from
//! `start_step`, dispatching each step to the `StepRunner` (or, for parallel
//! groups, to the `ParallelExecutor`), merging results into the run's data
//! context and resolving the successor until the current step is empty or
//! the step ceiling trips.
//!
//! # Execution flow
//!
//! 1. Create an `ExecutionRecord` (or load an existing one for resume).
//! 2. Resolve the current step; skip it if it already completed.
//! 3. Run it, record its result, merge the result into the data context.
//! 4. Resolve the next step, append a step-result row and merge a checkpoint.
//! 5. On completion/failure/cancellation, update the record.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use stepweave_types::config::EngineConfig;
use stepweave_types::error::RepositoryError;
use stepweave_types::event::ExecutionEvent;
use stepweave_types::execution::{
    Checkpoint, ExecutionRecord, ExecutionStatus, RESULT_KEY, StepResultRecord, StepRunStatus,
};
use stepweave_types::workflow::{WorkflowDefinition, WorkflowStep};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::repository::execution::ExecutionRepository;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::condition::resolve_next_step;
use super::context::DataContext;
use super::definition::{DefinitionError, validate_definition};
use super::parallel::{MemberFailure, ParallelExecutor};
use super::state::ExecutionState;
use super::step_runner::{Capabilities, RunIds, StepError, StepRunner};

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// How a persisted run ended.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// Step this attempt started from.
    pub entry_step: String,
    /// Data context when the run stopped.
    pub data: Map<String, Value>,
    /// Every step completed so far, including ones from earlier attempts.
    pub completed_steps: Vec<String>,
    /// Steps executed by this attempt.
    pub steps_executed: u32,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Operator view of an execution.
#[derive(Debug, Clone)]
pub struct ExecutionStatusView {
    pub record: ExecutionRecord,
    /// Step the run would continue from, when a checkpoint exists.
    pub current_step: Option<String>,
    /// Completed steps from the checkpoint and the step-result table.
    pub completed_steps: Vec<String>,
    pub step_results: Vec<StepResultRecord>,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// A single run being driven.
struct Run<'a> {
    definition: &'a WorkflowDefinition,
    ids: RunIds,
    cancel: CancellationToken,
    /// Ephemeral runs write nothing to the repository.
    durable: bool,
}

/// A run's slot in the cancellation registry. Removed when dropped.
struct ActiveRun<'a> {
    tokens: &'a DashMap<Uuid, CancellationToken>,
    execution_id: Uuid,
    cancel: CancellationToken,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.tokens.remove(&self.execution_id);
    }
}

/// Step-at-a-time executor with durable checkpointing.
///
/// Generic over `R: ExecutionRepository` for storage flexibility.
pub struct WorkflowEngine<R: ExecutionRepository> {
    repo: Arc<R>,
    checkpoint: CheckpointManager<R>,
    runner: Arc<StepRunner>,
    parallel: ParallelExecutor,
    event_bus: EventBus,
    config: EngineConfig,
    /// Cancellation tokens keyed by execution id, present while a run is active.
    cancellation_tokens: DashMap<Uuid, CancellationToken>,
}

impl<R: ExecutionRepository> WorkflowEngine<R> {
    pub fn new(
        repo: Arc<R>,
        capabilities: Capabilities,
        event_bus: EventBus,
        config: EngineConfig,
    ) -> Self {
        let runner = Arc::new(StepRunner::new(capabilities));
        let parallel = ParallelExecutor::new(
            Arc::clone(&runner),
            Duration::from_secs(config.parallel_step_timeout_secs),
        );
        Self {
            checkpoint: CheckpointManager::new(Arc::clone(&repo)),
            repo,
            runner,
            parallel,
            event_bus,
            config,
            cancellation_tokens: DashMap::new(),
        }
    }

    pub fn repo(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Whether a run for `execution_id` is being driven by this engine.
    pub fn is_active(&self, execution_id: &Uuid) -> bool {
        self.cancellation_tokens.contains_key(execution_id)
    }

    /// Register `execution_id` as active, failing if it already is.
    fn claim(&self, execution_id: Uuid) -> Result<ActiveRun<'_>, EngineError> {
        let cancel = match self.cancellation_tokens.entry(execution_id) {
            Entry::Occupied(_) => {
                return Err(EngineError::InvalidState(format!(
                    "execution {execution_id} is already running"
                )));
            }
            Entry::Vacant(slot) => slot.insert(CancellationToken::new()).value().clone(),
        };
        Ok(ActiveRun {
            tokens: &self.cancellation_tokens,
            execution_id,
            cancel,
        })
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Run a stored workflow from its start step.
    ///
    /// Errors before the execution record exists (unknown or disabled
    /// workflow, invalid definition) are returned as `Err`. Once the record
    /// exists, a failed or cancelled run is reported through the outcome's
    /// status and error, and the record keeps its last checkpoint.
    pub async fn execute(
        &self,
        workflow_id: Uuid,
        input: Map<String, Value>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let workflow = self
            .repo
            .get_workflow(&workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        if !workflow.enabled {
            return Err(EngineError::WorkflowDisabled(workflow_id));
        }
        validate_definition(&workflow.definition)?;

        let record = ExecutionRecord::start(workflow_id, input.clone());
        let active = self.claim(record.id)?;
        self.repo.create_execution(&record).await?;

        tracing::info!(
            execution_id = %record.id,
            workflow_id = %workflow_id,
            workflow = %workflow.name,
            "starting workflow execution"
        );
        self.event_bus.publish(ExecutionEvent::ExecutionStarted {
            execution_id: record.id,
            workflow_id,
            start_step: workflow.definition.start_step.clone(),
            resumed: false,
        });

        let state = ExecutionState::new(record.id, workflow_id, &workflow.definition.start_step);
        self.run_to_end(active, &workflow.definition, state, DataContext::new(input))
            .await
    }

    /// Run a definition in memory without touching the repository.
    ///
    /// Returns the final data context; any failure is returned as `Err`.
    pub async fn run_definition(
        &self,
        definition: &WorkflowDefinition,
        input: Map<String, Value>,
    ) -> Result<Map<String, Value>, EngineError> {
        validate_definition(definition)?;

        let ids = RunIds {
            execution_id: Uuid::now_v7(),
            workflow_id: Uuid::nil(),
        };
        let mut state = ExecutionState::new(ids.execution_id, ids.workflow_id, &definition.start_step);
        let mut data = DataContext::new(input);
        let run = Run {
            definition,
            ids,
            cancel: CancellationToken::new(),
            durable: false,
        };

        let steps = self.drive(&run, &mut state, &mut data).await?;
        tracing::debug!(steps, "in-memory run finished");
        Ok(data.into_map())
    }

    /// Continue a persisted execution to the end.
    ///
    /// State is rebuilt from the embedded checkpoint overlaid with the
    /// completed rows of the step-result table. When `from_step` is given
    /// the run continues there, and that step runs again even if it had
    /// completed. Without a checkpoint or `from_step`, the run restarts at
    /// `start_step` and skips whatever the step-result table shows as done.
    pub async fn resume(
        &self,
        execution_id: Uuid,
        from_step: Option<&str>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let active = self.claim(execution_id)?;
        let (record, checkpoint) = self.load(execution_id).await?;
        if record.status == ExecutionStatus::Completed {
            return Err(EngineError::InvalidState(format!(
                "execution {execution_id} already completed"
            )));
        }

        let workflow = self
            .repo
            .get_workflow(&record.workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(record.workflow_id))?;
        let definition = &workflow.definition;
        validate_definition(definition)?;

        let mut state = match &checkpoint {
            Some(cp) => ExecutionState::from_checkpoint(execution_id, record.workflow_id, cp),
            None => ExecutionState::new(execution_id, record.workflow_id, &definition.start_step),
        };
        let rows = self.checkpoint.step_results(execution_id).await?;
        state.absorb_step_results(&rows);

        if let Some(from) = from_step {
            if definition.step(from).is_none() {
                return Err(DefinitionError::StepNotFound(from.to_string()).into());
            }
            state.completed_steps.remove(from);
            state.step_results.remove(from);
            state.current_step = from.to_string();
        }

        let data = rebuild_data(definition, &record, checkpoint.as_ref(), &state);

        self.checkpoint
            .mark_status(execution_id, ExecutionStatus::Running, None)
            .await?;

        tracing::info!(
            execution_id = %execution_id,
            workflow_id = %record.workflow_id,
            from_step = %state.current_step,
            skipping = state.completed_ids().len(),
            "resuming workflow execution"
        );
        self.event_bus.publish(ExecutionEvent::ExecutionStarted {
            execution_id,
            workflow_id: record.workflow_id,
            start_step: state.current_step.clone(),
            resumed: true,
        });

        self.run_to_end(active, definition, state, data).await
    }

    /// Cancel an execution.
    ///
    /// An active run is signalled and ends `cancelled` once its in-flight
    /// step is abandoned. A non-terminal record with no active run (for
    /// example one left behind by a crash) is marked `cancelled` directly.
    pub async fn cancel(&self, execution_id: Uuid) -> Result<(), EngineError> {
        let token = self
            .cancellation_tokens
            .get(&execution_id)
            .map(|entry| entry.value().clone());
        if let Some(token) = token {
            token.cancel();
            tracing::info!(execution_id = %execution_id, "execution cancellation requested");
            return Ok(());
        }

        let (record, _) = self.load(execution_id).await?;
        if record.status.is_terminal() {
            return Err(EngineError::InvalidState(format!(
                "execution is already {}",
                record.status
            )));
        }
        self.checkpoint
            .mark_status(execution_id, ExecutionStatus::Cancelled, Some("execution cancelled"))
            .await?;
        tracing::info!(execution_id = %execution_id, "inactive execution cancelled");
        Ok(())
    }

    /// Status, error, resume point and step rows of an execution.
    pub async fn execution_status(
        &self,
        execution_id: Uuid,
    ) -> Result<ExecutionStatusView, EngineError> {
        let (record, checkpoint) = self.load(execution_id).await?;
        let step_results = self.checkpoint.step_results(execution_id).await?;

        let mut completed: BTreeSet<String> = BTreeSet::new();
        if let Some(cp) = &checkpoint {
            completed.extend(
                cp.completed_steps
                    .iter()
                    .filter(|(_, done)| **done)
                    .map(|(id, _)| id.clone()),
            );
        }
        completed.extend(
            step_results
                .iter()
                .filter(|row| row.status == StepRunStatus::Completed)
                .map(|row| row.step_id.clone()),
        );

        Ok(ExecutionStatusView {
            current_step: checkpoint
                .map(|cp| cp.current_step)
                .filter(|step| !step.is_empty()),
            completed_steps: completed.into_iter().collect(),
            step_results,
            record,
        })
    }

    // -----------------------------------------------------------------------
    // Driving loop
    // -----------------------------------------------------------------------

    async fn run_to_end(
        &self,
        active: ActiveRun<'_>,
        definition: &WorkflowDefinition,
        mut state: ExecutionState,
        mut data: DataContext,
    ) -> Result<ExecutionOutcome, EngineError> {
        let entry_step = state.current_step.clone();
        let run = Run {
            definition,
            ids: RunIds {
                execution_id: state.execution_id,
                workflow_id: state.workflow_id,
            },
            cancel: active.cancel.clone(),
            durable: true,
        };
        let started = Instant::now();
        let result = self.drive(&run, &mut state, &mut data).await;

        drop(active);
        Ok(self.finalize(state, data, result, entry_step, started).await)
    }

    /// The loop itself. Returns the number of steps executed.
    async fn drive(
        &self,
        run: &Run<'_>,
        state: &mut ExecutionState,
        data: &mut DataContext,
    ) -> Result<u32, EngineError> {
        let max_steps = self.config.max_steps;
        let mut iterations = 0u32;
        let mut executed = 0u32;

        while !state.current_step.is_empty() {
            if iterations >= max_steps {
                return Err(EngineError::Guard { max_steps });
            }
            iterations += 1;

            if run.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let step = run
                .definition
                .step(&state.current_step)
                .ok_or_else(|| DefinitionError::StepNotFound(state.current_step.clone()))?;

            if state.is_completed(&step.id) {
                tracing::debug!(
                    execution_id = %run.ids.execution_id,
                    step_id = %step.id,
                    "skipping completed step"
                );
                state.current_step = next_step(step, data)?;
                continue;
            }

            let result = self.dispatch(run, step, state, data).await?;
            state.complete(&step.id, result.clone());
            data.merge_result(&step.id, &result);
            executed += 1;
            state.current_step = next_step(step, data)?;

            if run.durable {
                self.checkpoint
                    .record_step_completed(run.ids.execution_id, &step.id, &result)
                    .await?;
                self.checkpoint
                    .save_checkpoint(run.ids.execution_id, &state.to_checkpoint(Some(data.as_map())))
                    .await?;
            }
        }

        Ok(executed)
    }

    async fn dispatch(
        &self,
        run: &Run<'_>,
        step: &WorkflowStep,
        state: &mut ExecutionState,
        data: &DataContext,
    ) -> Result<Value, EngineError> {
        tracing::debug!(
            execution_id = %run.ids.execution_id,
            step_id = %step.id,
            kind = step.kind.label(),
            "dispatching step"
        );
        self.event_bus.publish(ExecutionEvent::StepStarted {
            execution_id: run.ids.execution_id,
            step_id: step.id.clone(),
            kind: step.kind.label().to_string(),
        });

        match step.parallel_members() {
            Some(members) if !members.is_empty() => {
                self.run_parallel(run, step, members, state, data).await
            }
            _ => self.run_single(run, step, data).await,
        }
    }

    async fn run_single(
        &self,
        run: &Run<'_>,
        step: &WorkflowStep,
        data: &DataContext,
    ) -> Result<Value, EngineError> {
        let started = Instant::now();
        let outcome = tokio::select! {
            _ = run.cancel.cancelled() => Err(StepError::Cancelled),
            res = self.runner.run(step, data, run.ids) => res,
        };

        match outcome {
            Ok(value) => {
                self.event_bus.publish(ExecutionEvent::StepCompleted {
                    execution_id: run.ids.execution_id,
                    step_id: step.id.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                Ok(value)
            }
            Err(StepError::Cancelled) => Err(EngineError::Cancelled),
            Err(source) => {
                let message = source.to_string();
                self.step_failed(run, &step.id, &message).await;
                Err(EngineError::StepExecution {
                    step_id: step.id.clone(),
                    source,
                })
            }
        }
    }

    async fn run_parallel(
        &self,
        run: &Run<'_>,
        step: &WorkflowStep,
        members: &[String],
        state: &mut ExecutionState,
        data: &DataContext,
    ) -> Result<Value, EngineError> {
        let started = Instant::now();
        let outcome = self
            .parallel
            .run_group(
                members,
                run.definition,
                data.snapshot(),
                state,
                run.ids,
                &run.cancel,
            )
            .await;

        for report in &outcome.reports {
            if report.replayed {
                continue;
            }
            match &report.outcome {
                Ok(value) => {
                    self.event_bus.publish(ExecutionEvent::StepCompleted {
                        execution_id: run.ids.execution_id,
                        step_id: report.step_id.clone(),
                        duration_ms: report.duration_ms,
                    });
                    if run.durable {
                        self.checkpoint
                            .record_step_completed(run.ids.execution_id, &report.step_id, value)
                            .await?;
                    }
                }
                Err(e) => {
                    if !matches!(e, StepError::Cancelled) {
                        self.step_failed(run, &report.step_id, &e.to_string()).await;
                    }
                }
            }
        }

        self.event_bus.publish(ExecutionEvent::ParallelGroupJoined {
            execution_id: run.ids.execution_id,
            step_id: step.id.clone(),
            succeeded: outcome.succeeded(),
            failed: outcome.failures.len(),
        });
        tracing::debug!(
            execution_id = %run.ids.execution_id,
            step_id = %step.id,
            succeeded = outcome.succeeded(),
            failed = outcome.failures.len(),
            "parallel group joined"
        );

        if outcome.is_success() {
            self.event_bus.publish(ExecutionEvent::StepCompleted {
                execution_id: run.ids.execution_id,
                step_id: step.id.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            });
            return Ok(Value::Object(outcome.results));
        }

        // Keep the members that did succeed so a resume only reruns the rest.
        if run.durable {
            let checkpoint = state.to_checkpoint(Some(data.as_map()));
            if let Err(e) = self
                .checkpoint
                .save_checkpoint(run.ids.execution_id, &checkpoint)
                .await
            {
                tracing::warn!(
                    execution_id = %run.ids.execution_id,
                    error = %e,
                    "failed to checkpoint partial parallel group"
                );
            }
        }

        if run.cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let err = EngineError::ParallelGroup {
            step_id: step.id.clone(),
            failures: outcome.failures,
        };
        self.step_failed(run, &step.id, &err.to_string()).await;
        Err(err)
    }

    /// Publish and (for durable runs) log a failed step. Best effort.
    async fn step_failed(&self, run: &Run<'_>, step_id: &str, message: &str) {
        self.event_bus.publish(ExecutionEvent::StepFailed {
            execution_id: run.ids.execution_id,
            step_id: step_id.to_string(),
            error: message.to_string(),
        });
        if run.durable {
            if let Err(e) = self
                .checkpoint
                .record_step_failed(run.ids.execution_id, step_id, message)
                .await
            {
                tracing::warn!(
                    execution_id = %run.ids.execution_id,
                    step_id,
                    error = %e,
                    "failed to record step failure"
                );
            }
        }
    }

    async fn finalize(
        &self,
        mut state: ExecutionState,
        data: DataContext,
        result: Result<u32, EngineError>,
        entry_step: String,
        started: Instant,
    ) -> ExecutionOutcome {
        let execution_id = state.execution_id;
        let duration_ms = started.elapsed().as_millis() as u64;

        // A run whose completion cannot be persisted is reported as failed.
        let result = match result {
            Ok(steps_executed) => self
                .persist_completion(execution_id, &data, duration_ms)
                .await
                .map(|()| steps_executed)
                .map_err(EngineError::from),
            Err(e) => Err(e),
        };

        let (steps_executed, error) = match result {
            Ok(steps_executed) => {
                state.status = ExecutionStatus::Completed;

                tracing::info!(
                    execution_id = %execution_id,
                    steps = steps_executed,
                    duration_ms,
                    "workflow execution completed"
                );
                self.event_bus.publish(ExecutionEvent::ExecutionCompleted {
                    execution_id,
                    steps_executed,
                    duration_ms,
                });
                (steps_executed, None)
            }
            Err(e) => {
                state.status = if matches!(e, EngineError::Cancelled) {
                    ExecutionStatus::Cancelled
                } else {
                    ExecutionStatus::Failed
                };
                let message = e.to_string();
                if let Err(write_err) = self
                    .checkpoint
                    .mark_finished(execution_id, state.status, Some(&message), duration_ms)
                    .await
                {
                    tracing::error!(
                        execution_id = %execution_id,
                        error = %write_err,
                        "failed to persist terminal status"
                    );
                }

                tracing::warn!(
                    execution_id = %execution_id,
                    status = %state.status,
                    error = %message,
                    "workflow execution did not complete"
                );
                self.event_bus.publish(ExecutionEvent::ExecutionFailed {
                    execution_id,
                    error: message.clone(),
                });
                (0, Some(message))
            }
        };

        ExecutionOutcome {
            execution_id,
            workflow_id: state.workflow_id,
            status: state.status,
            entry_step,
            completed_steps: state.completed_ids(),
            data: data.into_map(),
            steps_executed,
            error,
        }
    }

    async fn persist_completion(
        &self,
        execution_id: Uuid,
        data: &DataContext,
        duration_ms: u64,
    ) -> Result<(), CheckpointError> {
        let mut patch = Map::new();
        patch.insert(RESULT_KEY.to_string(), Value::Object(data.as_map().clone()));
        self.checkpoint.merge_output(execution_id, patch).await?;
        self.checkpoint
            .mark_finished(execution_id, ExecutionStatus::Completed, None, duration_ms)
            .await
    }

    async fn load(
        &self,
        execution_id: Uuid,
    ) -> Result<(ExecutionRecord, Option<Checkpoint>), EngineError> {
        self.checkpoint.load(execution_id).await.map_err(|e| match e {
            CheckpointError::ExecutionNotFound(id) => EngineError::ExecutionNotFound(id),
            other => EngineError::Checkpoint(other),
        })
    }
}

fn next_step(step: &WorkflowStep, data: &DataContext) -> Result<String, EngineError> {
    resolve_next_step(step, data.as_map()).map_err(|source| {
        EngineError::Definition(DefinitionError::MalformedCondition {
            step: step.id.clone(),
            source,
        })
    })
}

/// Data context for a resumed run: the checkpoint's snapshot when it has
/// one, otherwise the input. Results the snapshot does not already cover
/// are merged on top in definition order.
fn rebuild_data(
    definition: &WorkflowDefinition,
    record: &ExecutionRecord,
    checkpoint: Option<&Checkpoint>,
    state: &ExecutionState,
) -> DataContext {
    let snapshot = checkpoint.and_then(|cp| cp.data.as_ref().map(|data| (cp, data)));
    let mut data = match snapshot {
        Some((_, data)) => DataContext::new(data.clone()),
        None => DataContext::new(record.input.clone()),
    };

    for step in &definition.steps {
        let covered = snapshot
            .is_some_and(|(cp, _)| cp.completed_steps.get(&step.id).copied().unwrap_or(false));
        if covered {
            continue;
        }
        if let Some(result) = state.result_of(&step.id) {
            data.merge_result(&step.id, result);
        }
    }
    data
}

// ---------------------------------------------------------------------------
// EngineError
// ---------------------------------------------------------------------------

/// Errors that can occur during workflow execution.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    /// A delegate call failed. Not retried at this layer.
    #[error("step '{step_id}' failed: {source}")]
    StepExecution {
        step_id: String,
        #[source]
        source: StepError,
    },

    /// One or more members of a parallel group failed.
    #[error(
        "parallel execution had {} errors: {}",
        .failures.len(),
        join_failures(.failures)
    )]
    ParallelGroup {
        step_id: String,
        failures: Vec<MemberFailure>,
    },

    /// The runaway-loop ceiling was reached.
    #[error("workflow exceeded maximum step count ({max_steps})")]
    Guard { max_steps: u32 },

    #[error("execution cancelled")]
    Cancelled,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("workflow is disabled: {0}")]
    WorkflowDisabled(Uuid),

    #[error("execution not found: {0}")]
    ExecutionNotFound(Uuid),

    #[error("{0}")]
    InvalidState(String),
}

fn join_failures(failures: &[MemberFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
