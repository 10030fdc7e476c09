//! Execution commands: run, resume, cancel, status, list.

use std::path::PathBuf;

use anyhow::{Result, anyhow};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use stepweave_core::repository::ExecutionRepository;
use stepweave_core::workflow::ExecutionOutcome;
use stepweave_types::event::ExecutionEvent;
use stepweave_types::execution::{ExecutionStatus, StepRunStatus};

use super::{parse_id, read_input, short_id, status_cell};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Print step events as they arrive. Aborted by the caller once the run ends.
pub fn spawn_progress_printer(mut rx: broadcast::Receiver<ExecutionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    println!("  {} {n} progress events dropped", style("!").yellow());
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::ExecutionStarted {
            start_step, resumed, ..
        } => {
            let verb = if *resumed { "Resuming" } else { "Starting" };
            println!("  {verb} at {}", style(start_step).cyan());
        }
        ExecutionEvent::StepCompleted {
            step_id,
            duration_ms,
            ..
        } => {
            println!(
                "  {} {step_id} {}",
                style("✓").green(),
                style(format!("({duration_ms}ms)")).dim()
            );
        }
        ExecutionEvent::StepFailed { step_id, error, .. } => {
            println!("  {} {step_id}: {}", style("✗").red(), style(error).red());
        }
        ExecutionEvent::ParallelGroupJoined {
            step_id,
            succeeded,
            failed,
            ..
        } => {
            println!(
                "  {} {step_id} joined: {succeeded} ok, {failed} failed",
                style("⇉").cyan()
            );
        }
        _ => {}
    }
}

pub(crate) fn print_outcome(outcome: &ExecutionOutcome, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "execution_id": outcome.execution_id.to_string(),
            "workflow_id": outcome.workflow_id.to_string(),
            "status": outcome.status.as_str(),
            "entry_step": outcome.entry_step,
            "steps_executed": outcome.steps_executed,
            "completed_steps": outcome.completed_steps,
            "error": outcome.error,
            "result": outcome.data,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    match outcome.status {
        ExecutionStatus::Completed => println!(
            "  {} Execution {} completed ({} steps)",
            style("*").green().bold(),
            outcome.execution_id,
            outcome.steps_executed
        ),
        status => {
            println!(
                "  {} Execution {} {status}",
                style("*").red().bold(),
                outcome.execution_id
            );
            if let Some(err) = &outcome.error {
                println!("  Error: {}", style(err).red());
            }
            println!(
                "  Resume with: {}",
                style(format!("stepweave resume {}", outcome.execution_id)).dim()
            );
        }
    }
    println!();
    if outcome.is_success() {
        println!("{}", serde_json::to_string_pretty(&outcome.data)?);
        println!();
    }
    Ok(())
}

/// Drive `fut` with live progress unless output is JSON or quiet.
pub(crate) async fn with_progress<F>(state: &AppState, show: bool, fut: F) -> F::Output
where
    F: std::future::Future,
{
    let printer = show.then(|| spawn_progress_printer(state.engine.event_bus().subscribe()));
    let output = fut.await;
    if let Some(handle) = printer {
        // Let already-published events drain before stopping the printer.
        tokio::task::yield_now().await;
        handle.abort();
    }
    output
}

/// Exit non-zero when the run did not complete.
pub(crate) fn ensure_success(outcome: &ExecutionOutcome) -> Result<()> {
    if outcome.is_success() {
        Ok(())
    } else {
        Err(anyhow!(
            "execution {} ended {}",
            outcome.execution_id,
            outcome.status
        ))
    }
}

// ---------------------------------------------------------------------------
// Run / resume
// ---------------------------------------------------------------------------

pub async fn run(
    state: &AppState,
    raw_id: &str,
    input: Option<&str>,
    input_file: Option<&PathBuf>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let workflow_id = parse_id(raw_id, "workflow")?;
    let input = read_input(input, input_file).await?;

    let outcome = with_progress(
        state,
        !json && !quiet,
        state.engine.execute(workflow_id, input),
    )
    .await
    .map_err(|e| anyhow!("Failed to start execution: {e}"))?;

    print_outcome(&outcome, json)?;
    ensure_success(&outcome)
}

pub async fn resume(
    state: &AppState,
    raw_id: &str,
    from_step: Option<&str>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let execution_id = parse_id(raw_id, "execution")?;

    let outcome = with_progress(
        state,
        !json && !quiet,
        state.engine.resume(execution_id, from_step),
    )
    .await
    .map_err(|e| anyhow!("Failed to resume execution: {e}"))?;

    print_outcome(&outcome, json)?;
    ensure_success(&outcome)
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

pub async fn cancel(state: &AppState, raw_id: &str, json: bool) -> Result<()> {
    let execution_id = parse_id(raw_id, "execution")?;
    state
        .engine
        .cancel(execution_id)
        .await
        .map_err(|e| anyhow!("Failed to cancel execution: {e}"))?;

    if json {
        let out = serde_json::json!({
            "execution_id": execution_id.to_string(),
            "status": ExecutionStatus::Cancelled.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!();
        println!("  {} Cancelled execution {execution_id}", style("*").green().bold());
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn status(state: &AppState, raw_id: &str, decisions: bool, json: bool) -> Result<()> {
    let execution_id = parse_id(raw_id, "execution")?;
    let view = state
        .engine
        .execution_status(execution_id)
        .await
        .map_err(|e| anyhow!("Failed to load execution: {e}"))?;

    let decision_rows = if decisions {
        state
            .repo
            .list_decisions(&execution_id)
            .await
            .map_err(|e| anyhow!("Failed to list decisions: {e}"))?
    } else {
        Vec::new()
    };

    let record = &view.record;
    if json {
        let steps: Vec<_> = view
            .step_results
            .iter()
            .map(|r| {
                serde_json::json!({
                    "step_id": r.step_id,
                    "status": r.status.as_str(),
                    "output": r.output,
                    "error": r.error,
                    "recorded_at": r.recorded_at.to_rfc3339(),
                })
            })
            .collect();
        let mut out = serde_json::json!({
            "execution_id": record.id.to_string(),
            "workflow_id": record.workflow_id.to_string(),
            "status": record.status.as_str(),
            "error": record.error,
            "current_step": view.current_step,
            "completed_steps": view.completed_steps,
            "started_at": record.started_at.to_rfc3339(),
            "completed_at": record.completed_at.map(|t| t.to_rfc3339()),
            "steps": steps,
        });
        if decisions {
            out["decisions"] = serde_json::to_value(&decision_rows)?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("  Execution: {}", style(record.id).cyan());
    println!("  Workflow: {}", record.workflow_id);
    println!("  Status: {}", record.status);
    println!("  Started: {}", record.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = record.completed_at {
        println!("  Finished: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(step) = view.current_step.as_deref().filter(|s| !s.is_empty()) {
        println!("  Next step: {step}");
    }
    if let Some(err) = &record.error {
        println!("  Error: {}", style(err).red());
    }
    if record.output.get("recovered").and_then(|v| v.as_bool()) == Some(true) {
        println!("  Recovered: yes");
    }
    println!("  Completed steps: {}", view.completed_steps.join(", "));

    if !view.step_results.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("Step").fg(Color::Cyan),
                Cell::new("Status"),
                Cell::new("Recorded"),
                Cell::new("Error"),
            ]);
        for r in &view.step_results {
            let status = match r.status {
                StepRunStatus::Completed => Cell::new("completed").fg(Color::Green),
                StepRunStatus::Failed => Cell::new("failed").fg(Color::Red),
            };
            table.add_row(vec![
                Cell::new(&r.step_id),
                status,
                Cell::new(r.recorded_at.format("%H:%M:%S").to_string()),
                Cell::new(r.error.as_deref().unwrap_or("-")),
            ]);
        }
        println!();
        println!("{table}");
    }

    if decisions {
        println!();
        if decision_rows.is_empty() {
            println!("  No decisions recorded.");
        }
        for d in &decision_rows {
            println!(
                "  {} {} -> {}",
                d.created_at.format("%H:%M:%S"),
                style(&d.decision_point).cyan(),
                d.decision_value
            );
        }
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn list(state: &AppState, workflow: Option<&str>, limit: u32, json: bool) -> Result<()> {
    let workflow_id = workflow.map(|raw| parse_id(raw, "workflow")).transpose()?;
    let records = state
        .repo
        .list_executions(workflow_id.as_ref(), limit)
        .await
        .map_err(|e| anyhow!("Failed to list executions: {e}"))?;

    if json {
        let out: Vec<_> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "execution_id": r.id.to_string(),
                    "workflow_id": r.workflow_id.to_string(),
                    "status": r.status.as_str(),
                    "started_at": r.started_at.to_rfc3339(),
                    "completed_at": r.completed_at.map(|t| t.to_rfc3339()),
                    "error": r.error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if records.is_empty() {
        println!();
        println!("  No executions yet.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Workflow"),
            Cell::new("Status"),
            Cell::new("Started"),
            Cell::new("Finished"),
        ]);

    for r in &records {
        let finished = r
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(short_id(&r.id)),
            Cell::new(short_id(&r.workflow_id)),
            status_cell(r.status),
            Cell::new(r.started_at.format("%Y-%m-%d %H:%M").to_string()),
            Cell::new(finished),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}
