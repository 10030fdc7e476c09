//! Workflow commands: register, validate, list, enable, disable and stats.

use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::Utc;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use stepweave_core::repository::ExecutionRepository;
use stepweave_core::workflow::definition::{
    DefinitionError, ValidationReport, load_definition, validate_definition,
};
use stepweave_types::execution::{StatsWindow, WorkflowStats};
use stepweave_types::workflow::{Workflow, WorkflowDefinition};

use super::{parse_id, parse_input, short_id};
use crate::state::AppState;

fn load_and_validate(file: &Path) -> Result<(WorkflowDefinition, ValidationReport)> {
    let definition = load_definition(file).map_err(|e| match e {
        DefinitionError::Parse(msg) => anyhow!("Failed to parse {}: {msg}", file.display()),
        other => anyhow!("Failed to load {}: {other}", file.display()),
    })?;
    let report =
        validate_definition(&definition).map_err(|e| anyhow!("Workflow validation failed: {e}"))?;
    Ok((definition, report))
}

fn print_cycle_warnings(report: &ValidationReport) {
    for cycle in &report.conditional_cycles {
        println!(
            "  {} conditional cycle: {} (bounded by engine.max_steps)",
            style("!").yellow().bold(),
            cycle.join(" -> ")
        );
    }
}

// ---------------------------------------------------------------------------
// Register
// ---------------------------------------------------------------------------

pub async fn register(
    state: &AppState,
    file: &Path,
    name: Option<String>,
    description: Option<String>,
    disabled: bool,
    json: bool,
) -> Result<()> {
    let (definition, report) = load_and_validate(file)?;

    let name = name.unwrap_or_else(|| {
        file.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "workflow".to_string())
    });
    let mut workflow = Workflow::new(name, definition);
    workflow.description = description;
    workflow.enabled = !disabled;

    state
        .repo
        .save_workflow(&workflow)
        .await
        .map_err(|e| anyhow!("Failed to save workflow: {e}"))?;

    if json {
        let out = serde_json::json!({
            "id": workflow.id.to_string(),
            "name": workflow.name,
            "enabled": workflow.enabled,
            "steps": workflow.definition.steps.len(),
            "start_step": workflow.definition.start_step,
            "conditional_cycles": report.conditional_cycles,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Registered workflow '{}'",
        style("*").green().bold(),
        style(&workflow.name).cyan()
    );
    println!("  ID: {}", workflow.id);
    println!("  Steps: {}", workflow.definition.steps.len());
    println!("  Start: {}", workflow.definition.start_step);
    if disabled {
        println!("  Status: {}", style("disabled").dim());
    }
    print_cycle_warnings(&report);
    println!();
    println!(
        "  Run it with: {}",
        style(format!("stepweave run {}", workflow.id)).dim()
    );
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

pub async fn validate(
    state: &AppState,
    file: &Path,
    dry_run: bool,
    input: Option<&str>,
    json: bool,
) -> Result<()> {
    let (definition, report) = load_and_validate(file)?;

    let result = if dry_run {
        let input = parse_input(input)?;
        let data = state
            .engine
            .run_definition(&definition, input)
            .await
            .map_err(|e| anyhow!("Dry run failed: {e}"))?;
        Some(data)
    } else {
        None
    };

    if json {
        let out = serde_json::json!({
            "valid": true,
            "steps": definition.steps.len(),
            "conditional_cycles": report.conditional_cycles,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} is valid ({} steps)",
        style("✓").green().bold(),
        file.display(),
        definition.steps.len()
    );
    print_cycle_warnings(&report);
    if let Some(data) = result {
        println!();
        println!("  Dry run result:");
        println!("{}", serde_json::to_string_pretty(&data)?);
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

pub async fn list(state: &AppState, json: bool) -> Result<()> {
    let workflows = state
        .repo
        .list_workflows()
        .await
        .map_err(|e| anyhow!("Failed to list workflows: {e}"))?;

    if json {
        let out: Vec<_> = workflows
            .iter()
            .map(|w| {
                serde_json::json!({
                    "id": w.id.to_string(),
                    "name": w.name,
                    "description": w.description,
                    "enabled": w.enabled,
                    "steps": w.definition.steps.len(),
                    "created_at": w.created_at.to_rfc3339(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Register one with: {}",
            style("stepweave register <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name"),
            Cell::new("Steps"),
            Cell::new("Enabled"),
            Cell::new("Created"),
        ]);

    for w in &workflows {
        let enabled = if w.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        table.add_row(vec![
            Cell::new(short_id(&w.id)),
            Cell::new(&w.name),
            Cell::new(w.definition.steps.len()),
            enabled,
            Cell::new(w.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Enable / disable
// ---------------------------------------------------------------------------

pub async fn set_enabled(state: &AppState, raw_id: &str, enabled: bool, json: bool) -> Result<()> {
    let id = parse_id(raw_id, "workflow")?;
    let found = state
        .repo
        .set_workflow_enabled(&id, enabled)
        .await
        .map_err(|e| anyhow!("Failed to update workflow: {e}"))?;
    if !found {
        return Err(anyhow!("Workflow '{id}' not found"));
    }

    if json {
        let out = serde_json::json!({ "id": id.to_string(), "enabled": enabled });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let verb = if enabled { "Enabled" } else { "Disabled" };
        println!();
        println!("  {} {verb} workflow {id}", style("*").green().bold());
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

fn stats_json(workflow: &Workflow, window: StatsWindow, stats: &WorkflowStats) -> serde_json::Value {
    serde_json::json!({
        "workflow_id": workflow.id.to_string(),
        "workflow_name": workflow.name,
        "time_window": window.as_str(),
        "total_executions": stats.total,
        "successful_executions": stats.succeeded,
        "failed_executions": stats.failed,
        "success_rate": stats.success_rate(),
        "avg_execution_time_ms": stats.avg_execution_time_ms,
        "max_execution_time_ms": stats.max_execution_time_ms,
    })
}

pub async fn stats(state: &AppState, raw_id: &str, window: StatsWindow, json: bool) -> Result<()> {
    let id = parse_id(raw_id, "workflow")?;
    let workflow = state
        .repo
        .get_workflow(&id)
        .await
        .map_err(|e| anyhow!("Failed to load workflow: {e}"))?
        .ok_or_else(|| anyhow!("Workflow '{id}' not found"))?;

    let stats = state
        .repo
        .workflow_stats(&id, window.since(Utc::now()))
        .await
        .map_err(|e| anyhow!("Failed to compute workflow stats: {e}"))?;

    if json {
        let out = stats_json(&workflow, window, &stats);
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {} (last {window})",
        style("Workflow").bold(),
        style(&workflow.name).cyan()
    );

    if stats.total == 0 {
        println!("  No executions in this window.");
        println!();
        return Ok(());
    }

    let ms = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Total").fg(Color::Cyan),
            Cell::new("Succeeded"),
            Cell::new("Failed"),
            Cell::new("Success rate"),
            Cell::new("Avg ms"),
            Cell::new("Max ms"),
        ])
        .add_row(vec![
            Cell::new(stats.total),
            Cell::new(stats.succeeded).fg(Color::Green),
            Cell::new(stats.failed).fg(Color::Red),
            Cell::new(format!("{:.1}%", stats.success_rate() * 100.0)),
            Cell::new(ms(stats.avg_execution_time_ms.map(|v| format!("{v:.0}")))),
            Cell::new(ms(stats.max_execution_time_ms.map(|v| v.to_string()))),
        ]);

    println!("{table}");
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepweave_types::workflow::{ScriptType, StepKind, WorkflowStep};

    #[test]
    fn test_stats_json_fields() {
        let definition = WorkflowDefinition {
            start_step: "done".to_string(),
            steps: vec![WorkflowStep {
                id: "done".to_string(),
                name: "Done".to_string(),
                kind: StepKind::Script {
                    script: "return 1".to_string(),
                    script_type: ScriptType::Inline,
                },
                next_steps: vec![],
                condition: None,
                config: serde_json::Map::new(),
            }],
        };
        let workflow = Workflow::new("nightly", definition);
        let stats = WorkflowStats {
            total: 4,
            succeeded: 3,
            failed: 1,
            avg_execution_time_ms: Some(250.0),
            max_execution_time_ms: Some(400),
        };

        let out = stats_json(&workflow, StatsWindow::Week, &stats);
        assert_eq!(out["time_window"], "7d");
        assert_eq!(out["total_executions"], 4);
        assert_eq!(out["successful_executions"], 3);
        assert_eq!(out["failed_executions"], 1);
        assert_eq!(out["success_rate"], 0.75);
        assert_eq!(out["max_execution_time_ms"], 400);

        let empty = stats_json(&workflow, StatsWindow::default(), &WorkflowStats::default());
        assert_eq!(empty["time_window"], "24h");
        assert_eq!(empty["success_rate"], 0.0);
        assert!(empty["avg_execution_time_ms"].is_null());
    }
}
