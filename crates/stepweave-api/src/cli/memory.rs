//! Workflow memory commands.
//!
//! Memory entries are handed to every agent step of a workflow. Entries set
//! with `--execution` are visible only to that execution and override
//! workflow-wide entries with the same key.

use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::Value;

use stepweave_core::repository::ExecutionRepository;
use stepweave_types::execution::MemoryEntry;

use super::{parse_id, short_id};
use crate::state::AppState;

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Store a memory value.
    Set {
        /// Workflow UUID.
        workflow_id: String,

        /// Memory key.
        key: String,

        /// Value, parsed as JSON when possible and stored as a string otherwise.
        value: String,

        /// Scope the entry to one execution UUID.
        #[arg(long)]
        execution: Option<String>,
    },

    /// List memory visible to a workflow (and optionally one execution).
    List {
        /// Workflow UUID.
        workflow_id: String,

        /// Include entries scoped to this execution UUID.
        #[arg(long)]
        execution: Option<String>,
    },
}

pub async fn run(state: &AppState, action: MemoryCommand, json: bool) -> Result<()> {
    match action {
        MemoryCommand::Set {
            workflow_id,
            key,
            value,
            execution,
        } => set(state, &workflow_id, key, &value, execution.as_deref(), json).await,
        MemoryCommand::List {
            workflow_id,
            execution,
        } => list(state, &workflow_id, execution.as_deref(), json).await,
    }
}

/// JSON when it parses, a plain string otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

async fn set(
    state: &AppState,
    raw_workflow: &str,
    key: String,
    raw_value: &str,
    raw_execution: Option<&str>,
    json: bool,
) -> Result<()> {
    let workflow_id = parse_id(raw_workflow, "workflow")?;
    let execution_id = raw_execution
        .map(|raw| parse_id(raw, "execution"))
        .transpose()?;
    if key.trim().is_empty() {
        return Err(anyhow!("Memory key must not be empty"));
    }

    let entry = MemoryEntry {
        workflow_id,
        execution_id,
        key,
        value: parse_value(raw_value),
        created_at: Utc::now(),
    };
    state
        .repo
        .put_memory(&entry)
        .await
        .map_err(|e| anyhow!("Failed to store memory: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let scope = match execution_id {
            Some(id) => format!("execution {}", short_id(&id)),
            None => "workflow".to_string(),
        };
        println!();
        println!(
            "  {} Stored '{}' ({scope} scope)",
            style("*").green().bold(),
            style(&entry.key).cyan()
        );
        println!();
    }
    Ok(())
}

async fn list(
    state: &AppState,
    raw_workflow: &str,
    raw_execution: Option<&str>,
    json: bool,
) -> Result<()> {
    let workflow_id = parse_id(raw_workflow, "workflow")?;
    let execution_id = raw_execution
        .map(|raw| parse_id(raw, "execution"))
        .transpose()?;

    let entries = state
        .repo
        .list_memory(&workflow_id, execution_id.as_ref())
        .await
        .map_err(|e| anyhow!("Failed to list memory: {e}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!();
        println!("  No memory stored for workflow {workflow_id}.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Key").fg(Color::Cyan),
            Cell::new("Value"),
            Cell::new("Scope"),
            Cell::new("Stored"),
        ]);

    for e in &entries {
        let scope = match &e.execution_id {
            Some(id) => Cell::new(short_id(id)).fg(Color::Yellow),
            None => Cell::new("workflow").fg(Color::DarkGrey),
        };
        table.add_row(vec![
            Cell::new(&e.key),
            Cell::new(e.value.to_string()),
            scope,
            Cell::new(e.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_prefers_json() {
        assert_eq!(parse_value("42"), serde_json::json!(42));
        assert_eq!(parse_value(r#"{"tier": "gold"}"#)["tier"], "gold");
        assert_eq!(parse_value("plain words"), Value::String("plain words".into()));
    }
}
