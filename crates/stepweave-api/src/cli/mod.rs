//! CLI command definitions and dispatch for the `stepweave` binary.
//!
//! Uses clap derive macros for argument parsing. Workflow commands take a
//! workflow UUID, execution commands an execution UUID.

pub mod execution;
pub mod memory;
pub mod recovery;
pub mod workflow;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use comfy_table::{Cell, Color};
use serde_json::{Map, Value};
use stepweave_types::execution::{ExecutionStatus, StatsWindow};
use uuid::Uuid;

/// Run and recover agent workflows.
#[derive(Parser)]
#[command(name = "stepweave", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory holding stepweave.db and config.toml.
    #[arg(long, global = true, env = "STEPWEAVE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a workflow from a YAML or JSON definition file.
    Register {
        /// Path to the definition file.
        file: PathBuf,

        /// Workflow name (defaults to the file stem).
        #[arg(long)]
        name: Option<String>,

        /// Short description.
        #[arg(long)]
        description: Option<String>,

        /// Register the workflow disabled.
        #[arg(long)]
        disabled: bool,
    },

    /// Validate a definition file without registering it.
    Validate {
        /// Path to the definition file.
        file: PathBuf,

        /// Also run the definition in memory (calls real capabilities,
        /// persists nothing).
        #[arg(long)]
        dry_run: bool,

        /// JSON object used as input for --dry-run.
        #[arg(long)]
        input: Option<String>,
    },

    /// Enable a registered workflow.
    Enable {
        /// Workflow UUID.
        workflow_id: String,
    },

    /// Disable a registered workflow. Disabled workflows cannot be run.
    Disable {
        /// Workflow UUID.
        workflow_id: String,
    },

    /// List resources.
    #[command(alias = "ls")]
    List {
        #[command(subcommand)]
        resource: ListResource,
    },

    /// Execute a registered workflow.
    Run {
        /// Workflow UUID.
        workflow_id: String,

        /// Initial data context as a JSON object.
        #[arg(long, conflicts_with = "input_file")]
        input: Option<String>,

        /// Read the initial data context from a JSON file.
        #[arg(long)]
        input_file: Option<PathBuf>,
    },

    /// Continue an interrupted or failed execution from its checkpoint.
    Resume {
        /// Execution UUID.
        execution_id: String,

        /// Continue from this step instead of the checkpoint position.
        #[arg(long)]
        from_step: Option<String>,
    },

    /// Recover a failed execution (operator path).
    Recover {
        /// Execution UUID.
        execution_id: String,

        /// Re-run from this step.
        #[arg(long)]
        from_step: Option<String>,
    },

    /// Scan once for stale executions and resume them.
    Scan,

    /// Scan for stale executions periodically until Ctrl+C.
    Watch {
        /// Seconds between scans (defaults to recovery.scan_interval_secs).
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Show the status of an execution.
    Status {
        /// Execution UUID.
        execution_id: String,

        /// Also list tracked agent decisions.
        #[arg(long)]
        decisions: bool,
    },

    /// Cancel an execution that has not finished.
    Cancel {
        /// Execution UUID.
        execution_id: String,
    },

    /// Show execution counts and durations for a workflow.
    Stats {
        /// Workflow UUID.
        workflow_id: String,

        /// Look-back window: 1h, 24h or 7d.
        #[arg(long, default_value = "24h")]
        window: StatsWindow,
    },

    /// Manage workflow memory handed to agent steps.
    Memory {
        #[command(subcommand)]
        action: memory::MemoryCommand,
    },
}

#[derive(Subcommand)]
pub enum ListResource {
    /// List registered workflows.
    Workflows,

    /// List recent executions.
    Executions {
        /// Only executions of this workflow UUID.
        #[arg(long)]
        workflow: Option<String>,

        /// Maximum number of executions to display.
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Parse a UUID argument, naming what it was meant to identify on failure.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    raw.trim()
        .parse::<Uuid>()
        .with_context(|| format!("Invalid {what} ID: '{raw}'"))
}

/// Parse a JSON object argument. `None` yields an empty object.
pub fn parse_input(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("Invalid JSON input")? {
        Value::Object(map) => Ok(map),
        other => bail!("Input must be a JSON object, got: {other}"),
    }
}

/// Read a JSON object from `--input` or `--input-file`.
pub async fn read_input(inline: Option<&str>, file: Option<&PathBuf>) -> Result<Map<String, Value>> {
    match file {
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            parse_input(Some(&content))
        }
        None => parse_input(inline),
    }
}

/// Table cell for an execution status.
pub fn status_cell(status: ExecutionStatus) -> Cell {
    let color = match status {
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Cancelled => Color::DarkGrey,
        ExecutionStatus::Running => Color::Yellow,
        ExecutionStatus::Pending => Color::Blue,
    };
    Cell::new(status).fg(color)
}

/// First eight characters of an id, for compact tables.
pub fn short_id(id: &Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
