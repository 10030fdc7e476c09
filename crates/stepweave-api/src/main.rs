//! stepweave CLI entry point.
//!
//! Parses CLI arguments, initializes tracing, the database and the engine,
//! then dispatches to the command handler.

mod cli;
mod state;

use anyhow::anyhow;
use clap::Parser;

use cli::{Cli, Commands, ListResource};
use state::AppState;
use stepweave_observe::tracing_setup::{init_tracing, shutdown_tracing, verbosity_directive};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(verbosity_directive(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow!("Failed to initialize tracing: {e}"))?;

    let result = dispatch(cli).await;
    shutdown_tracing();
    result
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;
    let quiet = cli.quiet;
    let state = AppState::init(cli.data_dir).await?;

    match cli.command {
        Commands::Register {
            file,
            name,
            description,
            disabled,
        } => cli::workflow::register(&state, &file, name, description, disabled, json).await,

        Commands::Validate {
            file,
            dry_run,
            input,
        } => cli::workflow::validate(&state, &file, dry_run, input.as_deref(), json).await,

        Commands::Enable { workflow_id } => {
            cli::workflow::set_enabled(&state, &workflow_id, true, json).await
        }

        Commands::Disable { workflow_id } => {
            cli::workflow::set_enabled(&state, &workflow_id, false, json).await
        }

        Commands::List { resource } => match resource {
            ListResource::Workflows => cli::workflow::list(&state, json).await,
            ListResource::Executions { workflow, limit } => {
                cli::execution::list(&state, workflow.as_deref(), limit, json).await
            }
        },

        Commands::Run {
            workflow_id,
            input,
            input_file,
        } => {
            cli::execution::run(
                &state,
                &workflow_id,
                input.as_deref(),
                input_file.as_ref(),
                json,
                quiet,
            )
            .await
        }

        Commands::Resume {
            execution_id,
            from_step,
        } => cli::execution::resume(&state, &execution_id, from_step.as_deref(), json, quiet).await,

        Commands::Recover {
            execution_id,
            from_step,
        } => cli::recovery::recover(&state, &execution_id, from_step.as_deref(), json, quiet).await,

        Commands::Scan => cli::recovery::scan(&state, json).await,

        Commands::Watch { interval } => cli::recovery::watch(&state, interval, quiet || json).await,

        Commands::Status {
            execution_id,
            decisions,
        } => cli::execution::status(&state, &execution_id, decisions, json).await,

        Commands::Cancel { execution_id } => cli::execution::cancel(&state, &execution_id, json).await,

        Commands::Stats {
            workflow_id,
            window,
        } => cli::workflow::stats(&state, &workflow_id, window, json).await,

        Commands::Memory { action } => cli::memory::run(&state, action, json).await,
    }
}
