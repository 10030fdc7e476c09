//! Recovery commands: recover one execution, scan once, or watch.

use std::time::Duration;

use anyhow::{Result, anyhow};
use console::style;
use stepweave_core::workflow::RecoveryReport;
use tokio_util::sync::CancellationToken;

use super::execution::{ensure_success, print_outcome, with_progress};
use super::parse_id;
use crate::state::AppState;

pub async fn recover(
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
        state.recovery.recover_execution(execution_id, from_step),
    )
    .await
    .map_err(|e| anyhow!("Recovery failed: {e}"))?;

    print_outcome(&outcome, json)?;
    ensure_success(&outcome)
}

fn print_report(report: &RecoveryReport, json: bool) -> Result<()> {
    if json {
        let failed: Vec<_> = report
            .failed
            .iter()
            .map(|(id, err)| serde_json::json!({ "execution_id": id.to_string(), "error": err }))
            .collect();
        let out = serde_json::json!({
            "scanned": report.scanned,
            "recovered": report.recovered.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
            "failed": failed,
            "skipped": report.skipped.iter().map(|id| id.to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    if report.scanned == 0 {
        println!("  No stale executions found.");
        println!();
        return Ok(());
    }

    println!("  Scanned {} stale execution(s)", report.scanned);
    for id in &report.recovered {
        println!("  {} {id} recovered", style("✓").green());
    }
    for (id, err) in &report.failed {
        println!("  {} {id}: {}", style("✗").red(), style(err).red());
    }
    for id in &report.skipped {
        println!("  {} {id} already running", style("-").dim());
    }
    println!();
    Ok(())
}

pub async fn scan(state: &AppState, json: bool) -> Result<()> {
    let report = state
        .recovery
        .recover_stale()
        .await
        .map_err(|e| anyhow!("Stale execution scan failed: {e}"))?;
    print_report(&report, json)
}

/// Run periodic scans until Ctrl+C.
pub async fn watch(state: &AppState, interval: Option<u64>, quiet: bool) -> Result<()> {
    let secs = interval
        .filter(|s| *s > 0)
        .unwrap_or(state.config.recovery.scan_interval_secs);

    if !quiet {
        println!();
        println!(
            "  Watching {} for stale executions every {secs}s (Ctrl+C to stop)",
            style(state.data_dir.display()).cyan()
        );
        println!();
    }

    let cancel = CancellationToken::new();
    let handle = state
        .recovery
        .clone()
        .spawn_periodic_scan(Duration::from_secs(secs), cancel.clone());

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to listen for Ctrl+C: {e}"))?;

    cancel.cancel();
    handle
        .await
        .map_err(|e| anyhow!("Recovery scan task failed: {e}"))?;

    if !quiet {
        println!("  Stopped.");
    }
    Ok(())
}
