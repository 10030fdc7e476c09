//! Application state wiring the engine to its SQLite and HTTP adapters.
//!
//! The engine and recovery service are generic over the repository; AppState
//! pins them to `SqliteExecutionRepository`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use stepweave_core::event::EventBus;
use stepweave_core::workflow::{RecoveryService, WorkflowEngine};
use stepweave_infra::capabilities::build_capabilities;
use stepweave_infra::config::{load_config, resolve_data_dir};
use stepweave_infra::sqlite::execution::SqliteExecutionRepository;
use stepweave_infra::sqlite::pool::{DatabasePool, database_url};
use stepweave_types::config::StepweaveConfig;

pub type ConcreteEngine = WorkflowEngine<SqliteExecutionRepository>;
pub type ConcreteRecovery = RecoveryService<SqliteExecutionRepository>;

/// Shared state for all CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
    pub config: StepweaveConfig,
    pub repo: Arc<SqliteExecutionRepository>,
    pub engine: Arc<ConcreteEngine>,
    pub recovery: Arc<ConcreteRecovery>,
}

impl AppState {
    /// Load config, open the database and wire the engine.
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let config = load_config(&data_dir).await;

        let pool = DatabasePool::with_config(&database_url(&data_dir), &config.database)
            .await
            .context("Failed to open stepweave.db")?;
        let repo = Arc::new(SqliteExecutionRepository::new(pool));

        let capabilities = build_capabilities(&config, Arc::clone(&repo))?;
        let engine = Arc::new(WorkflowEngine::new(
            Arc::clone(&repo),
            capabilities,
            EventBus::default(),
            config.engine.clone(),
        ));
        let recovery = Arc::new(RecoveryService::new(
            Arc::clone(&engine),
            config.recovery.clone(),
        ));

        tracing::debug!(data_dir = %data_dir.display(), "application state initialized");

        Ok(Self {
            data_dir,
            config,
            repo,
            engine,
            recovery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use stepweave_core::repository::ExecutionRepository;
    use stepweave_core::workflow::definition::parse_definition_yaml;
    use stepweave_types::execution::ExecutionStatus;
    use stepweave_types::workflow::Workflow;

    const REPORT: &str = r#"
start_step: count
steps:
  - id: count
    type: script
    script_type: sql
    script: "SELECT count(*) AS n FROM workflows"
    condition:
      type: if
      expression: "row_count > 0"
      cases:
        - value: true
          next_step: done
  - id: done
    type: script
    script: "return row_count"
"#;

    #[tokio::test]
    async fn test_init_runs_sql_workflow_against_own_database() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(dir.path().to_path_buf())).await.unwrap();
        assert!(dir.path().join("stepweave.db").exists());

        let workflow = Workflow::new("report".to_string(), parse_definition_yaml(REPORT).unwrap());
        state.repo.save_workflow(&workflow).await.unwrap();

        let outcome = state.engine.execute(workflow.id, Map::new()).await.unwrap();
        assert!(outcome.is_success(), "got: {:?}", outcome.error);
        assert_eq!(outcome.completed_steps, vec!["count", "done"]);
        assert_eq!(outcome.data["return_value"], 1);

        let record = state
            .repo
            .get_execution(&outcome.execution_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert!(record.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_disabled_workflow_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::init(Some(dir.path().to_path_buf())).await.unwrap();

        let mut workflow =
            Workflow::new("report".to_string(), parse_definition_yaml(REPORT).unwrap());
        workflow.enabled = false;
        state.repo.save_workflow(&workflow).await.unwrap();

        let err = state.engine.execute(workflow.id, Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("disabled"), "got: {err}");
    }
}
