//! SQLite execution repository implementation.
//!
//! Implements `ExecutionRepository` from `stepweave-core` using sqlx with split
//! read/write pools. Workflow definitions, execution input and output are
//! stored as JSON text. Step results and decisions are append-only tables.
//!
//! The same repository doubles as the engine's `MemoryProvider` and
//! `DecisionLog` capabilities.

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use sqlx::Row;
use stepweave_core::repository::execution::{ExecutionRepository, memory_context};
use stepweave_core::workflow::{DecisionLog, MemoryProvider, StepError};
use stepweave_types::error::RepositoryError;
use stepweave_types::execution::{
    DecisionRecord, ExecutionRecord, ExecutionStatus, MemoryEntry, StepResultRecord,
    StepRunStatus, WorkflowStats,
};
use stepweave_types::workflow::{Workflow, WorkflowDefinition};
use uuid::Uuid;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `ExecutionRepository`.
#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRow {
    id: String,
    name: String,
    description: Option<String>,
    enabled: bool,
    definition: String,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            enabled: row.try_get("enabled")?,
            definition: row.try_get("definition")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_workflow(self) -> Result<Workflow, RepositoryError> {
        let definition: WorkflowDefinition = serde_json::from_str(&self.definition)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))?;

        Ok(Workflow {
            id: parse_uuid(&self.id)?,
            name: self.name,
            description: self.description,
            enabled: self.enabled,
            definition,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct ExecutionRow {
    id: String,
    workflow_id: String,
    status: String,
    input: String,
    output: String,
    error: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    execution_time_ms: Option<i64>,
}

impl ExecutionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            status: row.try_get("status")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            execution_time_ms: row.try_get("execution_time_ms")?,
        })
    }

    fn into_record(self) -> Result<ExecutionRecord, RepositoryError> {
        let status: ExecutionStatus = self.status.parse().map_err(RepositoryError::Query)?;

        Ok(ExecutionRecord {
            id: parse_uuid(&self.id)?,
            workflow_id: parse_uuid(&self.workflow_id)?,
            status,
            input: parse_object(&self.input, "input")?,
            output: parse_object(&self.output, "output")?,
            error: self.error,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: self
                .completed_at
                .as_deref()
                .map(parse_datetime)
                .transpose()?,
            execution_time_ms: self.execution_time_ms.map(|ms| ms.max(0) as u64),
        })
    }
}

struct StepResultRow {
    id: String,
    execution_id: String,
    step_id: String,
    status: String,
    output: Option<String>,
    error: Option<String>,
    recorded_at: String,
}

impl StepResultRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            step_id: row.try_get("step_id")?,
            status: row.try_get("status")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn into_record(self) -> Result<StepResultRecord, RepositoryError> {
        let status: StepRunStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let output = self
            .output
            .as_deref()
            .map(|s| {
                serde_json::from_str(s)
                    .map_err(|e| RepositoryError::Query(format!("invalid step output JSON: {e}")))
            })
            .transpose()?;

        Ok(StepResultRecord {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            step_id: self.step_id,
            status,
            output,
            error: self.error,
            recorded_at: parse_datetime(&self.recorded_at)?,
        })
    }
}

struct DecisionRow {
    id: String,
    execution_id: String,
    decision_point: String,
    decision_value: String,
    context: String,
    created_at: String,
}

impl DecisionRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            execution_id: row.try_get("execution_id")?,
            decision_point: row.try_get("decision_point")?,
            decision_value: row.try_get("decision_value")?,
            context: row.try_get("context")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_record(self) -> Result<DecisionRecord, RepositoryError> {
        let context: Value = serde_json::from_str(&self.context)
            .map_err(|e| RepositoryError::Query(format!("invalid decision context JSON: {e}")))?;

        Ok(DecisionRecord {
            id: parse_uuid(&self.id)?,
            execution_id: parse_uuid(&self.execution_id)?,
            decision_point: self.decision_point,
            decision_value: self.decision_value,
            context,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

struct MemoryRow {
    workflow_id: String,
    execution_id: String,
    key: String,
    value: String,
    created_at: String,
}

impl MemoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            workflow_id: row.try_get("workflow_id")?,
            execution_id: row.try_get("execution_id")?,
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_entry(self) -> Result<MemoryEntry, RepositoryError> {
        let execution_id = if self.execution_id.is_empty() {
            None
        } else {
            Some(parse_uuid(&self.execution_id)?)
        };
        let value: Value = serde_json::from_str(&self.value)
            .map_err(|e| RepositoryError::Query(format!("invalid memory value JSON: {e}")))?;

        Ok(MemoryEntry {
            workflow_id: parse_uuid(&self.workflow_id)?,
            execution_id,
            key: self.key,
            value,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so that text comparison in SQL orders by time.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_object(s: &str, column: &str) -> Result<Map<String, Value>, RepositoryError> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(RepositoryError::Query(format!(
            "{column} is not a JSON object: {other}"
        ))),
        Err(e) => Err(RepositoryError::Query(format!("invalid {column} JSON: {e}"))),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

fn collect_records<T, R>(
    rows: &[sqlx::sqlite::SqliteRow],
    from_row: fn(&sqlx::sqlite::SqliteRow) -> Result<R, sqlx::Error>,
    convert: fn(R) -> Result<T, RepositoryError>,
) -> Result<Vec<T>, RepositoryError> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let r = from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        out.push(convert(r)?);
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// ExecutionRepository impl
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let definition_json = to_json(&workflow.definition)?;

        sqlx::query(
            r#"INSERT INTO workflows (id, name, description, enabled, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 description = excluded.description,
                 enabled = excluded.enabled,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(workflow.id.to_string())
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(workflow.enabled)
        .bind(&definition_json)
        .bind(format_datetime(&workflow.created_at))
        .bind(format_datetime(&workflow.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflows WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = WorkflowRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_workflow()?))
            }
            None => Ok(None),
        }
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM workflows ORDER BY created_at DESC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_records(&rows, WorkflowRow::from_row, WorkflowRow::into_workflow)
    }

    async fn set_workflow_enabled(&self, id: &Uuid, enabled: bool) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE workflows SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(format_datetime(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn create_execution(&self, record: &ExecutionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO workflow_executions
               (id, workflow_id, status, input, output, error, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(record.id.to_string())
        .bind(record.workflow_id.to_string())
        .bind(record.status.as_str())
        .bind(to_json(&record.input)?)
        .bind(to_json(&record.output)?)
        .bind(&record.error)
        .bind(format_datetime(&record.started_at))
        .bind(record.completed_at.as_ref().map(format_datetime))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepositoryError::Conflict(format!("execution already exists: {}", record.id))
            }
            other => RepositoryError::Query(other.to_string()),
        })?;

        Ok(())
    }

    async fn get_execution(&self, id: &Uuid) -> Result<Option<ExecutionRecord>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let r = ExecutionRow::from_row(&row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(r.into_record()?))
            }
            None => Ok(None),
        }
    }

    async fn list_executions(
        &self,
        workflow_id: Option<&Uuid>,
        limit: u32,
    ) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let rows = match workflow_id {
            Some(id) => {
                sqlx::query(
                    "SELECT * FROM workflow_executions WHERE workflow_id = ? ORDER BY started_at DESC LIMIT ?",
                )
                .bind(id.to_string())
                .bind(limit as i64)
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM workflow_executions ORDER BY started_at DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_records(&rows, ExecutionRow::from_row, ExecutionRow::into_record)
    }

    async fn update_execution_status(
        &self,
        id: &Uuid,
        status: ExecutionStatus,
        error: Option<&str>,
        execution_time_ms: Option<u64>,
    ) -> Result<(), RepositoryError> {
        let completed_at = status
            .is_terminal()
            .then(|| format_datetime(&Utc::now()));
        let execution_time_ms = execution_time_ms.map(|ms| i64::try_from(ms).unwrap_or(i64::MAX));

        let result = sqlx::query(
            "UPDATE workflow_executions SET status = ?, error = ?, completed_at = ?, execution_time_ms = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(error)
        .bind(&completed_at)
        .bind(execution_time_ms)
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn merge_execution_output(
        &self,
        id: &Uuid,
        patch: &Map<String, Value>,
    ) -> Result<(), RepositoryError> {
        if patch.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT output FROM workflow_executions WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(current) = current else {
            return Err(RepositoryError::NotFound);
        };

        let mut output = parse_object(&current, "output")?;
        for (key, value) in patch {
            output.insert(key.clone(), value.clone());
        }

        sqlx::query("UPDATE workflow_executions SET output = ? WHERE id = ?")
            .bind(to_json(&output)?)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn workflow_stats(
        &self,
        workflow_id: &Uuid,
        since: DateTime<Utc>,
    ) -> Result<WorkflowStats, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT
                   COUNT(*) AS total,
                   COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0) AS succeeded,
                   COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS failed,
                   AVG(execution_time_ms) AS avg_ms,
                   MAX(execution_time_ms) AS max_ms
               FROM workflow_executions
               WHERE workflow_id = ? AND started_at > ?"#,
        )
        .bind(workflow_id.to_string())
        .bind(format_datetime(&since))
        .fetch_one(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let count = |column: &str| -> Result<u64, RepositoryError> {
            let n: i64 = row
                .try_get(column)
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            Ok(n.max(0) as u64)
        };

        let avg: Option<f64> = row
            .try_get("avg_ms")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        let max: Option<i64> = row
            .try_get("max_ms")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(WorkflowStats {
            total: count("total")?,
            succeeded: count("succeeded")?,
            failed: count("failed")?,
            avg_execution_time_ms: avg,
            max_execution_time_ms: max.map(|ms| ms.max(0) as u64),
        })
    }

    async fn list_stale_executions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_executions WHERE status IN ('running', 'pending') AND started_at < ? ORDER BY started_at ASC",
        )
        .bind(format_datetime(&cutoff))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_records(&rows, ExecutionRow::from_row, ExecutionRow::into_record)
    }

    async fn append_step_result(&self, result: &StepResultRecord) -> Result<(), RepositoryError> {
        let output = result.output.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"INSERT INTO workflow_step_results
               (id, execution_id, step_id, status, output, error, recorded_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(result.id.to_string())
        .bind(result.execution_id.to_string())
        .bind(&result.step_id)
        .bind(result.status.as_str())
        .bind(&output)
        .bind(&result.error)
        .bind(format_datetime(&result.recorded_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_step_results(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<StepResultRecord>, RepositoryError> {
        // UUIDv7 ids break ties between rows recorded in the same instant.
        let rows = sqlx::query(
            "SELECT * FROM workflow_step_results WHERE execution_id = ? ORDER BY recorded_at ASC, id ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_records(&rows, StepResultRow::from_row, StepResultRow::into_record)
    }

    async fn append_decision(&self, decision: &DecisionRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO workflow_decisions
               (id, execution_id, decision_point, decision_value, context, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(decision.id.to_string())
        .bind(decision.execution_id.to_string())
        .bind(&decision.decision_point)
        .bind(&decision.decision_value)
        .bind(to_json(&decision.context)?)
        .bind(format_datetime(&decision.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_decisions(
        &self,
        execution_id: &Uuid,
    ) -> Result<Vec<DecisionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM workflow_decisions WHERE execution_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_records(&rows, DecisionRow::from_row, DecisionRow::into_record)
    }

    async fn put_memory(&self, entry: &MemoryEntry) -> Result<(), RepositoryError> {
        let execution_id = entry
            .execution_id
            .map(|id| id.to_string())
            .unwrap_or_default();

        sqlx::query(
            r#"INSERT INTO workflow_memory (workflow_id, execution_id, key, value, created_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(workflow_id, execution_id, key) DO UPDATE SET
                 value = excluded.value,
                 created_at = excluded.created_at"#,
        )
        .bind(entry.workflow_id.to_string())
        .bind(&execution_id)
        .bind(&entry.key)
        .bind(to_json(&entry.value)?)
        .bind(format_datetime(&entry.created_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_memory(
        &self,
        workflow_id: &Uuid,
        execution_id: Option<&Uuid>,
    ) -> Result<Vec<MemoryEntry>, RepositoryError> {
        let scope = execution_id.map(|id| id.to_string()).unwrap_or_default();

        let rows = sqlx::query(
            "SELECT * FROM workflow_memory WHERE workflow_id = ? AND (execution_id = '' OR execution_id = ?) ORDER BY created_at ASC",
        )
        .bind(workflow_id.to_string())
        .bind(&scope)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        collect_records(&rows, MemoryRow::from_row, MemoryRow::into_entry)
    }
}

// ---------------------------------------------------------------------------
// Capability impls
// ---------------------------------------------------------------------------

impl MemoryProvider for SqliteExecutionRepository {
    fn get(
        &self,
        workflow_id: Uuid,
        execution_id: Uuid,
    ) -> BoxFuture<'_, Result<Map<String, Value>, StepError>> {
        Box::pin(async move {
            let entries = self
                .list_memory(&workflow_id, Some(&execution_id))
                .await
                .map_err(|e| StepError::Agent(format!("memory lookup failed: {e}")))?;
            Ok(memory_context(&entries))
        })
    }
}

impl DecisionLog for SqliteExecutionRepository {
    fn record(&self, decision: DecisionRecord) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async move { self.append_decision(&decision).await })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepweave_types::workflow::{StepKind, WorkflowStep};

    async fn test_repo() -> SqliteExecutionRepository {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        SqliteExecutionRepository::new(DatabasePool::new(&url).await.unwrap())
    }

    fn sample_workflow() -> Workflow {
        let definition = WorkflowDefinition {
            start_step: "profile".to_string(),
            steps: vec![WorkflowStep {
                id: "profile".to_string(),
                name: "Profile table".to_string(),
                kind: StepKind::Agent {
                    agent_id: Some("profiler".to_string()),
                    task: "Profile {{table}}".to_string(),
                    tools: vec!["sql".to_string()],
                },
                next_steps: vec![],
                condition: None,
                config: Map::new(),
            }],
        };
        let mut workflow = Workflow::new("nightly-profile", definition);
        workflow.description = Some("Profile warehouse tables".to_string());
        workflow
    }

    async fn seeded() -> (SqliteExecutionRepository, Workflow, ExecutionRecord) {
        let repo = test_repo().await;
        let workflow = sample_workflow();
        repo.save_workflow(&workflow).await.unwrap();

        let mut input = Map::new();
        input.insert("table".to_string(), json!("orders"));
        let record = ExecutionRecord::start(workflow.id, input);
        repo.create_execution(&record).await.unwrap();
        (repo, workflow, record)
    }

    #[tokio::test]
    async fn test_workflow_round_trip_and_enable_toggle() {
        let repo = test_repo().await;
        let workflow = sample_workflow();
        repo.save_workflow(&workflow).await.unwrap();

        let loaded = repo.get_workflow(&workflow.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "nightly-profile");
        assert_eq!(loaded.definition, workflow.definition);
        assert!(loaded.enabled);

        assert!(repo.set_workflow_enabled(&workflow.id, false).await.unwrap());
        let loaded = repo.get_workflow(&workflow.id).await.unwrap().unwrap();
        assert!(!loaded.enabled);

        assert!(!repo.set_workflow_enabled(&Uuid::now_v7(), true).await.unwrap());
        assert_eq!(repo.list_workflows().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_workflow_upserts() {
        let repo = test_repo().await;
        let mut workflow = sample_workflow();
        repo.save_workflow(&workflow).await.unwrap();

        workflow.name = "renamed".to_string();
        repo.save_workflow(&workflow).await.unwrap();

        let all = repo.list_workflows().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "renamed");
    }

    #[tokio::test]
    async fn test_get_missing_rows_return_none() {
        let repo = test_repo().await;
        assert!(repo.get_workflow(&Uuid::now_v7()).await.unwrap().is_none());
        assert!(repo.get_execution(&Uuid::now_v7()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_execution_requires_existing_workflow() {
        let repo = test_repo().await;
        let record = ExecutionRecord::start(Uuid::now_v7(), Map::new());
        let err = repo.create_execution(&record).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Query(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_duplicate_execution_is_conflict() {
        let (repo, _, record) = seeded().await;
        let err = repo.create_execution(&record).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)), "got: {err}");
    }

    #[tokio::test]
    async fn test_status_transitions_stamp_completed_at() {
        let (repo, _, record) = seeded().await;

        repo.update_execution_status(&record.id, ExecutionStatus::Failed, Some("agent down"), Some(1500))
            .await
            .unwrap();
        let failed = repo.get_execution(&record.id).await.unwrap().unwrap();
        assert_eq!(failed.status, ExecutionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("agent down"));
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.execution_time_ms, Some(1500));

        repo.update_execution_status(&record.id, ExecutionStatus::Running, None, None)
            .await
            .unwrap();
        let running = repo.get_execution(&record.id).await.unwrap().unwrap();
        assert!(running.completed_at.is_none());
        assert!(running.error.is_none());
        assert!(running.execution_time_ms.is_none());
        assert_eq!(running.input["table"], "orders");
    }

    #[tokio::test]
    async fn test_update_status_missing_execution() {
        let repo = test_repo().await;
        let err = repo
            .update_execution_status(&Uuid::now_v7(), ExecutionStatus::Completed, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_merge_output_is_shallow() {
        let (repo, _, record) = seeded().await;

        let mut first = Map::new();
        first.insert("checkpoint".to_string(), json!({"current_step": "s2", "nested": {"a": 1}}));
        first.insert("note".to_string(), json!("keep"));
        repo.merge_execution_output(&record.id, &first).await.unwrap();

        let mut second = Map::new();
        second.insert("checkpoint".to_string(), json!({"current_step": "s3"}));
        second.insert("flag".to_string(), Value::Null);
        repo.merge_execution_output(&record.id, &second).await.unwrap();

        let loaded = repo.get_execution(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.output["note"], "keep");
        assert_eq!(loaded.output["checkpoint"], json!({"current_step": "s3"}));
        assert_eq!(loaded.output.get("flag"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_merge_output_missing_execution() {
        let repo = test_repo().await;
        let mut patch = Map::new();
        patch.insert("x".to_string(), json!(1));
        let err = repo
            .merge_execution_output(&Uuid::now_v7(), &patch)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_stale_executions() {
        let (repo, workflow, record) = seeded().await;

        let mut old = ExecutionRecord::start(workflow.id, Map::new());
        old.started_at = Utc::now() - chrono::Duration::minutes(30);
        repo.create_execution(&old).await.unwrap();

        let mut old_done = ExecutionRecord::start(workflow.id, Map::new());
        old_done.started_at = Utc::now() - chrono::Duration::minutes(30);
        repo.create_execution(&old_done).await.unwrap();
        repo.update_execution_status(&old_done.id, ExecutionStatus::Completed, None, None)
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::minutes(5);
        let stale = repo.list_stale_executions(cutoff).await.unwrap();
        let ids: Vec<Uuid> = stale.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![old.id]);
        assert!(!ids.contains(&record.id));

        let all = repo.list_executions(Some(&workflow.id), 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(repo.list_executions(None, 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_workflow_stats_window_and_durations() {
        let (repo, workflow, record) = seeded().await;

        repo.update_execution_status(&record.id, ExecutionStatus::Completed, None, Some(100))
            .await
            .unwrap();

        let failed = ExecutionRecord::start(workflow.id, Map::new());
        repo.create_execution(&failed).await.unwrap();
        repo.update_execution_status(&failed.id, ExecutionStatus::Failed, Some("boom"), Some(300))
            .await
            .unwrap();

        // Still running: counted, but has no duration.
        let running = ExecutionRecord::start(workflow.id, Map::new());
        repo.create_execution(&running).await.unwrap();

        let mut old = ExecutionRecord::start(workflow.id, Map::new());
        old.started_at = Utc::now() - chrono::Duration::days(3);
        repo.create_execution(&old).await.unwrap();
        repo.update_execution_status(&old.id, ExecutionStatus::Completed, None, Some(9000))
            .await
            .unwrap();

        let day = repo
            .workflow_stats(&workflow.id, Utc::now() - chrono::Duration::hours(24))
            .await
            .unwrap();
        assert_eq!((day.total, day.succeeded, day.failed), (3, 1, 1));
        assert_eq!(day.avg_execution_time_ms, Some(200.0));
        assert_eq!(day.max_execution_time_ms, Some(300));

        let week = repo
            .workflow_stats(&workflow.id, Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!((week.total, week.succeeded, week.failed), (4, 2, 1));
        assert_eq!(week.max_execution_time_ms, Some(9000));

        let other = repo
            .workflow_stats(&Uuid::now_v7(), Utc::now() - chrono::Duration::days(7))
            .await
            .unwrap();
        assert_eq!(other, WorkflowStats::default());
    }

    #[tokio::test]
    async fn test_step_results_append_in_order() {
        let (repo, _, record) = seeded().await;

        repo.append_step_result(&StepResultRecord::completed(record.id, "s1", json!({"rows": 3})))
            .await
            .unwrap();
        repo.append_step_result(&StepResultRecord::failed(record.id, "s2", "timeout"))
            .await
            .unwrap();
        repo.append_step_result(&StepResultRecord::completed(record.id, "s2", json!("ok")))
            .await
            .unwrap();

        let rows = repo.list_step_results(&record.id).await.unwrap();
        let summary: Vec<(&str, StepRunStatus)> =
            rows.iter().map(|r| (r.step_id.as_str(), r.status)).collect();
        assert_eq!(
            summary,
            vec![
                ("s1", StepRunStatus::Completed),
                ("s2", StepRunStatus::Failed),
                ("s2", StepRunStatus::Completed),
            ]
        );
        assert_eq!(rows[0].output, Some(json!({"rows": 3})));
        assert_eq!(rows[1].error.as_deref(), Some("timeout"));
        assert!(rows[1].output.is_none());
    }

    #[tokio::test]
    async fn test_decision_log_capability() {
        let (repo, _, record) = seeded().await;
        let decision = DecisionRecord {
            id: Uuid::now_v7(),
            execution_id: record.id,
            decision_point: "route".to_string(),
            decision_value: "approve".to_string(),
            context: json!({"score": 0.93}),
            created_at: Utc::now(),
        };

        DecisionLog::record(&repo, decision).await.unwrap();

        let decisions = repo.list_decisions(&record.id).await.unwrap();
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].decision_point, "route");
        assert_eq!(decisions[0].context["score"], 0.93);
    }

    #[tokio::test]
    async fn test_memory_scopes_and_replacement() {
        let (repo, workflow, record) = seeded().await;
        let other = ExecutionRecord::start(workflow.id, Map::new());
        repo.create_execution(&other).await.unwrap();

        let entry = |execution_id: Option<Uuid>, key: &str, value: Value| MemoryEntry {
            workflow_id: workflow.id,
            execution_id,
            key: key.to_string(),
            value,
            created_at: Utc::now(),
        };

        repo.put_memory(&entry(None, "tone", json!("chatty"))).await.unwrap();
        repo.put_memory(&entry(None, "owner", json!("data-team"))).await.unwrap();
        repo.put_memory(&entry(None, "owner", json!("platform"))).await.unwrap();
        repo.put_memory(&entry(Some(record.id), "tone", json!("terse")))
            .await
            .unwrap();
        repo.put_memory(&entry(Some(other.id), "secret", json!(42)))
            .await
            .unwrap();

        let wide = repo.list_memory(&workflow.id, None).await.unwrap();
        assert_eq!(wide.len(), 2);

        let context = MemoryProvider::get(&repo, workflow.id, record.id).await.unwrap();
        assert_eq!(context["tone"], "terse");
        assert_eq!(context["owner"], "platform");
        assert!(!context.contains_key("secret"));
    }
}
