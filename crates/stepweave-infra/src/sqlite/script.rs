//! `sql` script steps executed against a SQLite pool.
//!
//! The runner is handed the pool it may query. The CLI wires in the
//! read-only reader pool, so SQL steps can inspect execution history but
//! cannot modify it.

use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use stepweave_core::workflow::{ScriptExecutor, ScriptRequest, StepError};

/// Runs the interpolated script text as a single SQL statement.
pub struct SqlScriptExecutor {
    pool: SqlitePool,
}

impl SqlScriptExecutor {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn run(&self, request: ScriptRequest) -> Result<Value, StepError> {
        let rows = sqlx::query(&request.script)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StepError::Script(format!("sql step {}: {e}", request.step_id)))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(row_to_json(row)?);
        }

        tracing::debug!(
            execution_id = %request.execution_id,
            step_id = %request.step_id,
            rows = out.len(),
            "sql step executed"
        );

        Ok(json!({
            "status": "executed",
            "step": request.step_id,
            "type": "sql",
            "script": request.script,
            "row_count": out.len(),
            "rows": out,
        }))
    }
}

impl ScriptExecutor for SqlScriptExecutor {
    fn execute(&self, request: ScriptRequest) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin(self.run(request))
    }
}

/// Decode a row by the storage class of each value. TEXT that holds JSON
/// stays a string; callers can parse it if they need to.
fn row_to_json(row: &SqliteRow) -> Result<Value, StepError> {
    let mut object = Map::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row
            .try_get_raw(idx)
            .map_err(|e| StepError::Script(e.to_string()))?;

        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => {
                    json!(row.try_get::<i64, _>(idx).map_err(decode_error)?)
                }
                "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => {
                    json!(row.try_get::<f64, _>(idx).map_err(decode_error)?)
                }
                "BLOB" => {
                    let bytes: Vec<u8> = row.try_get(idx).map_err(decode_error)?;
                    json!(bytes)
                }
                _ => json!(row.try_get::<String, _>(idx).map_err(decode_error)?),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(Value::Object(object))
}

fn decode_error(e: sqlx::Error) -> StepError {
    StepError::Script(format!("cannot decode column: {e}"))
}
