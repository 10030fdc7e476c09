//! Wiring of the engine's capability set from config.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use stepweave_core::workflow::{Capabilities, ScriptExecutor, ScriptRequest, StepError};
use stepweave_types::config::StepweaveConfig;
use stepweave_types::workflow::ScriptType;

use crate::http::HttpClientError;
use crate::http::agent::HttpAgentExecutor;
use crate::http::mcp::McpToolClient;
use crate::sqlite::execution::SqliteExecutionRepository;
use crate::sqlite::script::SqlScriptExecutor;

/// Routes delegated scripts to the executor for their subtype. A subtype
/// with no executor fails the step.
pub struct ScriptRouter {
    sql: Option<Arc<dyn ScriptExecutor>>,
    mcp: Option<Arc<dyn ScriptExecutor>>,
}

impl ScriptRouter {
    pub fn new(
        sql: Option<Arc<dyn ScriptExecutor>>,
        mcp: Option<Arc<dyn ScriptExecutor>>,
    ) -> Self {
        Self { sql, mcp }
    }
}

impl ScriptExecutor for ScriptRouter {
    fn execute(&self, request: ScriptRequest) -> BoxFuture<'_, Result<Value, StepError>> {
        let target = match request.script_type {
            ScriptType::Sql => self.sql.as_ref(),
            ScriptType::Mcp => self.mcp.as_ref(),
            ScriptType::Inline => None,
        };
        match target {
            Some(executor) => executor.execute(request),
            None => Box::pin(async move {
                Err(StepError::Script(format!(
                    "no executor configured for {} scripts",
                    request.script_type
                )))
            }),
        }
    }
}

/// Build the production capability set: HTTP agent client, SQL steps
/// against the read-only pool, MCP when an endpoint is configured, and the
/// SQLite repository as memory provider and decision log.
pub fn build_capabilities(
    config: &StepweaveConfig,
    repo: Arc<SqliteExecutionRepository>,
) -> Result<Capabilities, HttpClientError> {
    let agent = HttpAgentExecutor::new(&config.agent)?;

    let sql: Arc<dyn ScriptExecutor> =
        Arc::new(SqlScriptExecutor::new(repo.pool().reader.clone()));
    let mcp = match &config.mcp.endpoint {
        Some(endpoint) => {
            Some(Arc::new(McpToolClient::new(endpoint.clone())?) as Arc<dyn ScriptExecutor>)
        }
        None => {
            tracing::debug!("no MCP endpoint configured, mcp steps will fail");
            None
        }
    };

    Ok(Capabilities {
        agent: Arc::new(agent),
        memory: repo.clone(),
        scripts: Arc::new(ScriptRouter::new(Some(sql), mcp)),
        decisions: repo,
    })
}
