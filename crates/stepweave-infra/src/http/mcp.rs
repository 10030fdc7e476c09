//! MCP tool client for `mcp` script steps.
//!
//! The step's `config.mcp_tool` names the tool. The request is a JSON-RPC
//! `tools/call` whose arguments are the data context plus the interpolated
//! script under `script`. A `result` object in the reply is unwrapped;
//! anything else is returned as-is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{Value, json};
use stepweave_core::workflow::{ScriptExecutor, ScriptRequest, StepError};

use super::HttpClientError;

const MCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Calls tools on an MCP server over HTTP.
pub struct McpToolClient {
    client: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl McpToolClient {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .timeout(MCP_TIMEOUT)
            .build()
            .map_err(|e| HttpClientError::Build(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call_tool(&self, request: ScriptRequest) -> Result<Value, StepError> {
        let tool = request
            .config
            .get("mcp_tool")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StepError::InvalidStep(format!(
                    "mcp_tool not specified for mcp step {}",
                    request.step_id
                ))
            })?
            .to_string();

        let mut arguments = request.data.clone();
        arguments.insert("script".to_string(), Value::String(request.script.clone()));

        let body = json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| StepError::Script(format!("failed to execute MCP tool {tool}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(StepError::Script(format!(
                "MCP tool {tool} returned HTTP {status}: {error_body}"
            )));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| StepError::Script(format!("failed to parse MCP response: {e}")))?;

        if let Some(error) = reply.get("error") {
            return Err(StepError::Script(format!("MCP tool {tool} failed: {error}")));
        }

        tracing::debug!(
            execution_id = %request.execution_id,
            step_id = %request.step_id,
            tool = %tool,
            "mcp tool executed"
        );

        Ok(unwrap_result(reply))
    }
}

fn unwrap_result(reply: Value) -> Value {
    match reply {
        Value::Object(mut map) if map.get("result").is_some_and(Value::is_object) => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

impl ScriptExecutor for McpToolClient {
    fn execute(&self, request: ScriptRequest) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin(self.call_tool(request))
    }
}
