//! HTTP agent client -- concrete [`AgentExecutor`] for the agent service.
//!
//! Sends `POST {endpoint}/api/v1/agents/{agent_id}/execute` with the task,
//! the allowed tools and the memory context. A bearer token is read from the
//! environment variable named in config at construction time and never logged.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::{Map, Value};
use stepweave_core::workflow::{AgentExecutor, StepError};
use stepweave_types::config::AgentEndpointConfig;

use super::HttpClientError;

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    agent_id: &'a str,
    task: &'a str,
    tools: &'a [String],
    memory: &'a Map<String, Value>,
}

/// Agent executor backed by the agent service's REST API.
pub struct HttpAgentExecutor {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAgentExecutor {
    pub fn new(config: &AgentEndpointConfig) -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| HttpClientError::Build(e.to_string()))?;

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::debug!(env = %config.api_key_env, "no agent API key set, sending unauthenticated requests");
        }

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Use `key` as the bearer token instead of the environment variable.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    fn url(&self, agent_id: &str) -> String {
        format!("{}/api/v1/agents/{agent_id}/execute", self.base_url)
    }

    async fn call(
        &self,
        agent_id: &str,
        task: &str,
        tools: &[String],
        memory: &Map<String, Value>,
    ) -> Result<Value, StepError> {
        let body = AgentRequest {
            agent_id,
            task,
            tools,
            memory,
        };

        let mut request = self.client.post(self.url(agent_id)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StepError::Agent(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let error_body = response.text().await.unwrap_or_default();
            return Err(StepError::Agent(format!(
                "agent {agent_id} returned HTTP {status}: {error_body}"
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| StepError::Agent(format!("failed to parse agent response: {e}")))?;

        tracing::debug!(agent_id, "agent call completed");
        Ok(result)
    }
}

impl AgentExecutor for HttpAgentExecutor {
    fn execute(
        &self,
        agent_id: &str,
        task: &str,
        tools: &[String],
        memory: &Map<String, Value>,
    ) -> BoxFuture<'_, Result<Value, StepError>> {
        let agent_id = agent_id.to_string();
        let task = task.to_string();
        let tools = tools.to_vec();
        let memory = memory.clone();
        Box::pin(async move { self.call(&agent_id, &task, &tools, &memory).await })
    }
}
