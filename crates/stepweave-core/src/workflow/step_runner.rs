//! Step runner and the capability traits steps delegate to.
//!
//! `StepRunner` dispatches on the closed [`StepKind`] enum. Agent and
//! delegated script steps call out through object-safe capability traits
//! that infra implements (HTTP agent client, SQL runner, MCP client, SQLite
//! memory/decision stores). Inline scripts are evaluated in-process.

use std::sync::Arc;

use chrono::Utc;
use futures_util::future::BoxFuture;
use serde_json::{Map, Value, json};
use stepweave_types::error::RepositoryError;
use stepweave_types::execution::DecisionRecord;
use stepweave_types::workflow::{ScriptType, StepKind, WorkflowStep};
use uuid::Uuid;

use super::context::{DataContext, value_to_string};
use super::expression;

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

/// Errors that can occur during step execution.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StepError {
    /// The step is missing something it needs to run.
    #[error("{0}")]
    InvalidStep(String),

    /// A parallel member id does not exist.
    #[error("step not found: {0}")]
    NotFound(String),

    /// The agent capability failed.
    #[error("agent execution failed: {0}")]
    Agent(String),

    /// The script/tool capability failed.
    #[error("script execution failed: {0}")]
    Script(String),

    /// The step kind cannot run in this position.
    #[error("unsupported step: {0}")]
    Unsupported(String),

    /// The step exceeded its deadline.
    #[error("step timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The run was cancelled while the step was in flight.
    #[error("step cancelled")]
    Cancelled,
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Executes a task on an external agent.
pub trait AgentExecutor: Send + Sync {
    fn execute(
        &self,
        agent_id: &str,
        task: &str,
        tools: &[String],
        memory: &Map<String, Value>,
    ) -> BoxFuture<'_, Result<Value, StepError>>;
}

/// Supplies the memory context handed to agent steps.
pub trait MemoryProvider: Send + Sync {
    fn get(
        &self,
        workflow_id: Uuid,
        execution_id: Uuid,
    ) -> BoxFuture<'_, Result<Map<String, Value>, StepError>>;
}

/// A delegated (`sql` or `mcp`) script invocation.
#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub execution_id: Uuid,
    pub step_id: String,
    pub script_type: ScriptType,
    /// Script text after interpolation.
    pub script: String,
    /// The step's declared `config`.
    pub config: Map<String, Value>,
    /// Data context at dispatch time.
    pub data: Map<String, Value>,
}

/// Runs delegated scripts and tools. The returned value is merged verbatim.
pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, request: ScriptRequest) -> BoxFuture<'_, Result<Value, StepError>>;
}

/// Append-only log of tracked agent decisions.
pub trait DecisionLog: Send + Sync {
    fn record(&self, decision: DecisionRecord) -> BoxFuture<'_, Result<(), RepositoryError>>;
}

/// Memory provider for deployments without workflow memory.
pub struct NoMemory;

impl MemoryProvider for NoMemory {
    fn get(&self, _: Uuid, _: Uuid) -> BoxFuture<'_, Result<Map<String, Value>, StepError>> {
        Box::pin(async { Ok(Map::new()) })
    }
}

/// Decision log that drops every record.
pub struct DiscardDecisions;

impl DecisionLog for DiscardDecisions {
    fn record(&self, _: DecisionRecord) -> BoxFuture<'_, Result<(), RepositoryError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Script executor that rejects every delegated script.
pub struct NoScriptExecutor;

impl ScriptExecutor for NoScriptExecutor {
    fn execute(&self, request: ScriptRequest) -> BoxFuture<'_, Result<Value, StepError>> {
        Box::pin(async move {
            Err(StepError::Script(format!(
                "no executor configured for {} scripts",
                request.script_type
            )))
        })
    }
}

/// The set of external collaborators a run may call.
#[derive(Clone)]
pub struct Capabilities {
    pub agent: Arc<dyn AgentExecutor>,
    pub memory: Arc<dyn MemoryProvider>,
    pub scripts: Arc<dyn ScriptExecutor>,
    pub decisions: Arc<dyn DecisionLog>,
}

impl Capabilities {
    /// Agent-only capabilities: no memory, no delegated scripts, decisions discarded.
    pub fn with_agent(agent: Arc<dyn AgentExecutor>) -> Self {
        Self {
            agent,
            memory: Arc::new(NoMemory),
            scripts: Arc::new(NoScriptExecutor),
            decisions: Arc::new(DiscardDecisions),
        }
    }
}

// ---------------------------------------------------------------------------
// StepRunner
// ---------------------------------------------------------------------------

/// Identifies the run a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunIds {
    pub execution_id: Uuid,
    pub workflow_id: Uuid,
}

/// Executes individual (non-parallel) steps by dispatching on their kind.
pub struct StepRunner {
    capabilities: Capabilities,
}

impl StepRunner {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    /// Run a step against the given data context and return its result.
    pub async fn run(
        &self,
        step: &WorkflowStep,
        data: &DataContext,
        ids: RunIds,
    ) -> Result<Value, StepError> {
        match &step.kind {
            StepKind::Agent {
                agent_id,
                task,
                tools,
            } => {
                self.run_agent(step, agent_id.as_deref(), task, tools, data, ids)
                    .await
            }
            StepKind::Script {
                script,
                script_type,
            } => self.run_script(step, script, *script_type, data, ids).await,
            StepKind::Condition => {
                if step.condition.is_none() {
                    return Err(StepError::InvalidStep("condition not specified".to_string()));
                }
                Ok(json!({ "condition_evaluated": true }))
            }
            StepKind::Parallel { parallel } => {
                if parallel.is_empty() {
                    Ok(json!({ "status": "no_parallel_steps" }))
                } else {
                    Err(StepError::Unsupported(format!(
                        "parallel step '{}' cannot run inside another parallel group",
                        step.id
                    )))
                }
            }
        }
    }

    async fn run_agent(
        &self,
        step: &WorkflowStep,
        agent_id: Option<&str>,
        task: &str,
        tools: &[String],
        data: &DataContext,
        ids: RunIds,
    ) -> Result<Value, StepError> {
        let agent_id = agent_id.filter(|a| !a.trim().is_empty()).ok_or_else(|| {
            StepError::InvalidStep("agent_id not specified for agent step".to_string())
        })?;

        let task = data.interpolate(task);

        let memory = match self
            .capabilities
            .memory
            .get(ids.workflow_id, ids.execution_id)
            .await
        {
            Ok(memory) => memory,
            Err(e) => {
                tracing::warn!(
                    execution_id = %ids.execution_id,
                    step_id = %step.id,
                    error = %e,
                    "workflow memory unavailable, continuing without it"
                );
                Map::new()
            }
        };

        let result = self
            .capabilities
            .agent
            .execute(agent_id, &task, tools, &memory)
            .await?;

        if step.config_flag("track_decision") {
            let decision = DecisionRecord {
                id: Uuid::now_v7(),
                execution_id: ids.execution_id,
                decision_point: step.id.clone(),
                decision_value: value_to_string(&result),
                context: result.clone(),
                created_at: Utc::now(),
            };
            if let Err(e) = self.capabilities.decisions.record(decision).await {
                tracing::warn!(
                    execution_id = %ids.execution_id,
                    step_id = %step.id,
                    error = %e,
                    "failed to log decision"
                );
            }
        }

        Ok(result)
    }

    async fn run_script(
        &self,
        step: &WorkflowStep,
        script: &str,
        script_type: ScriptType,
        data: &DataContext,
        ids: RunIds,
    ) -> Result<Value, StepError> {
        if script.trim().is_empty() {
            return Err(StepError::InvalidStep(
                "script not specified for script step".to_string(),
            ));
        }

        let script = data.interpolate(script);

        match script_type {
            ScriptType::Inline => Ok(run_inline(&step.id, &script, data)),
            ScriptType::Sql | ScriptType::Mcp => {
                self.capabilities
                    .scripts
                    .execute(ScriptRequest {
                        execution_id: ids.execution_id,
                        step_id: step.id.clone(),
                        script_type,
                        script,
                        config: step.config.clone(),
                        data: data.as_map().clone(),
                    })
                    .await
            }
        }
    }
}

/// Inline scripts report what ran; `return <expr>` also yields the value of
/// `<expr>`. Text that is not a valid expression is returned as a string.
fn run_inline(step_id: &str, script: &str, data: &DataContext) -> Value {
    let mut result = Map::new();
    result.insert("status".to_string(), json!("executed"));
    result.insert("step".to_string(), json!(step_id));
    result.insert("script".to_string(), json!(script));

    if let Some(expr) = script.trim().strip_prefix("return ") {
        let expr = expr.trim();
        let value = match expression::evaluate(expr, data.as_map()) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(step_id, error = %e, "return expression kept as text");
                Value::String(expr.to_string())
            }
        };
        result.insert("return_value".to_string(), value);
    }

    Value::Object(result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct EchoAgent {
        calls: Mutex<Vec<(String, String, usize)>>,
    }

    impl AgentExecutor for EchoAgent {
        fn execute(
            &self,
            agent_id: &str,
            task: &str,
            tools: &[String],
            memory: &Map<String, Value>,
        ) -> BoxFuture<'_, Result<Value, StepError>> {
            self.calls
                .lock()
                .unwrap()
                .push((agent_id.to_string(), task.to_string(), memory.len()));
            let reply = json!({ "agent": agent_id, "task": task, "tools": tools });
            Box::pin(async move { Ok(reply) })
        }
    }

    struct FixedMemory;

    impl MemoryProvider for FixedMemory {
        fn get(&self, _: Uuid, _: Uuid) -> BoxFuture<'_, Result<Map<String, Value>, StepError>> {
            Box::pin(async { Ok(json!({"prior": 1}).as_object().cloned().unwrap()) })
        }
    }

    struct BrokenMemory;

    impl MemoryProvider for BrokenMemory {
        fn get(&self, _: Uuid, _: Uuid) -> BoxFuture<'_, Result<Map<String, Value>, StepError>> {
            Box::pin(async { Err(StepError::Agent("memory down".to_string())) })
        }
    }

    #[derive(Default)]
    struct RecordingDecisions(Mutex<Vec<DecisionRecord>>);

    impl DecisionLog for RecordingDecisions {
        fn record(&self, decision: DecisionRecord) -> BoxFuture<'_, Result<(), RepositoryError>> {
            self.0.lock().unwrap().push(decision);
            Box::pin(async { Ok(()) })
        }
    }

    struct EchoScripts;

    impl ScriptExecutor for EchoScripts {
        fn execute(&self, request: ScriptRequest) -> BoxFuture<'_, Result<Value, StepError>> {
            Box::pin(async move {
                Ok(json!({ "type": request.script_type.to_string(), "ran": request.script }))
            })
        }
    }

    fn ids() -> RunIds {
        RunIds {
            execution_id: Uuid::now_v7(),
            workflow_id: Uuid::now_v7(),
        }
    }

    fn step(json: Value) -> WorkflowStep {
        serde_json::from_value(json).unwrap()
    }

    fn data(value: Value) -> DataContext {
        DataContext::new(value.as_object().cloned().unwrap())
    }

    fn echo_agent() -> Arc<EchoAgent> {
        Arc::new(EchoAgent {
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_agent_step_interpolates_task_and_passes_memory() {
        let agent = echo_agent();
        let mut caps = Capabilities::with_agent(agent.clone());
        caps.memory = Arc::new(FixedMemory);
        let runner = StepRunner::new(caps);

        let s = step(json!({"id": "a", "type": "agent", "agent_id": "profiler",
            "task": "Profile {{table}}", "tools": ["sql"]}));
        let out = runner
            .run(&s, &data(json!({"table": "orders"})), ids())
            .await
            .unwrap();

        assert_eq!(out["task"], "Profile orders");
        assert_eq!(out["tools"], json!(["sql"]));
        let calls = agent.calls.lock().unwrap();
        assert_eq!(calls[0], ("profiler".to_string(), "Profile orders".to_string(), 1));
    }

    #[tokio::test]
    async fn test_agent_step_survives_memory_failure() {
        let agent = echo_agent();
        let mut caps = Capabilities::with_agent(agent.clone());
        caps.memory = Arc::new(BrokenMemory);
        let runner = StepRunner::new(caps);

        let s = step(json!({"id": "a", "type": "agent", "agent_id": "x", "task": "t"}));
        assert!(runner.run(&s, &DataContext::default(), ids()).await.is_ok());
        assert_eq!(agent.calls.lock().unwrap()[0].2, 0);
    }

    #[tokio::test]
    async fn test_agent_step_without_agent_id_fails() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let s = step(json!({"id": "a", "type": "agent", "task": "t"}));
        let err = runner.run(&s, &DataContext::default(), ids()).await.unwrap_err();
        assert_eq!(err.to_string(), "agent_id not specified for agent step");
    }

    #[tokio::test]
    async fn test_tracked_decision_is_logged() {
        let decisions = Arc::new(RecordingDecisions::default());
        let mut caps = Capabilities::with_agent(echo_agent());
        caps.decisions = decisions.clone();
        let runner = StepRunner::new(caps);
        let run_ids = ids();

        let s = step(json!({"id": "classify", "type": "agent", "agent_id": "x", "task": "t",
            "config": {"track_decision": true}}));
        runner.run(&s, &DataContext::default(), run_ids).await.unwrap();

        let logged = decisions.0.lock().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].decision_point, "classify");
        assert_eq!(logged[0].execution_id, run_ids.execution_id);
        assert_eq!(logged[0].context["agent"], "x");
    }

    #[tokio::test]
    async fn test_inline_script_return_value() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let s = step(json!({"id": "calc", "type": "script", "script": "return rows > {{min}}"}));
        let out = runner
            .run(&s, &data(json!({"rows": 10, "min": 5})), ids())
            .await
            .unwrap();

        assert_eq!(out["status"], "executed");
        assert_eq!(out["step"], "calc");
        assert_eq!(out["script"], "return rows > 5");
        assert_eq!(out["return_value"], json!(true));
    }

    #[tokio::test]
    async fn test_inline_script_without_return() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let s = step(json!({"id": "noop", "type": "script", "script": "log('hi')"}));
        let out = runner.run(&s, &DataContext::default(), ids()).await.unwrap();
        assert!(out.get("return_value").is_none());
    }

    #[tokio::test]
    async fn test_inline_unparseable_return_kept_as_text() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let s = step(json!({"id": "t", "type": "script", "script": "return hello world"}));
        let out = runner.run(&s, &DataContext::default(), ids()).await.unwrap();
        assert_eq!(out["return_value"], "hello world");
    }

    #[tokio::test]
    async fn test_empty_script_fails() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let s = step(json!({"id": "t", "type": "script", "script": "  "}));
        let err = runner.run(&s, &DataContext::default(), ids()).await.unwrap_err();
        assert_eq!(err.to_string(), "script not specified for script step");
    }

    #[tokio::test]
    async fn test_sql_script_is_delegated() {
        let mut caps = Capabilities::with_agent(echo_agent());
        caps.scripts = Arc::new(EchoScripts);
        let runner = StepRunner::new(caps);
        let s = step(json!({"id": "q", "type": "script", "script_type": "sql",
            "script": "SELECT * FROM {{table}}"}));
        let out = runner
            .run(&s, &data(json!({"table": "orders"})), ids())
            .await
            .unwrap();
        assert_eq!(out, json!({"type": "sql", "ran": "SELECT * FROM orders"}));
    }

    #[tokio::test]
    async fn test_delegated_script_without_executor_fails() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let s = step(json!({"id": "m", "type": "script", "script_type": "mcp", "script": "x"}));
        let err = runner.run(&s, &DataContext::default(), ids()).await.unwrap_err();
        assert!(err.to_string().contains("mcp"), "got: {err}");
    }

    #[tokio::test]
    async fn test_condition_step_marker() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let s = step(json!({"id": "c", "type": "condition",
            "condition": {"type": "if", "expression": "x"}}));
        let out = runner.run(&s, &DataContext::default(), ids()).await.unwrap();
        assert_eq!(out, json!({"condition_evaluated": true}));

        let bare = step(json!({"id": "c", "type": "condition"}));
        let err = runner.run(&bare, &DataContext::default(), ids()).await.unwrap_err();
        assert_eq!(err.to_string(), "condition not specified");
    }

    #[tokio::test]
    async fn test_parallel_step_direct_dispatch() {
        let runner = StepRunner::new(Capabilities::with_agent(echo_agent()));
        let empty = step(json!({"id": "p", "type": "parallel", "parallel": []}));
        let out = runner.run(&empty, &DataContext::default(), ids()).await.unwrap();
        assert_eq!(out, json!({"status": "no_parallel_steps"}));

        let nested = step(json!({"id": "p", "type": "parallel", "parallel": ["a"]}));
        let err = runner.run(&nested, &DataContext::default(), ids()).await.unwrap_err();
        assert!(matches!(err, StepError::Unsupported(_)));
    }
}
