//! Workflow definition types for stepweave.
//!
//! A `WorkflowDefinition` is an ordered list of steps plus the id of the step
//! the engine starts from. Definitions are authored as YAML or JSON and use a
//! flat shape where the step kind is selected by the `type` field:
//!
//! ```yaml
//! start_step: fetch
//! steps:
//!   - id: fetch
//!     type: agent
//!     agent_id: profiler
//!     task: "Profile {{table}}"
//!     next_steps: [route]
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// The step graph of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Steps in authoring order. Order matters only for display and for
    /// rebuilding the data context when a checkpoint carries no snapshot.
    pub steps: Vec<WorkflowStep>,
    /// Id of the first step to execute.
    pub start_step: String,
}

impl WorkflowDefinition {
    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A single node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Unique within a definition.
    pub id: String,
    /// Human-readable step name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// Kind-specific payload, tagged by `type`.
    #[serde(flatten)]
    pub kind: StepKind,
    /// Ordered successors. Only the first entry is followed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
    /// Data-driven routing. Takes precedence over `next_steps`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<WorkflowCondition>,
    /// Free-form configuration handed to capabilities
    /// (e.g. `track_decision`, `mcp_tool`).
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl WorkflowStep {
    /// Member ids if this step is a parallel group.
    pub fn parallel_members(&self) -> Option<&[String]> {
        match &self.kind {
            StepKind::Parallel { parallel } => Some(parallel),
            _ => None,
        }
    }

    /// Read a boolean flag from `config`, treating anything but `true` as off.
    pub fn config_flag(&self, key: &str) -> bool {
        matches!(self.config.get(key), Some(serde_json::Value::Bool(true)))
    }
}

/// The closed set of step kinds the engine knows how to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Delegate a task to an external agent.
    Agent {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_id: Option<String>,
        /// Task template; `{{key}}` placeholders are filled from the data context.
        #[serde(default)]
        task: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tools: Vec<String>,
    },
    /// Run a script: evaluated in-process (inline) or delegated (sql, mcp).
    Script {
        #[serde(default)]
        script: String,
        #[serde(default)]
        script_type: ScriptType,
    },
    /// Pure routing marker; the routing itself lives in `condition`.
    Condition,
    /// Fan-out to the listed member steps and join on all of them.
    Parallel {
        #[serde(default)]
        parallel: Vec<String>,
    },
}

impl StepKind {
    /// Short lowercase label used in logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            StepKind::Agent { .. } => "agent",
            StepKind::Script { .. } => "script",
            StepKind::Condition => "condition",
            StepKind::Parallel { .. } => "parallel",
        }
    }
}

/// Script subtypes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    #[default]
    Inline,
    Sql,
    Mcp,
}

impl std::fmt::Display for ScriptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptType::Inline => write!(f, "inline"),
            ScriptType::Sql => write!(f, "sql"),
            ScriptType::Mcp => write!(f, "mcp"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Conditional routing attached to a step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCondition {
    #[serde(rename = "type")]
    pub kind: ConditionKind,
    #[serde(default)]
    pub expression: String,
    /// Scanned in order; the first match wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<ConditionCase>,
    /// Successor when nothing matches. Empty means terminal.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default: String,
}

/// `if` routes on truthiness, `switch` on value equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionKind {
    If,
    Switch,
}

/// One arm of a condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionCase {
    #[serde(default)]
    pub value: serde_json::Value,
    pub next_step: String,
}

// ---------------------------------------------------------------------------
// Stored workflow
// ---------------------------------------------------------------------------

/// A registered workflow: a definition plus catalog metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// UUIDv7 assigned on registration.
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Disabled workflows are rejected by the engine.
    pub enabled: bool,
    pub definition: WorkflowDefinition,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Wrap a definition as a fresh, enabled workflow.
    pub fn new(name: impl Into<String>, definition: WorkflowDefinition) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            enabled: true,
            definition,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_kinds_deserialize_from_flat_json() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "start_step": "a",
            "steps": [
                {"id": "a", "type": "agent", "agent_id": "profiler", "task": "go", "tools": ["sql"], "next_steps": ["b"]},
                {"id": "b", "type": "script", "script": "return 1", "script_type": "sql"},
                {"id": "c", "type": "condition", "condition": {"type": "if", "expression": "x", "default": "a"}},
                {"id": "d", "type": "parallel", "parallel": ["a", "b"]}
            ]
        }))
        .unwrap();

        assert_eq!(def.steps.len(), 4);
        assert!(matches!(
            &def.steps[0].kind,
            StepKind::Agent { agent_id: Some(id), tools, .. } if id == "profiler" && tools.len() == 1
        ));
        assert!(matches!(
            def.steps[1].kind,
            StepKind::Script { script_type: ScriptType::Sql, .. }
        ));
        assert_eq!(def.steps[2].kind, StepKind::Condition);
        assert_eq!(
            def.steps[2].condition.as_ref().unwrap().kind,
            ConditionKind::If
        );
        assert_eq!(def.steps[3].parallel_members().unwrap(), ["a", "b"]);
    }

    #[test]
    fn test_script_type_defaults_to_inline() {
        let step: WorkflowStep =
            serde_json::from_value(json!({"id": "s", "type": "script", "script": "x"})).unwrap();
        assert!(matches!(
            step.kind,
            StepKind::Script { script_type: ScriptType::Inline, .. }
        ));
    }

    #[test]
    fn test_step_serializes_with_type_tag() {
        let step = WorkflowStep {
            id: "p".to_string(),
            name: String::new(),
            kind: StepKind::Parallel {
                parallel: vec!["x".to_string()],
            },
            next_steps: vec![],
            condition: None,
            config: serde_json::Map::new(),
        };
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], "parallel");
        assert_eq!(value["parallel"], json!(["x"]));
        assert!(value.get("next_steps").is_none());
    }

    #[test]
    fn test_definition_from_yaml() {
        let yaml = r#"
start_step: route
steps:
  - id: route
    type: condition
    condition:
      type: switch
      expression: status
      cases:
        - value: ok
          next_step: done
      default: fallback
  - id: done
    type: script
    script: "return status"
  - id: fallback
    type: agent
    agent_id: triage
    task: "Investigate {{status}}"
    config:
      track_decision: true
"#;
        let def: WorkflowDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        let route = def.step("route").unwrap();
        let cond = route.condition.as_ref().unwrap();
        assert_eq!(cond.kind, ConditionKind::Switch);
        assert_eq!(cond.cases[0].value, json!("ok"));
        assert_eq!(cond.default, "fallback");
        assert!(def.step("fallback").unwrap().config_flag("track_decision"));
        assert!(!def.step("done").unwrap().config_flag("track_decision"));
    }

    #[test]
    fn test_step_lookup_missing() {
        let def = WorkflowDefinition::default();
        assert!(def.step("nope").is_none());
    }

    #[test]
    fn test_workflow_new_is_enabled() {
        let wf = Workflow::new("nightly-profile", WorkflowDefinition::default());
        assert!(wf.enabled);
        assert_eq!(wf.name, "nightly-profile");
        assert_eq!(wf.created_at, wf.updated_at);
    }
}
