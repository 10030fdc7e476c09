//! Workflow definition parsing, validation, and file loading.
//!
//! Converts YAML/JSON documents into `WorkflowDefinition`, checks referential
//! integrity (every successor, member and case target exists), condition
//! syntax, and runs the static cycle analysis in [`super::dag`].

use std::collections::HashSet;
use std::path::Path;

use stepweave_types::workflow::{StepKind, WorkflowDefinition};
use thiserror::Error;

use super::dag::{self, CycleReport};
use super::expression::{self, ExpressionError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A definition is structurally unusable.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    Invalid(String),

    /// A step references a step id that does not exist.
    #[error("step '{from}' references unknown step '{to}'")]
    UnknownReference { from: String, to: String },

    /// The engine reached a step id that is not in the definition.
    #[error("step not found: {0}")]
    StepNotFound(String),

    /// A condition expression does not parse.
    #[error("malformed condition on step '{step}': {source}")]
    MalformedCondition {
        step: String,
        #[source]
        source: ExpressionError,
    },

    /// Steps that route to each other unconditionally.
    #[error("unconditional cycle: {0}")]
    Cycle(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate a YAML definition.
pub fn parse_definition_yaml(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Parse and validate a JSON definition.
pub fn parse_definition_json(json: &str) -> Result<WorkflowDefinition, DefinitionError> {
    let def: WorkflowDefinition =
        serde_json::from_str(json).map_err(|e| DefinitionError::Parse(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a definition to YAML.
pub fn serialize_definition_yaml(def: &WorkflowDefinition) -> Result<String, DefinitionError> {
    serde_yaml_ng::to_string(def).map_err(|e| DefinitionError::Parse(e.to_string()))
}

/// Load a definition file. `.json` files are read as JSON, anything else as YAML.
pub fn load_definition(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
    let content = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => parse_definition_json(&content),
        _ => parse_definition_yaml(&content),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Non-fatal findings of a successful validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Cycles that pass through a condition. They may terminate at runtime
    /// and are bounded by the step ceiling.
    pub conditional_cycles: Vec<Vec<String>>,
}

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - At least one step exists and `start_step` names one of them
/// - All step IDs are unique
/// - `next_steps`, parallel members, case targets and defaults exist
/// - Agent steps name an agent, script steps carry a script
/// - Condition steps carry a condition and every expression parses
/// - Parallel groups do not contain themselves or other groups
/// - No cycle is made solely of unconditional edges
pub fn validate_definition(def: &WorkflowDefinition) -> Result<ValidationReport, DefinitionError> {
    if def.steps.is_empty() {
        return Err(DefinitionError::Invalid(
            "workflow must have at least one step".to_string(),
        ));
    }

    let mut ids = HashSet::new();
    for step in &def.steps {
        if step.id.trim().is_empty() {
            return Err(DefinitionError::Invalid("step id must not be empty".to_string()));
        }
        if !ids.insert(step.id.as_str()) {
            return Err(DefinitionError::Invalid(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    if !ids.contains(def.start_step.as_str()) {
        return Err(DefinitionError::Invalid(format!(
            "start_step '{}' is not a step of this workflow",
            def.start_step
        )));
    }

    let check_ref = |from: &str, to: &str| -> Result<(), DefinitionError> {
        if ids.contains(to) {
            Ok(())
        } else {
            Err(DefinitionError::UnknownReference {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    };

    for step in &def.steps {
        for next in &step.next_steps {
            check_ref(&step.id, next)?;
        }

        match &step.kind {
            StepKind::Agent { agent_id, .. } => {
                if agent_id.as_deref().is_none_or(|a| a.trim().is_empty()) {
                    return Err(DefinitionError::Invalid(format!(
                        "agent step '{}' has no agent_id",
                        step.id
                    )));
                }
            }
            StepKind::Script { script, .. } => {
                if script.trim().is_empty() {
                    return Err(DefinitionError::Invalid(format!(
                        "script step '{}' has no script",
                        step.id
                    )));
                }
            }
            StepKind::Condition => {
                if step.condition.is_none() {
                    return Err(DefinitionError::Invalid(format!(
                        "condition step '{}' has no condition",
                        step.id
                    )));
                }
            }
            StepKind::Parallel { parallel } => {
                for member in parallel {
                    check_ref(&step.id, member)?;
                    if member == &step.id {
                        return Err(DefinitionError::Invalid(format!(
                            "parallel step '{}' lists itself as a member",
                            step.id
                        )));
                    }
                    if def.step(member).is_some_and(|m| m.parallel_members().is_some()) {
                        return Err(DefinitionError::Invalid(format!(
                            "parallel step '{}' nests parallel step '{member}'",
                            step.id
                        )));
                    }
                }
            }
        }

        if let Some(condition) = &step.condition {
            for case in &condition.cases {
                check_ref(&step.id, &case.next_step)?;
            }
            if !condition.default.is_empty() {
                check_ref(&step.id, &condition.default)?;
            }
            if !condition.expression.trim().is_empty() {
                expression::parse(&condition.expression).map_err(|source| {
                    DefinitionError::MalformedCondition {
                        step: step.id.clone(),
                        source,
                    }
                })?;
            }
        }
    }

    let CycleReport {
        unconditional,
        conditional,
    } = dag::find_cycles(def);

    if let Some(cycle) = unconditional.first() {
        return Err(DefinitionError::Cycle(cycle.join(" -> ")));
    }
    for cycle in &conditional {
        tracing::warn!(
            steps = %cycle.join(" -> "),
            "workflow contains a conditional cycle; bounded by the step ceiling"
        );
    }

    Ok(ValidationReport {
        conditional_cycles: conditional,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
start_step: fetch
steps:
  - id: fetch
    type: agent
    agent_id: profiler
    task: "Profile {{table}}"
    next_steps: [fan]
  - id: fan
    type: parallel
    parallel: [lint, stats]
    next_steps: [route]
  - id: lint
    type: script
    script: "return 1"
  - id: stats
    type: script
    script_type: sql
    script: "SELECT count(*) FROM {{table}}"
  - id: route
    type: condition
    condition:
      type: switch
      expression: status
      cases:
        - value: ok
          next_step: publish
      default: ""
  - id: publish
    type: script
    script: "return status"
"#;

    #[test]
    fn test_parse_valid_yaml() {
        let def = parse_definition_yaml(VALID).unwrap();
        assert_eq!(def.start_step, "fetch");
        assert_eq!(def.steps.len(), 6);
    }

    #[test]
    fn test_yaml_roundtrip() {
        let def = parse_definition_yaml(VALID).unwrap();
        let yaml = serialize_definition_yaml(&def).unwrap();
        let again = parse_definition_yaml(&yaml).unwrap();
        assert_eq!(def, again);
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{"start_step":"a","steps":[{"id":"a","type":"script","script":"return 1"}]}"#;
        let def = parse_definition_json(json).unwrap();
        assert_eq!(def.steps[0].id, "a");
    }

    #[test]
    fn test_parse_error_reported() {
        let err = parse_definition_yaml("steps: [").unwrap_err();
        assert!(matches!(err, DefinitionError::Parse(_)));
    }

    #[test]
    fn test_rejects_empty_definition() {
        let def = WorkflowDefinition::default();
        let err = validate_definition(&def).unwrap_err();
        assert!(err.to_string().contains("at least one step"), "got: {err}");
    }

    #[test]
    fn test_rejects_unknown_start_step() {
        let json = r#"{"start_step":"nope","steps":[{"id":"a","type":"script","script":"x"}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(err.to_string().contains("start_step 'nope'"), "got: {err}");
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let json = r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x"},
            {"id":"a","type":"script","script":"y"}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate step ID"), "got: {err}");
    }

    #[test]
    fn test_rejects_unknown_next_step() {
        let json = r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x","next_steps":["ghost"]}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(matches!(
            err,
            DefinitionError::UnknownReference { ref to, .. } if to == "ghost"
        ));
    }

    #[test]
    fn test_rejects_unknown_case_target() {
        let json = r#"{"start_step":"c","steps":[
            {"id":"c","type":"condition","condition":{"type":"if","expression":"x","cases":[{"value":true,"next_step":"ghost"}]}}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownReference { .. }));
    }

    #[test]
    fn test_rejects_agent_without_agent_id() {
        let json = r#"{"start_step":"a","steps":[{"id":"a","type":"agent","task":"t"}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(err.to_string().contains("no agent_id"), "got: {err}");
    }

    #[test]
    fn test_rejects_condition_step_without_condition() {
        let json = r#"{"start_step":"c","steps":[{"id":"c","type":"condition"}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(err.to_string().contains("no condition"), "got: {err}");
    }

    #[test]
    fn test_rejects_malformed_expression() {
        let json = r#"{"start_step":"c","steps":[
            {"id":"c","type":"condition","condition":{"type":"if","expression":"a == b == c"}}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(matches!(err, DefinitionError::MalformedCondition { ref step, .. } if step == "c"));
    }

    #[test]
    fn test_rejects_nested_parallel() {
        let json = r#"{"start_step":"outer","steps":[
            {"id":"outer","type":"parallel","parallel":["inner"]},
            {"id":"inner","type":"parallel","parallel":["a"]},
            {"id":"a","type":"script","script":"x"}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(err.to_string().contains("nests parallel"), "got: {err}");
    }

    #[test]
    fn test_rejects_unconditional_cycle() {
        let json = r#"{"start_step":"a","steps":[
            {"id":"a","type":"script","script":"x","next_steps":["b"]},
            {"id":"b","type":"script","script":"y","next_steps":["a"]}]}"#;
        let err = parse_definition_json(json).unwrap_err();
        assert!(matches!(err, DefinitionError::Cycle(_)), "got: {err}");
    }

    #[test]
    fn test_conditional_cycle_is_reported_not_rejected() {
        let json = r#"{"start_step":"poll","steps":[
            {"id":"poll","type":"script","script":"return 1","next_steps":["check"]},
            {"id":"check","type":"condition","condition":{"type":"if","expression":"ready",
                "cases":[{"value":true,"next_step":"done"}],"default":"poll"}},
            {"id":"done","type":"script","script":"return 2"}]}"#;
        let def: WorkflowDefinition = serde_json::from_str(json).unwrap();
        let report = validate_definition(&def).unwrap();
        assert_eq!(report.conditional_cycles.len(), 1);
        let mut cycle = report.conditional_cycles[0].clone();
        cycle.sort();
        assert_eq!(cycle, vec!["check".to_string(), "poll".to_string()]);
    }

    #[test]
    fn test_load_definition_by_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let yaml_path = tmp.path().join("wf.yaml");
        std::fs::write(&yaml_path, VALID).unwrap();
        assert_eq!(load_definition(&yaml_path).unwrap().steps.len(), 6);

        let json_path = tmp.path().join("wf.json");
        std::fs::write(
            &json_path,
            r#"{"start_step":"a","steps":[{"id":"a","type":"script","script":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(load_definition(&json_path).unwrap().steps.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_definition(Path::new("/nonexistent/wf.yaml")).unwrap_err();
        assert!(matches!(err, DefinitionError::Io(_)));
    }
}
