//! Next-step and condition resolution.
//!
//! Both functions are pure: the same step and data always produce the same
//! successor id. An empty string means the run has reached its end.

use serde_json::{Map, Value};
use stepweave_types::workflow::{ConditionKind, WorkflowCondition, WorkflowStep};

use super::context::value_to_string;
use super::expression::{self, ExpressionError};

/// Pick the step to run after `step`.
///
/// Order of precedence: the step's condition, then the first `next_steps`
/// entry, then (for parallel groups) the first member id.
pub fn resolve_next_step(
    step: &WorkflowStep,
    data: &Map<String, Value>,
) -> Result<String, ExpressionError> {
    if let Some(condition) = &step.condition {
        return resolve_condition(condition, data);
    }
    if let Some(first) = step.next_steps.first() {
        return Ok(first.clone());
    }
    if let Some(first) = step.parallel_members().and_then(|m| m.first()) {
        return Ok(first.clone());
    }
    Ok(String::new())
}

/// Route through an `if` or `switch` condition.
///
/// An empty expression routes straight to `default`.
pub fn resolve_condition(
    condition: &WorkflowCondition,
    data: &Map<String, Value>,
) -> Result<String, ExpressionError> {
    if condition.expression.trim().is_empty() {
        return Ok(condition.default.clone());
    }

    let value = expression::evaluate(&condition.expression, data)?;

    let next = match condition.kind {
        ConditionKind::If => match condition.cases.first() {
            Some(first) if expression::is_truthy(&value) => first.next_step.clone(),
            _ => condition.default.clone(),
        },
        ConditionKind::Switch => condition
            .cases
            .iter()
            .find(|c| same_value(&c.value, &value))
            .or_else(|| {
                let wanted = value_to_string(&value);
                condition
                    .cases
                    .iter()
                    .find(|c| value_to_string(&c.value) == wanted)
            })
            .map_or_else(|| condition.default.clone(), |c| c.next_step.clone()),
    };

    tracing::debug!(
        expression = %condition.expression,
        kind = ?condition.kind,
        next = %next,
        "condition resolved"
    );
    Ok(next)
}

/// Structural equality, except that numbers compare by value (`1 == 1.0`).
fn same_value(case: &Value, value: &Value) -> bool {
    match (case, value) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => case == value,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
