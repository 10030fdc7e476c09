//! The data context threaded through a workflow run.
//!
//! `DataContext` is the mutable key/value working set. It starts as the
//! execution input, absorbs every step result, feeds `{{key}}` template
//! interpolation and is what condition expressions are evaluated against.
//!
//! Only the engine's coordinating path mutates it. Parallel members receive
//! an immutable [`DataContext::snapshot`].

use std::sync::Arc;

use serde_json::{Map, Value};

/// Mutable execution data shared by all steps of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataContext {
    values: Map<String, Value>,
}

impl DataContext {
    pub fn new(input: Map<String, Value>) -> Self {
        Self { values: input }
    }

    /// Merge a step result into the context.
    ///
    /// Object results are merged key by key (last write wins). Any other
    /// value is stored under `{step_id}_result`.
    pub fn merge_result(&mut self, step_id: &str, result: &Value) {
        match result {
            Value::Object(entries) => {
                for (key, value) in entries {
                    self.values.insert(key.clone(), value.clone());
                }
            }
            other => {
                self.values.insert(result_key(step_id), other.clone());
            }
        }
    }

    /// Substitute `{{key}}` placeholders from the context.
    ///
    /// Keys may be dot paths (`{{table.name}}`) and may carry surrounding
    /// whitespace. Placeholders that do not resolve are left verbatim.
    pub fn interpolate(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("{{") {
            let Some(len) = rest[start + 2..].find("}}") else {
                break;
            };
            let end = start + 2 + len;
            let key = rest[start + 2..end].trim();

            out.push_str(&rest[..start]);
            match self.get(key) {
                Some(value) if !key.is_empty() => out.push_str(&value_to_string(value)),
                _ => out.push_str(&rest[start..end + 2]),
            }
            rest = &rest[end + 2..];
        }

        out.push_str(rest);
        out
    }

    /// Dot-path lookup.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        lookup_path(&self.values, segments.as_slice())
    }

    /// Immutable copy handed to concurrently running steps.
    pub fn snapshot(&self) -> Arc<DataContext> {
        Arc::new(self.clone())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
}

/// Key under which non-object results are stored.
pub fn result_key(step_id: &str) -> String {
    format!("{step_id}_result")
}

/// Walk `segments` through nested objects. `None` if any segment is missing
/// or an intermediate value is not an object.
pub fn lookup_path<'a, S: AsRef<str>>(
    root: &'a Map<String, Value>,
    segments: &[S],
) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = root.get(first.as_ref())?;
    for segment in rest {
        current = current.as_object()?.get(segment.as_ref())?;
    }
    Some(current)
}

/// Convert a JSON value to a display string for templates and comparisons.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        // For objects/arrays, return compact JSON
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
