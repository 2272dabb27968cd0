//! Masking of sensitive fields before anything reaches the audit trail.

use serde_json::{Map, Value};

/// Field names whose values never appear in an audit entry
pub const SENSITIVE_FIELDS: [&str; 4] = ["password", "passwordHash", "cpf", "token"];

pub const MASK: &str = "***";
pub const NESTED_PLACEHOLDER: &str = "[object]";

pub fn is_sensitive(field: &str) -> bool {
    SENSITIVE_FIELDS.contains(&field)
}

/// One-level summary of a write payload.
///
/// Sensitive fields are masked and nested objects or arrays collapse to a
/// placeholder. A list of records is summarized record by record. Scalars
/// have no summary.
pub fn summarize(value: &Value) -> Option<Value> {
    match value {
        Value::Object(map) => Some(Value::Object(summarize_object(map))),
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(map) => Value::Object(summarize_object(map)),
                    Value::Array(_) => Value::String(NESTED_PLACEHOLDER.to_string()),
                    scalar => scalar.clone(),
                })
                .collect(),
        )),
        _ => None,
    }
}

fn summarize_object(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| {
            let summarized = if is_sensitive(key) {
                Value::String(MASK.to_string())
            } else if value.is_object() || value.is_array() {
                Value::String(NESTED_PLACEHOLDER.to_string())
            } else {
                value.clone()
            };
            (key.clone(), summarized)
        })
        .collect()
}

/// Mask sensitive fields at any depth, keeping everything else.
pub fn mask_sensitive(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map.iter_mut() {
                if is_sensitive(key) {
                    *inner = Value::String(MASK.to_string());
                } else {
                    mask_sensitive(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_sensitive),
        _ => {}
    }
}
