//! Parameter coercion performed before use-case invocation.
//!
//! Agents send parameters in whatever shape their harness produces:
//! JSON-array strings, comma-separated lists, stringly booleans and
//! integers. The dispatcher normalises all of that here, once, so the
//! typed parameter structs can use `deny_unknown_fields` deserialisation.

use serde_json::{Map, Value};

use strata_core::{OrchestratorError, Result};

/// Boolean-typed fields across all tools
const BOOL_FIELDS: &[&str] = &[
    "include_context",
    "include_dependencies",
    "include_inherited",
    "force_refresh",
    "propagate",
    "inheritance_disabled",
    "force_local_only",
    "apply",
];

/// List-of-string fields across all tools
const LIST_FIELDS: &[&str] = &[
    "assignees",
    "labels",
    "dependencies",
    "capabilities",
    "insights_found",
    "blockers",
];

/// Coerce `limit` to an integer in 1..=100. Integer-valued strings are
/// accepted; floats and out-of-range values are rejected.
pub fn coerce_limit(value: &Value) -> Result<u32> {
    let rejected = |actual: String| OrchestratorError::InvalidFormat {
        field: "limit".to_string(),
        expected: "integer in 1..=100".to_string(),
        actual,
    };

    let number = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else {
                return Err(rejected(n.to_string()));
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| rejected(format!("\"{s}\"")))?,
        other => return Err(rejected(other.to_string())),
    };

    if (1..=100).contains(&number) {
        Ok(number as u32)
    } else {
        Err(rejected(number.to_string()))
    }
}

/// Coerce a boolean field. Unrecognised values default to `false` with a
/// warning rather than failing the request.
pub fn coerce_bool(field: &str, value: &Value) -> (bool, Option<String>) {
    match value {
        Value::Bool(b) => (*b, None),
        Value::Number(n) => match n.as_i64() {
            Some(0) => (false, None),
            Some(1) => (true, None),
            _ => (
                false,
                Some(format!("'{field}' = {n} is not a boolean; defaulting to false")),
            ),
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" | "enabled" => (true, None),
            "false" | "0" | "no" | "off" | "disabled" => (false, None),
            other => (
                false,
                Some(format!("'{field}' = \"{other}\" is not a boolean; defaulting to false")),
            ),
        },
        other => (
            false,
            Some(format!("'{field}' = {other} is not a boolean; defaulting to false")),
        ),
    }
}

/// Coerce a list parameter: a JSON array of strings, a JSON-array string,
/// a comma-separated string, or a bare string
pub fn coerce_string_list(field: &str, value: &Value) -> Result<Vec<String>> {
    let rejected = |actual: String| OrchestratorError::InvalidFormat {
        field: field.to_string(),
        expected: "list of strings, JSON-array string, or comma-separated string".to_string(),
        actual,
    };

    match value {
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.trim().to_string()),
                other => Err(rejected(other.to_string())),
            })
            .collect(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Vec::new());
            }
            if trimmed.starts_with('[') {
                let parsed: Value = serde_json::from_str(trimmed)
                    .map_err(|_| rejected(format!("\"{trimmed}\"")))?;
                return coerce_string_list(field, &parsed);
            }
            Ok(trimmed
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect())
        }
        other => Err(rejected(other.to_string())),
    }
}

/// Normalise a raw parameter object in place. Returns warnings from lenient
/// boolean coercion; hard failures abort with `INVALID_FORMAT`.
pub fn normalize_params(params: &mut Map<String, Value>) -> Result<Vec<String>> {
    let mut warnings = Vec::new();

    if let Some(limit) = params.get("limit") {
        if !limit.is_null() {
            let coerced = coerce_limit(limit)?;
            params.insert("limit".to_string(), Value::from(coerced));
        }
    }

    for field in BOOL_FIELDS {
        if let Some(value) = params.get(*field) {
            if value.is_null() {
                continue;
            }
            let (coerced, warning) = coerce_bool(field, value);
            params.insert(field.to_string(), Value::Bool(coerced));
            warnings.extend(warning);
        }
    }

    for field in LIST_FIELDS {
        if let Some(value) = params.get(*field) {
            if value.is_null() {
                continue;
            }
            let coerced = coerce_string_list(field, value)?;
            params.insert(
                field.to_string(),
                Value::Array(coerced.into_iter().map(Value::String).collect()),
            );
        }
    }

    Ok(warnings)
}
