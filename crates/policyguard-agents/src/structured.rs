//! Tolerant extraction of JSON objects from model output
//!
//! Generation backends are asked for a bare JSON object but frequently wrap
//! it in a markdown fence or surround it with prose. Anything that does not
//! yield a JSON object is reported as [`ServiceError::Malformed`].

use policyguard_core::{ServiceError, ServiceResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// A parsed JSON object
pub type JsonObject = Map<String, Value>;

fn fence_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)```").expect("fence pattern is valid")
    })
}

/// Extract the first JSON object from raw model output
pub fn extract_json_object(raw: &str) -> ServiceResult<JsonObject> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::malformed("empty model output"));
    }

    let mut candidates = vec![trimmed];
    if let Some(captures) = fence_pattern().captures(trimmed) {
        if let Some(inner) = captures.get(1) {
            candidates.push(inner.as_str().trim());
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            candidates.push(&trimmed[start..=end]);
        }
    }

    for candidate in candidates {
        if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) {
            return Ok(object);
        }
    }

    Err(ServiceError::malformed(format!(
        "no JSON object in model output: {}",
        preview(trimmed)
    )))
}

/// String field, trimmed; `None` when absent, null, or not a string
pub fn field_str<'a>(object: &'a JsonObject, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).map(str::trim)
}

/// Boolean field, also accepting "yes"/"no"/"true"/"false" and 0/1
pub fn field_bool(object: &JsonObject, key: &str) -> Option<bool> {
    match object.get(key)? {
        Value::Bool(value) => Some(*value),
        Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Value::Number(number) => match number.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Numeric field, also accepting numeric strings
pub fn field_f32(object: &JsonObject, key: &str) -> Option<f32> {
    let value = match object.get(key)? {
        Value::Number(number) => number.as_f64()? as f32,
        Value::String(text) => text.trim().parse::<f32>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

/// List of strings; a lone string becomes a one-element list
pub fn field_string_list(object: &JsonObject, key: &str) -> Vec<String> {
    match object.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(text) => Some(text.trim().to_string()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            })
            .filter(|text| !text.is_empty())
            .collect(),
        Some(Value::String(text)) if !text.trim().is_empty() => vec![text.trim().to_string()],
        _ => Vec::new(),
    }
}

fn preview(text: &str) -> String {
    const MAX: usize = 80;
    if text.chars().count() <= MAX {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX).collect();
        format!("{}...", head)
    }
}
