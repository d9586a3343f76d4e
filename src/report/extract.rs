//! Best-effort extraction of a JSON object from free-form model output.

use serde_json::{Map, Value};

/// Result of looking for a JSON object in a model response.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtraction {
    /// A brace-delimited object was found and parsed.
    Parsed(Map<String, Value>),
    /// Something brace-delimited was found but it is not a JSON object.
    Unparseable { fragment: String, error: String },
    /// No `{ … }` span at all.
    NotFound,
}

/// Span from the first `{` to the last `}` (greedy, newlines included).
pub(crate) fn find_object_span(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

/// Extract and parse the JSON object embedded in `response`.
///
/// Commentary before or after the object (and markdown fences) is ignored
/// because only the outermost brace span is considered.
pub fn extract_json_object(response: &str) -> JsonExtraction {
    let Some(fragment) = find_object_span(response) else {
        return JsonExtraction::NotFound;
    };

    match serde_json::from_str::<Value>(fragment) {
        Ok(Value::Object(map)) => JsonExtraction::Parsed(map),
        Ok(other) => JsonExtraction::Unparseable {
            fragment: fragment.to_string(),
            error: format!("expected a JSON object, got {}", json_kind(&other)),
        },
        Err(e) => JsonExtraction::Unparseable {
            fragment: fragment.to_string(),
            error: e.to_string(),
        },
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
