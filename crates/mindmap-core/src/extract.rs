//! Best-effort recovery of a JSON object from free-form model output.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse a JSON object out of `text`.
///
/// Tries the whole (trimmed) text first, then the span from the first `{`
/// to the last `}`. Returns `None` when neither yields an object.
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// [`extract_json`] followed by a typed conversion.
pub fn extract_as<T: DeserializeOwned>(text: &str) -> Option<T> {
    extract_json(text).and_then(|value| serde_json::from_value(value).ok())
}
