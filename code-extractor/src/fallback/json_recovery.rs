//! Two-stage decoding of model output: strict, then one tolerant retry.

use serde_json::{Map, Value};

/// Which stage produced the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    Strict,
    Substring,
}

/// Decodes `raw` as a JSON object. When the whole text is not one, strips
/// Markdown fences and decodes the span from the first `{` to the last `}`
/// once. Anything that is not an object counts as a failure.
pub fn decode_object(raw: &str) -> Option<(Map<String, Value>, Recovery)> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim()) {
        return Some((map, Recovery::Strict));
    }
    let unfenced = strip_fences(raw);
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&unfenced[start..=end]) {
        Ok(Value::Object(map)) => Some((map, Recovery::Substring)),
        _ => None,
    }
}

fn strip_fences(raw: &str) -> String {
    raw.lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}
