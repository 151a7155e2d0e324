use serde_json::{Map, Value};

use crate::protocol::openai_chat::Usage;

const PROMPT_KEYS: [&str; 4] = [
    "prompt_tokens",
    "input_tokens",
    "promptTokens",
    "inputTokens",
];
const COMPLETION_KEYS: [&str; 4] = [
    "completion_tokens",
    "output_tokens",
    "completionTokens",
    "outputTokens",
];
const TOTAL_KEYS: [&str; 2] = ["total_tokens", "totalTokens"];

/// Counts found at one location; `None` means the quantity was absent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct PartialUsage {
    prompt: Option<u64>,
    completion: Option<u64>,
    total: Option<u64>,
}

impl PartialUsage {
    fn is_empty(self) -> bool {
        self.prompt.is_none() && self.completion.is_none() && self.total.is_none()
    }

    fn into_usage(self) -> Usage {
        let total = self.total.or_else(|| match (self.prompt, self.completion) {
            (Some(prompt), Some(completion)) => Some(prompt.saturating_add(completion)),
            _ => None,
        });
        Usage {
            prompt_tokens: self.prompt.unwrap_or(0),
            completion_tokens: self.completion.unwrap_or(0),
            total_tokens: total.unwrap_or(0),
        }
    }
}

/// Recover token counts from an arbitrary backend result.
///
/// Locations are searched in order (the result itself, its `usage`, a nested
/// `result`, and that container's `usage`); the first location reporting any
/// count wins outright. Returns all zeros when nothing is found.
#[must_use]
pub fn extract_usage(result: &Value) -> Usage {
    let nested = result.get("result");
    let locations = [
        Some(result),
        result.get("usage"),
        nested,
        nested.and_then(|inner| inner.get("usage")),
    ];

    locations
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .map(read_location)
        .find(|partial| !partial.is_empty())
        .map(PartialUsage::into_usage)
        .unwrap_or_default()
}

fn read_location(fields: &Map<String, Value>) -> PartialUsage {
    PartialUsage {
        prompt: first_count(fields, &PROMPT_KEYS),
        completion: first_count(fields, &COMPLETION_KEYS),
        total: first_count(fields, &TOTAL_KEYS),
    }
}

fn first_count(fields: &Map<String, Value>, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(coerce_count))
}

/// Accept finite numbers and strings that parse to finite numbers.
fn coerce_count(value: &Value) -> Option<u64> {
    if let Some(count) = value.as_u64() {
        return Some(count);
    }
    let number = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(raw) => raw.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(float_to_count(number))
}

#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn float_to_count(number: f64) -> u64 {
    // Float-to-int `as` saturates; negatives clamp to zero.
    number.max(0.0).floor() as u64
}
