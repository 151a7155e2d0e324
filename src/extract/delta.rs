use serde_json::Value;
use smallvec::SmallVec;

/// Text fragments recovered from one streamed backend frame.
pub type DeltaFragments = SmallVec<[String; 2]>;

const DIRECT_TEXT_KEYS: [&str; 3] = ["response", "output_text", "text"];

/// Collect the non-empty text deltas carried by one structured stream frame.
///
/// Per object, the first matching shape wins: a direct `response` /
/// `output_text` / `text` string, then `delta.content`, then every
/// `choices[].delta.content` or `choices[].text`. Arrays are searched
/// element by element and bare strings are deltas themselves.
#[must_use]
pub fn extract_deltas(frame: &Value) -> DeltaFragments {
    let mut out = DeltaFragments::new();
    collect_deltas(frame, &mut out);
    out
}

fn collect_deltas(value: &Value, out: &mut DeltaFragments) {
    match value {
        Value::String(text) => push_fragment(out, text),
        Value::Array(items) => {
            for item in items {
                collect_deltas(item, out);
            }
        }
        Value::Object(_) => collect_object_deltas(value, out),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn collect_object_deltas(object: &Value, out: &mut DeltaFragments) {
    if let Some(text) = DIRECT_TEXT_KEYS
        .iter()
        .find_map(|key| object.get(*key).and_then(Value::as_str))
    {
        push_fragment(out, text);
        return;
    }

    if let Some(text) = delta_content(object) {
        push_fragment(out, text);
        return;
    }

    if let Some(choices) = object.get("choices").and_then(Value::as_array) {
        for choice in choices {
            if let Some(text) = delta_content(choice).or_else(|| choice.get("text")?.as_str()) {
                push_fragment(out, text);
            }
        }
    }
}

#[inline]
fn delta_content(value: &Value) -> Option<&str> {
    value.get("delta")?.get("content")?.as_str()
}

#[inline]
fn push_fragment(out: &mut DeltaFragments, text: &str) {
    if !text.is_empty() {
        out.push(text.to_owned());
    }
}
