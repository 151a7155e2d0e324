use serde_json::Value;

/// One named accessor attempt over a backend result.
type TextCandidate = fn(&Value) -> Option<String>;

/// Ordered from the most specific backend shape to the most generic one.
const TEXT_CANDIDATES: &[TextCandidate] = &[
    bare_string,
    direct_response,
    nested_result,
    output_array,
    openai_choice_message,
];

/// Recover human-readable text from an arbitrary backend result.
///
/// Never fails: when no candidate shape matches, the whole value is
/// serialized verbatim and returned as the text.
#[must_use]
pub fn extract_text(result: &Value) -> String {
    text_candidate(result).unwrap_or_else(|| result.to_string())
}

/// Run the candidate search without the verbatim fallback.
#[must_use]
pub fn text_candidate(result: &Value) -> Option<String> {
    TEXT_CANDIDATES.iter().find_map(|candidate| candidate(result))
}

fn bare_string(result: &Value) -> Option<String> {
    result.as_str().map(str::to_owned)
}

fn direct_response(result: &Value) -> Option<String> {
    string_field(result, "response")
}

fn nested_result(result: &Value) -> Option<String> {
    let nested = result.get("result")?;
    string_field(nested, "response").or_else(|| string_field(nested, "output_text"))
}

fn output_array(result: &Value) -> Option<String> {
    let items = result.get("output")?.as_array()?;
    let mut joined = String::new();
    for item in items {
        push_output_item(item, &mut joined);
    }
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn push_output_item(item: &Value, out: &mut String) {
    match item {
        Value::String(text) => out.push_str(text),
        Value::Object(fields) => {
            if let Some(text) = fields.get("text").and_then(Value::as_str) {
                out.push_str(text);
            } else if let Some(parts) = fields.get("content").and_then(Value::as_array) {
                // Responses-style message items carry their text one level down.
                for part in parts {
                    if let Some(text) = part.get("text").and_then(Value::as_str) {
                        out.push_str(text);
                    }
                }
            }
        }
        _ => {}
    }
}

fn openai_choice_message(result: &Value) -> Option<String> {
    result
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_owned)
}

#[inline]
fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_owned)
}
