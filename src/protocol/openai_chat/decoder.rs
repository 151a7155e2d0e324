use serde::Deserialize;
use serde_json::Value;

use crate::error::GatewayError;

use super::{ChatMessage, CompletionRequest, Role};

/// Raw request body. `messages` stays untyped so validation can name the
/// offending entry instead of surfacing a serde path.
#[derive(Debug, Deserialize)]
struct ChatRequestWire {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    messages: Option<Value>,
    #[serde(default)]
    stream: Option<bool>,
}

/// Decode and validate a `/v1/chat/completions` body.
///
/// Validation order: the body must be JSON, `messages` must be a non-empty
/// array, and each message needs a non-blank string `content` and a known
/// `role`. A blank or missing `model` falls back to `default_model`.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] on the first violated rule.
pub fn decode_chat_request(
    body: &[u8],
    default_model: &str,
) -> Result<CompletionRequest, GatewayError> {
    let wire: ChatRequestWire = serde_json::from_slice(body).map_err(|e| {
        GatewayError::InvalidRequest(format!("Invalid chat completion request body: {e}"))
    })?;

    let messages = match wire.messages {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => {
            return Err(GatewayError::InvalidRequest(
                "messages must be a non-empty array".to_string(),
            ))
        }
    };

    let messages = messages
        .into_iter()
        .enumerate()
        .map(|(index, raw)| decode_message(index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    let model = match wire.model {
        Some(model) if !model.trim().is_empty() => model,
        _ => default_model.to_string(),
    };

    Ok(CompletionRequest {
        model,
        messages,
        stream: wire.stream.unwrap_or(false),
    })
}

fn decode_message(index: usize, raw: Value) -> Result<ChatMessage, GatewayError> {
    let Value::Object(mut fields) = raw else {
        return Err(GatewayError::InvalidRequest(format!(
            "messages[{index}] must be an object"
        )));
    };

    let content = match fields.remove("content") {
        Some(Value::String(content)) if !content.trim().is_empty() => content,
        _ => {
            return Err(GatewayError::InvalidRequest(format!(
                "messages[{index}].content must be a non-empty string"
            )))
        }
    };

    let role = match fields.get("role") {
        Some(Value::String(role)) => Role::parse(role).ok_or_else(|| {
            GatewayError::InvalidRequest(format!(
                "messages[{index}].role '{role}' is not supported"
            ))
        })?,
        _ => {
            return Err(GatewayError::InvalidRequest(format!(
                "messages[{index}].role is required"
            )))
        }
    };

    Ok(ChatMessage { role, content })
}
