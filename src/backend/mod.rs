//! Outbound boundary to the inference backend.
//!
//! Replies are untrusted: a JSON value of any shape, or a stream whose
//! frames may be raw bytes, ready-made text, or structured objects.
mod http_backend;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;
use crate::protocol::openai_chat::{ChatMessage, Role};

pub use http_backend::HttpBackend;

/// One read from a backend stream.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendStreamFrame {
    /// A ready-made text delta.
    Text(String),
    /// Raw transport bytes, possibly cutting through an event.
    Bytes(Bytes),
    /// An already-decoded structured frame.
    Json(Value),
}

pub type BackendStream = BoxStream<'static, Result<BackendStreamFrame, GatewayError>>;

/// What a backend hands back for one call.
pub enum BackendReply {
    Json(Value),
    Stream(BackendStream),
}

impl std::fmt::Debug for BackendReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendReply::Json(value) => f.debug_tuple("Json").field(value).finish(),
            BackendReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Input payload sent with every backend call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendInput {
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl BackendInput {
    /// Build the backend input for a validated request, optionally folding
    /// `developer` messages into `system` ones.
    #[must_use]
    pub fn new(messages: &[ChatMessage], stream: bool, convert_developer_to_system: bool) -> Self {
        let messages = messages
            .iter()
            .map(|message| {
                let role = if convert_developer_to_system && message.role == Role::Developer {
                    Role::System
                } else {
                    message.role
                };
                ChatMessage::new(role, message.content.clone())
            })
            .collect();
        Self { messages, stream }
    }
}

/// Capability that runs a model. Implementations must not retry.
pub trait InferenceBackend: Send + Sync {
    /// Identifier reported as `owned_by` in the model list.
    fn id(&self) -> &str;

    fn run<'a>(
        &'a self,
        model: &'a str,
        input: BackendInput,
    ) -> BoxFuture<'a, Result<BackendReply, GatewayError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_input_converts_developer_role() {
        let messages = vec![
            ChatMessage::new(Role::Developer, "rules"),
            ChatMessage::new(Role::User, "hi"),
        ];
        let input = BackendInput::new(&messages, false, true);
        assert_eq!(input.messages[0].role, Role::System);
        assert_eq!(input.messages[1].role, Role::User);

        let kept = BackendInput::new(&messages, false, false);
        assert_eq!(kept.messages[0].role, Role::Developer);
    }

    #[test]
    fn test_backend_input_wire_shape() {
        let messages = vec![ChatMessage::new(Role::User, "hi")];
        let plain = serde_json::to_value(BackendInput::new(&messages, false, true)).unwrap();
        assert_eq!(
            plain,
            serde_json::json!({"messages": [{"role": "user", "content": "hi"}]})
        );
        let streaming = serde_json::to_value(BackendInput::new(&messages, true, true)).unwrap();
        assert_eq!(streaming["stream"], true);
    }
}
