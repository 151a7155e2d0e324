use std::sync::Arc;

use bytes::Bytes;

use crate::auth::{authenticate, build_client_token, ClientToken};
use crate::backend::InferenceBackend;
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::protocol::openai_chat::response_encoder::build_model_list;

/// Shared, read-only application state accessible to all handlers.
pub struct AppState {
    pub config: AppConfig,
    backend: Arc<dyn InferenceBackend>,
    client_token: ClientToken,
    models_response_body: Bytes,
}

impl AppState {
    /// Build the state once at startup.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the model listing cannot be
    /// serialized.
    pub fn new(config: AppConfig, backend: Arc<dyn InferenceBackend>) -> Result<Self, GatewayError> {
        let client_token = build_client_token(&config);
        let models = build_model_list(
            config.models.allowed.iter().map(String::as_str),
            backend.id(),
        );
        let models_response_body = serde_json::to_vec(&models)
            .map(Bytes::from)
            .map_err(|err| GatewayError::Internal(format!("Failed to encode model list: {err}")))?;

        Ok(Self {
            config,
            backend,
            client_token,
            models_response_body,
        })
    }

    /// Authenticate a request against the configured client token.
    ///
    /// # Errors
    ///
    /// See [`crate::auth::authenticate`].
    pub fn authenticate(&self, headers: &http::HeaderMap) -> Result<(), GatewayError> {
        authenticate(headers, &self.client_token)
    }

    /// Whether a client token is configured; without one every request fails.
    #[must_use]
    pub fn auth_configured(&self) -> bool {
        self.client_token.is_configured()
    }

    #[must_use]
    pub fn backend(&self) -> &dyn InferenceBackend {
        self.backend.as_ref()
    }

    #[must_use]
    pub fn default_model(&self) -> &str {
        &self.config.models.default
    }

    /// Pre-serialized `/v1/models` body.
    #[must_use]
    pub fn models_response_body(&self) -> Bytes {
        self.models_response_body.clone()
    }
}
