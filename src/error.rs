use crate::protocol::error_shapes::{openai_error_payload, unauthorized_payload};

/// Error type shared by the request pipeline, the backend boundary and the
/// stream normalizer.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Server authentication token is not configured")]
    AuthNotConfigured,
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    ServerError,
}

impl GatewayError {
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            GatewayError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            GatewayError::Unauthorized(_) => ErrorCategory::Authentication,
            GatewayError::AuthNotConfigured
            | GatewayError::Backend(_)
            | GatewayError::Stream(_)
            | GatewayError::Internal(_) => ErrorCategory::ServerError,
        }
    }

    /// Message carried to the client, without the variant prefix.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::InvalidRequest(message)
            | GatewayError::Unauthorized(message)
            | GatewayError::Backend(message)
            | GatewayError::Stream(message)
            | GatewayError::Internal(message) => message.clone(),
            GatewayError::AuthNotConfigured => self.to_string(),
        }
    }
}

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::Authentication => http::StatusCode::UNAUTHORIZED,
        ErrorCategory::ServerError => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Format an error, returning (`status_code`, JSON body).
///
/// Authentication failures keep the bare `{"error":"Unauthorized"}` shape;
/// everything else uses the `OpenAI` error envelope.
#[must_use]
pub fn format_error(err: &GatewayError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    let body = match cat {
        ErrorCategory::Authentication => unauthorized_payload(),
        ErrorCategory::InvalidRequest | ErrorCategory::ServerError => {
            openai_error_payload(cat, &err.client_message())
        }
    };
    (status, body)
}

/// Convert a `GatewayError` into an axum response.
#[must_use]
pub fn into_axum_response(err: &GatewayError) -> axum::response::Response {
    use axum::response::IntoResponse;
    let (status, body) = format_error(err);
    (status, axum::Json(body)).into_response()
}

impl axum::response::IntoResponse for GatewayError {
    fn into_response(self) -> axum::response::Response {
        into_axum_response(&self)
    }
}
