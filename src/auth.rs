use http::header::AUTHORIZATION;

use crate::config::AppConfig;
use crate::error::GatewayError;

const BEARER_PREFIX: &str = "Bearer ";

/// Pre-rendered client token used on the hot path.
#[derive(Debug, Clone)]
pub enum ClientToken {
    /// No token configured; every request is refused with a server error.
    Missing,
    /// Expected bearer token, already trimmed.
    Configured { token: Box<str> },
}

impl ClientToken {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        matches!(self, ClientToken::Configured { .. })
    }
}

/// Build the client token index from config.
#[must_use]
pub fn build_client_token(config: &AppConfig) -> ClientToken {
    match config
        .client_authentication
        .token
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        Some(token) => ClientToken::Configured {
            token: token.into(),
        },
        None => ClientToken::Missing,
    }
}

/// Extract the bearer token from `Authorization: Bearer <token>`.
#[must_use]
pub fn extract_bearer_token(headers: &http::HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
}

/// Authenticate an incoming request against the configured client token.
///
/// # Errors
///
/// Returns [`GatewayError::AuthNotConfigured`] when no token is configured,
/// and [`GatewayError::Unauthorized`] when the header is missing, not a
/// bearer credential, or does not match.
pub fn authenticate(headers: &http::HeaderMap, token: &ClientToken) -> Result<(), GatewayError> {
    let ClientToken::Configured { token: expected } = token else {
        return Err(GatewayError::AuthNotConfigured);
    };
    if !headers.contains_key(AUTHORIZATION) {
        return Err(GatewayError::Unauthorized("Missing API key".to_string()));
    }
    match extract_bearer_token(headers) {
        Some(presented) if presented == expected.as_ref() => Ok(()),
        _ => Err(GatewayError::Unauthorized("Invalid API key".to_string())),
    }
}
