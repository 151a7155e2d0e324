use std::sync::Once;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{StreamExt, TryStreamExt};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::config::{BackendConfig, ServerConfig};
use crate::error::GatewayError;
use crate::util::truncate_for_log;

use super::{BackendInput, BackendReply, BackendStreamFrame, InferenceBackend};

static RUSTLS_PROVIDER_INIT: Once = Once::new();
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_BODY_EXCERPT_CHARS: usize = 512;

/// Inference backend reached over a REST endpoint of the form
/// `POST {base_url}/{model}`.
///
/// Event-stream and NDJSON bodies are handed back as raw byte streams;
/// everything else is parsed as JSON.
pub struct HttpBackend {
    id: String,
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Build the backend with one pooled client.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] when the HTTP client cannot be built.
    pub fn new(backend: &BackendConfig, server: &ServerConfig) -> Result<Self, GatewayError> {
        RUSTLS_PROVIDER_INIT.call_once(|| {
            let _ = rustls::crypto::ring::default_provider().install_default();
        });

        let client = reqwest::Client::builder()
            .tcp_nodelay(true)
            .connect_timeout(CONNECT_TIMEOUT)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(server.timeout))
            .build()
            .map_err(|err| GatewayError::Internal(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            id: backend.id.clone(),
            base_url: backend.base_url.trim_end_matches('/').to_string(),
            api_token: backend
                .api_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_owned),
            client,
        })
    }

    fn endpoint(&self, model: &str) -> Result<url::Url, GatewayError> {
        let raw = format!("{}/{}", self.base_url, model.trim_start_matches('/'));
        url::Url::parse(&raw)
            .map_err(|err| GatewayError::Backend(format!("Invalid backend URL '{raw}': {err}")))
    }

    async fn execute(&self, model: &str, input: BackendInput) -> Result<BackendReply, GatewayError> {
        let url = self.endpoint(model)?;
        let accept = if input.stream {
            "text/event-stream, application/json"
        } else {
            "application/json"
        };
        let body = serde_json::to_vec(&input).map_err(|err| {
            GatewayError::Internal(format!("Failed to encode backend input: {err}"))
        })?;
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept)
            .body(body);
        if let Some(token) = self.api_token.as_deref() {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|err| GatewayError::Backend(format!("Backend request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Backend(backend_error_message(status, &body)));
        }

        if is_streaming_content_type(response.headers()) {
            let frames = response
                .bytes_stream()
                .map_ok(BackendStreamFrame::Bytes)
                .map_err(|err| GatewayError::Stream(format!("Backend stream read failed: {err}")))
                .boxed();
            return Ok(BackendReply::Stream(frames));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Backend(format!("Backend body read failed: {err}")))?;
        let value = serde_json::from_slice::<Value>(&body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
        Ok(BackendReply::Json(value))
    }
}

impl InferenceBackend for HttpBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn run<'a>(
        &'a self,
        model: &'a str,
        input: BackendInput,
    ) -> BoxFuture<'a, Result<BackendReply, GatewayError>> {
        Box::pin(self.execute(model, input))
    }
}

fn is_streaming_content_type(headers: &http::HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            let value = value.to_ascii_lowercase();
            value.starts_with("text/event-stream") || value.starts_with("application/x-ndjson")
        })
}

/// Prefer the backend's own error message when its error body is JSON.
fn backend_error_message(status: http::StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| json_error_detail(&value))
        .unwrap_or_else(|| truncate_for_log(body.trim(), ERROR_BODY_EXCERPT_CHARS));
    if detail.is_empty() {
        format!("backend returned status {}", status.as_u16())
    } else {
        format!("backend returned status {}: {detail}", status.as_u16())
    }
}

fn json_error_detail(value: &Value) -> Option<String> {
    let from_errors = value
        .get("errors")
        .and_then(|errors| errors.get(0))
        .and_then(|first| first.get("message"))
        .and_then(Value::as_str);
    let from_error = value.get("error").and_then(|error| {
        error
            .as_str()
            .or_else(|| error.get("message").and_then(Value::as_str))
    });
    from_errors.or(from_error).map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streaming_content_types() {
        let mut headers = http::HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/event-stream; charset=utf-8".parse().unwrap());
        assert!(is_streaming_content_type(&headers));
        headers.insert(CONTENT_TYPE, "application/x-ndjson".parse().unwrap());
        assert!(is_streaming_content_type(&headers));
        headers.insert(CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(!is_streaming_content_type(&headers));
        assert!(!is_streaming_content_type(&http::HeaderMap::new()));
    }

    #[test]
    fn test_backend_error_message_prefers_json_detail() {
        let message = backend_error_message(
            http::StatusCode::BAD_REQUEST,
            r#"{"success":false,"errors":[{"code":5006,"message":"model not found"}]}"#,
        );
        assert_eq!(message, "backend returned status 400: model not found");

        let message = backend_error_message(
            http::StatusCode::TOO_MANY_REQUESTS,
            r#"{"error":{"message":"slow down"}}"#,
        );
        assert_eq!(message, "backend returned status 429: slow down");
    }

    #[test]
    fn test_backend_error_message_plain_body() {
        let message = backend_error_message(http::StatusCode::BAD_GATEWAY, "  upstream down \n");
        assert_eq!(message, "backend returned status 502: upstream down");
        let message = backend_error_message(http::StatusCode::INTERNAL_SERVER_ERROR, "");
        assert_eq!(message, "backend returned status 500");
    }

    #[test]
    fn test_endpoint_joins_model_path() {
        let backend = HttpBackend::new(
            &BackendConfig {
                id: "workers-ai".into(),
                base_url: "https://api.example.com/ai/run/".into(),
                api_token: Some("  ".into()),
            },
            &ServerConfig::default(),
        )
        .unwrap();
        assert!(backend.api_token.is_none());
        let url = backend.endpoint("@cf/meta/llama-3.1-8b-instruct").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/ai/run/@cf/meta/llama-3.1-8b-instruct"
        );
    }
}
