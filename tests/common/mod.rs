#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use inference_gateway::backend::{
    BackendInput, BackendReply, BackendStreamFrame, InferenceBackend,
};
use inference_gateway::config::{
    AppConfig, BackendConfig, ClientAuthConfig, FeaturesConfig, ModelsConfig, ServerConfig,
};
use inference_gateway::error::GatewayError;
use inference_gateway::routing::dispatch::dispatch_request;
use inference_gateway::state::AppState;

pub const CLIENT_TOKEN: &str = "client-token";

/// What the scripted backend answers with.
#[derive(Clone)]
pub enum Script {
    Json(serde_json::Value),
    Frames {
        frames: Vec<BackendStreamFrame>,
        fail_with: Option<String>,
    },
    Fail(String),
}

pub struct ScriptedBackend {
    script: Script,
    calls: AtomicUsize,
    last_call: Mutex<Option<(String, BackendInput)>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_call(&self) -> Option<(String, BackendInput)> {
        self.last_call.lock().expect("lock").clone()
    }
}

impl InferenceBackend for ScriptedBackend {
    fn id(&self) -> &str {
        "scripted"
    }

    fn run<'a>(
        &'a self,
        model: &'a str,
        input: BackendInput,
    ) -> BoxFuture<'a, Result<BackendReply, GatewayError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_call.lock().expect("lock") = Some((model.to_string(), input));
            match self.script.clone() {
                Script::Json(value) => Ok(BackendReply::Json(value)),
                Script::Fail(message) => Err(GatewayError::Backend(message)),
                Script::Frames { frames, fail_with } => {
                    let items: Vec<Result<BackendStreamFrame, GatewayError>> = frames
                        .into_iter()
                        .map(Ok)
                        .chain(fail_with.map(|message| Err(GatewayError::Stream(message))))
                        .collect();
                    Ok(BackendReply::Stream(futures_util::stream::iter(items).boxed()))
                }
            }
        })
    }
}

pub fn bytes_frames(chunks: &[&'static str]) -> Vec<BackendStreamFrame> {
    chunks
        .iter()
        .map(|chunk| BackendStreamFrame::Bytes(Bytes::from_static(chunk.as_bytes())))
        .collect()
}

pub fn test_config(token: Option<&str>) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        client_authentication: ClientAuthConfig {
            token: token.map(ToString::to_string),
        },
        backend: BackendConfig {
            id: "scripted".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            api_token: None,
        },
        models: ModelsConfig {
            default: "@cf/meta/llama-3.1-8b-instruct".to_string(),
            allowed: vec![
                "@cf/meta/llama-3.1-8b-instruct".to_string(),
                "@cf/mistral/mistral-7b-instruct-v0.1".to_string(),
            ],
        },
        features: FeaturesConfig::default(),
    }
}

pub fn build_state(backend: Arc<ScriptedBackend>, token: Option<&str>) -> Arc<AppState> {
    Arc::new(AppState::new(test_config(token), backend).expect("state"))
}

pub async fn send(
    state: Arc<AppState>,
    method: &str,
    uri: &str,
    authorization: Option<&str>,
    body: Body,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    let request = builder.body(body).expect("build request");
    dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch")
}

pub async fn post_chat(state: Arc<AppState>, payload: serde_json::Value) -> Response {
    let body = serde_json::to_vec(&payload).expect("serialize request");
    send(
        state,
        "POST",
        "/v1/chat/completions",
        Some(&format!("Bearer {CLIENT_TOKEN}")),
        Body::from(body),
    )
    .await
}

pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).expect("json payload")
}

/// Decode SSE output into its `data:` payloads.
pub fn sse_payloads(body: &[u8]) -> Vec<String> {
    std::str::from_utf8(body)
        .expect("utf8 body")
        .split("\n\n")
        .filter(|event| !event.is_empty())
        .map(|event| {
            event
                .strip_prefix("data: ")
                .expect("data prefix")
                .to_string()
        })
        .collect()
}
