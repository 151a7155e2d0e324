use std::convert::Infallible;
use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

const DEFAULT_BACKEND_PORT: u16 = 19_002;
const RUN_PATH_PREFIX: &str = "/ai/run/";

#[derive(Copy, Clone)]
enum MockMode {
    Nonstream,
    Stream,
}

/// Reply shape served by the mock.
#[derive(Copy, Clone)]
enum MockScenario {
    /// `{"result":{"response":...}}` / SSE `{"response":...}` events.
    Text,
    /// `output[]` arrays / `OpenAI`-style `choices[].delta` events.
    Openai,
    /// Newline-delimited JSON stream.
    Ndjson,
    Error,
}

struct MockState {
    mode: MockMode,
    scenario: MockScenario,
    requests: AtomicU64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let port = env_u16("BACKEND_PORT", DEFAULT_BACKEND_PORT);
    let state = Arc::new(MockState {
        mode: parse_mode(),
        scenario: parse_scenario(),
        requests: AtomicU64::new(0),
    });

    let listener = TcpListener::bind(("127.0.0.1", port))
        .await
        .unwrap_or_else(|err| panic!("failed to bind mock backend on 127.0.0.1:{port}: {err}"));
    let conn_builder = AutoBuilder::new(TokioExecutor::new());

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                eprintln!("accept error: {err}");
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let service_state = Arc::clone(&state);
        let service = service_fn(move |request: Request<Incoming>| {
            let state_ref = Arc::clone(&service_state);
            async move { Ok::<_, Infallible>(handle_request(request, &state_ref).await) }
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, service).await {
                eprintln!("mock backend connection error from {remote_addr}: {err}");
            }
        });
    }
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(default)
}

fn parse_mode() -> MockMode {
    match env::var("MOCK_MODE").as_deref() {
        Ok("stream") => MockMode::Stream,
        Ok("nonstream") | Err(_) => MockMode::Nonstream,
        Ok(other) => {
            eprintln!("unknown MOCK_MODE '{other}', fallback to nonstream");
            MockMode::Nonstream
        }
    }
}

fn parse_scenario() -> MockScenario {
    match env::var("MOCK_SCENARIO").as_deref() {
        Ok("openai") => MockScenario::Openai,
        Ok("ndjson") => MockScenario::Ndjson,
        Ok("error") => MockScenario::Error,
        Ok("text") | Err(_) => MockScenario::Text,
        Ok(other) => {
            eprintln!("unknown MOCK_SCENARIO '{other}', fallback to text");
            MockScenario::Text
        }
    }
}

async fn handle_request(request: Request<Incoming>, state: &MockState) -> Response<Full<Bytes>> {
    let (parts, body) = request.into_parts();
    let body = read_request_body(body).await;

    let path = parts.uri.path();
    if parts.method == Method::GET && path == "/_mock/stats" {
        let count = state.requests.load(Ordering::Relaxed);
        return simple_response(
            StatusCode::OK,
            "application/json",
            Bytes::from(format!("{{\"requests\":{count}}}")),
        );
    }
    if parts.method != Method::POST {
        return simple_response_static(
            StatusCode::METHOD_NOT_ALLOWED,
            "application/json",
            br#"{"success":false,"errors":[{"code":405,"message":"method not allowed"}]}"#,
        );
    }
    if path.strip_prefix(RUN_PATH_PREFIX).is_none_or(str::is_empty) {
        return simple_response_static(
            StatusCode::NOT_FOUND,
            "application/json",
            br#"{"success":false,"errors":[{"code":7003,"message":"no route for that URI"}]}"#,
        );
    }
    state.requests.fetch_add(1, Ordering::Relaxed);

    if matches!(state.scenario, MockScenario::Error) {
        return simple_response_static(
            StatusCode::SERVICE_UNAVAILABLE,
            "application/json",
            br#"{"success":false,"errors":[{"code":3040,"message":"capacity temporarily exceeded"}]}"#,
        );
    }

    // Honour the gateway's stream flag unless the mode forces streaming.
    let wants_stream = body
        .windows(STREAM_FLAG.len())
        .any(|window| window == STREAM_FLAG);
    if wants_stream || matches!(state.mode, MockMode::Stream) {
        streaming_response(state.scenario)
    } else {
        non_streaming_response(state.scenario)
    }
}

const STREAM_FLAG: &[u8] = br#""stream":true"#;

async fn read_request_body(body: Incoming) -> Bytes {
    match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    }
}

fn non_streaming_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    let body = match scenario {
        MockScenario::Text | MockScenario::Ndjson => RESULT_RESPONSE_NONSTREAM,
        MockScenario::Openai => OUTPUT_ARRAY_NONSTREAM,
        MockScenario::Error => br#"{"success":false}"#,
    };
    simple_response_static(StatusCode::OK, "application/json", body)
}

fn streaming_response(scenario: MockScenario) -> Response<Full<Bytes>> {
    let (content_type, body) = match scenario {
        MockScenario::Text => ("text/event-stream", RESPONSE_EVENTS_STREAM),
        MockScenario::Openai => ("text/event-stream", OPENAI_DELTA_STREAM),
        MockScenario::Ndjson => ("application/x-ndjson", NDJSON_STREAM),
        MockScenario::Error => ("text/event-stream", b"data: {\"error\":\"mock\"}\n\n" as &[u8]),
    };
    let mut response = simple_response_static(StatusCode::OK, content_type, body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response
}

fn simple_response(
    status: StatusCode,
    content_type: &'static str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn simple_response_static(
    status: StatusCode,
    content_type: &'static str,
    body: &'static [u8],
) -> Response<Full<Bytes>> {
    simple_response(status, content_type, Bytes::from_static(body))
}

const RESULT_RESPONSE_NONSTREAM: &[u8] = br#"{"result":{"response":"ok","usage":{"prompt_tokens":12,"completion_tokens":1,"total_tokens":13}},"success":true,"errors":[],"messages":[]}"#;
const OUTPUT_ARRAY_NONSTREAM: &[u8] = br#"{"output":[{"type":"message","content":[{"type":"output_text","text":"o"}]},{"text":"k"}],"usage":{"input_tokens":"12","output_tokens":"1"}}"#;
const RESPONSE_EVENTS_STREAM: &[u8] = b"data: {\"response\":\"o\",\"p\":\"abc\"}\n\ndata: {\"response\":\"k\"}\n\ndata: {\"response\":\"\",\"usage\":{\"prompt_tokens\":12,\"completion_tokens\":2,\"total_tokens\":14}}\n\ndata: [DONE]\n\n";
const OPENAI_DELTA_STREAM: &[u8] = b"data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"o\"}}]}\r\n\r\ndata: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"k\"},\"finish_reason\":\"stop\"}]}\r\n\r\ndata: [DONE]\r\n\r\n";
const NDJSON_STREAM: &[u8] = b"{\"response\":\"o\"}\n{\"response\":\"k\"}\n";
