//! `POST /v1/chat/completions`: request decoding and the completion
//! responder.
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::stream;

use crate::backend::{BackendInput, BackendReply};
use crate::error::{into_axum_response, GatewayError};
use crate::extract::{extract_text, extract_usage};
use crate::observability::{log_request_complete, log_stream_started};
use crate::protocol::openai_chat::decoder::decode_chat_request;
use crate::protocol::openai_chat::response_encoder::build_completion_response;
use crate::protocol::openai_chat::{CompletionRequest, Usage};
use crate::state::AppState;
use crate::stream::{collect_text, done_frame, normalize, ChunkFramer};
use crate::util::{generate_completion_id, unix_now_secs};

pub async fn handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = match decode_chat_request(&body, state.default_model()) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "rejecting chat completion request");
            return into_axum_response(&err);
        }
    };
    match respond(&state, request).await {
        Ok(response) => response,
        Err(err) => into_axum_response(&err),
    }
}

/// Run one validated request against the backend and shape the reply.
///
/// # Errors
///
/// Returns [`GatewayError::Backend`] when the backend call fails, or the
/// read error of a backend stream drained for a non-streaming request.
pub async fn respond(
    state: &AppState,
    request: CompletionRequest,
) -> Result<Response, GatewayError> {
    let start = Instant::now();
    let id = generate_completion_id();
    let input = BackendInput::new(
        &request.messages,
        request.stream,
        state.config.features.convert_developer_to_system,
    );

    tracing::debug!(
        response_id = %id,
        model = %request.model,
        messages = request.messages.len(),
        stream = request.stream,
        "dispatching to backend"
    );
    let reply = state
        .backend()
        .run(&request.model, input)
        .await
        .inspect_err(|err| {
            tracing::warn!(
                response_id = %id,
                model = %request.model,
                error = %err,
                "backend call failed"
            );
        })?;

    if request.stream {
        Ok(stream_response(id, &request.model, reply, start))
    } else {
        sync_response(id, &request.model, reply, start).await
    }
}

async fn sync_response(
    id: String,
    model: &str,
    reply: BackendReply,
    start: Instant,
) -> Result<Response, GatewayError> {
    let (content, usage) = match reply {
        BackendReply::Json(value) => (extract_text(&value), extract_usage(&value)),
        BackendReply::Stream(frames) => {
            tracing::debug!(
                response_id = %id,
                "backend streamed a non-streaming request, draining"
            );
            (collect_text(frames).await?, Usage::default())
        }
    };
    log_request_complete(model, &usage, start);
    let response = build_completion_response(id, unix_now_secs(), model, content, usage);
    Ok(axum::Json(response).into_response())
}

fn stream_response(id: String, model: &str, reply: BackendReply, start: Instant) -> Response {
    log_stream_started(model, &id, start);
    match reply {
        BackendReply::Stream(frames) => {
            sse_ok_response(Body::from_stream(normalize(frames, id, model.to_owned())))
        }
        BackendReply::Json(value) => {
            // Backend ignored the stream flag: answer with a two-chunk stream.
            tracing::debug!(
                response_id = %id,
                "backend returned a plain object for a streaming request"
            );
            let framer = ChunkFramer::new(id, model);
            let frames = [
                framer.content_frame(&extract_text(&value)),
                framer.stop_frame(),
                done_frame(),
            ];
            sse_ok_response(Body::from_stream(stream::iter(
                frames.map(Ok::<Bytes, GatewayError>),
            )))
        }
    }
}

#[inline]
fn sse_ok_response(body: Body) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = http::StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(
        http::header::CACHE_CONTROL,
        http::HeaderValue::from_static("no-cache"),
    );
    headers.insert(
        http::header::CONNECTION,
        http::HeaderValue::from_static("keep-alive"),
    );
    response
}
