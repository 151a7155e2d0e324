//! Accept loop shared by the binary and the integration tests.
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;

use crate::backend::{HttpBackend, InferenceBackend};
use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::routing::dispatch::dispatch_request;
use crate::state::AppState;

/// Build the shared state with the configured HTTP backend.
///
/// # Errors
///
/// Returns [`GatewayError::Internal`] when the backend client or the model
/// listing cannot be built.
pub fn build_state(config: AppConfig) -> Result<Arc<AppState>, GatewayError> {
    let backend: Arc<dyn InferenceBackend> =
        Arc::new(HttpBackend::new(&config.backend, &config.server)?);
    AppState::new(config, backend).map(Arc::new)
}

/// Serve connections from `listener` until the task is dropped.
pub async fn serve_accept_loop(
    listener: tokio::net::TcpListener,
    dispatch_state: Arc<AppState>,
    dispatch_base_path: Arc<str>,
) {
    let conn_builder = AutoBuilder::new(TokioExecutor::new());
    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok((stream, remote_addr)) => (stream, remote_addr),
            Err(err) => {
                tracing::warn!("accept error: {err}");
                continue;
            }
        };

        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!("failed to enable TCP_NODELAY for {remote_addr}: {err}");
        }

        let io = TokioIo::new(stream);
        let conn_builder = conn_builder.clone();
        let request_state = Arc::clone(&dispatch_state);
        let request_base_path = Arc::clone(&dispatch_base_path);
        let hyper_service = service_fn(move |request: Request<Incoming>| {
            dispatch_request(
                Arc::clone(&request_state),
                Arc::clone(&request_base_path),
                request.map(Body::new),
            )
        });

        tokio::spawn(async move {
            if let Err(err) = conn_builder.serve_connection(io, hyper_service).await {
                tracing::debug!("failed to serve connection from {remote_addr}: {err:#}");
            }
        });
    }
}
