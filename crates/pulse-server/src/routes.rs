//! HTTP routes.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::server::AppState;
use crate::sse::{self, Session};

const METHOD_NOT_SUPPORTED: &str = "Method is not supported.";
const NOT_FOUND: &str = "404 not found.";
const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// `/ping` response body.
#[derive(Debug, Clone, Serialize)]
pub struct PingResponse {
    /// Always `"pong"`.
    pub message: &'static str,
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/hello",
            get(hello).head(hello_wrong_method).fallback(hello_wrong_method),
        )
        .route(
            "/ping",
            get(ping).head(ping_wrong_method).fallback(ping_wrong_method),
        )
        .route("/events", get(events))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /hello
async fn hello() -> &'static str {
    "Hello!"
}

async fn hello_wrong_method() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, METHOD_NOT_SUPPORTED)
}

/// GET /ping
async fn ping() -> Json<PingResponse> {
    Json(PingResponse { message: "pong" })
}

async fn ping_wrong_method() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, METHOD_NOT_SUPPORTED)
}

/// GET /events
async fn events(State(state): State<AppState>) -> Result<Response, ServerError> {
    if state.shutdown.is_shutting_down() {
        return Err(ServerError::ShuttingDown);
    }
    let session = Session::open(Arc::clone(&state.hub), state.shutdown.token());
    Ok(sse::response(session))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.hub.client_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            pulse_telemetry::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, NOT_FOUND).into_response(),
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, NOT_FOUND)
}
