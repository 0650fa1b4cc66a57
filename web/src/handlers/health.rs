//! Liveness, readiness and metrics endpoints.
//!
//! None of these require `X-User-Id`.

use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use ficket_runtime::StoreBackend;
use serde::Serialize;

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// Liveness check.
///
/// Returns 200 OK while the process is serving. Dependencies are not checked.
///
/// ```text
/// GET /health
/// {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// Readiness response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness
    pub ready: bool,
    /// Key-value store reachable
    pub store: bool,
    /// Open WebSocket channels
    pub connections: usize,
}

/// Readiness check: 200 when the store answers a ping, 503 otherwise.
pub async fn readiness_check<B: StoreBackend>(
    State(state): State<AppState<B>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let store = state.is_ready().await;
    let status = if store { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(ReadinessResponse { ready: store, store, connections: state.active_connections() }),
    )
}

/// Prometheus text exposition.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn metrics<B: StoreBackend>(State(state): State<AppState<B>>) -> Response {
    match state.metrics() {
        Some(recorder) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            recorder.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
