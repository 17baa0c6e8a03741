// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Routes: `/ws` (control plane), `/healthz`, `/metrics`. Health and
//! metrics are unauthenticated; the WebSocket authenticates in-band via
//! `req:hello`.

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tokio_util::sync::CancellationToken;
use tracing::info;

use agw_core::AgwError;
use agw_security::ClientKeyVerifier;

use crate::core::Gateway;
use crate::ws;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub verifier: ClientKeyVerifier,
    /// Prometheus text-format render function, when metrics are enabled.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Builds the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(get_healthz))
        .route("/metrics", get(get_metrics))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds and serves until the cancellation token fires.
pub async fn start_server(
    host: &str,
    port: u16,
    state: AppState,
    cancel: CancellationToken,
) -> Result<(), AgwError> {
    let app = router(state);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AgwError::Config(format!("failed to bind gateway to {addr}: {e}")))?;

    info!(addr = addr.as_str(), "gateway server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| AgwError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}

/// GET /healthz
async fn get_healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.gateway.health())
}

/// GET /metrics
async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus_render {
        Some(render) => (
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            "metrics exporter disabled",
        )
            .into_response(),
    }
}
