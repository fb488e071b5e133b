//! HTTP route handlers.

pub mod ask;
pub mod session;

use crate::state::AppState;
use askdb_core::AskError;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Build the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/session/start", post(session::start))
        .route("/ask", post(ask::ask))
        .route("/chat", post(ask::chat))
        .route("/smart", post(ask::smart))
        .route("/health", get(health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Map a pipeline error to a response, hiding internals from the caller.
pub(crate) fn error_response(err: AskError) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, err.user_message())
}

pub(crate) fn new_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
