//! Question, chat and smart-routing handlers.
//!
//! The pipeline blocks on the model and the database, so every call runs on
//! the blocking pool.

use super::{error_response, new_session_id};
use crate::state::AppState;
use askdb_types::{
    AskRequest, AskResponse, ChatRequest, ChatResponse, SmartRequest, SmartResponse,
};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{error, info};

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn require_text(text: &str, field: &str) -> Result<String, (StatusCode, String)> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err((StatusCode::BAD_REQUEST, format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn session_or_new(session_id: Option<String>) -> String {
    session_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(new_session_id)
}

async fn run_blocking<T, F>(f: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> askdb_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!(target: "askdb::api", "Pipeline task failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?
        .map_err(error_response)
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AskRequest>,
) -> ApiResult<AskResponse> {
    let question = require_text(&req.question, "question")?;
    let session_id = session_or_new(Some(req.session_id));
    info!(target: "askdb::api", "POST /ask (session: {})", session_id);

    let pipeline = state.pipeline.clone();
    let resp = run_blocking(move || pipeline.ask(&session_id, &question)).await?;
    Ok(Json(resp))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<ChatResponse> {
    let message = require_text(&req.message, "message")?;
    let session_id = session_or_new(req.session_id);
    info!(target: "askdb::api", "POST /chat (session: {})", session_id);

    let pipeline = state.pipeline.clone();
    let reply = run_blocking(move || pipeline.converse(&session_id, &message)).await?;
    Ok(Json(ChatResponse { reply }))
}

pub async fn smart(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SmartRequest>,
) -> ApiResult<SmartResponse> {
    let message = require_text(&req.message, "message")?;
    let session_id = session_or_new(req.session_id);
    info!(target: "askdb::api", "POST /smart (session: {})", session_id);

    let pipeline = state.pipeline.clone();
    let resp = run_blocking(move || pipeline.route(&session_id, &message)).await?;
    Ok(Json(resp))
}
