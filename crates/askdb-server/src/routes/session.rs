//! Session routes.

use super::new_session_id;
use crate::state::AppState;
use askdb_types::StartSessionResponse;
use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::info;

/// Create an empty session and hand back its id.
pub async fn start(State(state): State<Arc<AppState>>) -> Json<StartSessionResponse> {
    let session_id = new_session_id();
    state.sessions.get_or_create(&session_id);
    info!(target: "askdb::api", "Started session {}", session_id);
    Json(StartSessionResponse { session_id })
}
