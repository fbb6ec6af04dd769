// HTTP surface around the battle state: read-only snapshot, health probe,
// and the admin roster dump.

use crate::interface_adapters::protocol::FullState;
use crate::interface_adapters::state::AppState;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

pub async fn state_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.battle.read().await.snapshot();
    Json(FullState::from(snapshot))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

#[derive(Debug, Serialize)]
struct SaveResponse {
    ok: bool,
    path: String,
}

/// Dumps the current roster to the configured snapshot file. The output is
/// the same shape `load` accepts, so a saved battle can be used as the next
/// session's initial roster.
pub async fn save_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ships = state.battle.read().await.snapshot().ships;

    let json = match serde_json::to_string_pretty(&ships) {
        Ok(json) => json,
        Err(e) => {
            error!(error = ?e, "failed to serialize roster");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to serialize roster")
                .into_response();
        }
    };

    let path = state.snapshot_path.as_ref();
    match tokio::fs::write(path, json).await {
        Ok(()) => {
            info!(path = %path.display(), count = ships.len(), "roster saved");
            Json(SaveResponse {
                ok: true,
                path: path.display().to_string(),
            })
            .into_response()
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "failed to write snapshot");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to write snapshot").into_response()
        }
    }
}
