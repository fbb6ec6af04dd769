use crate::use_cases::BattleState;
use axum::extract::ws::Utf8Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

#[derive(Clone)]
pub struct AppState {
    // Authoritative battle state; the write lock is the single mutation
    // boundary, so no two operations ever interleave mid-mutation.
    pub battle: Arc<RwLock<BattleState>>,
    // Serialized server messages, fanned out once to every connection.
    pub update_tx: broadcast::Sender<Utf8Bytes>,
    // Where the admin save endpoint dumps the current roster.
    pub snapshot_path: Arc<PathBuf>,
}
