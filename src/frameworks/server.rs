// Framework bootstrap for the battlemap server runtime.

use crate::domain::ship::ShipInput;
use crate::frameworks::config;
use crate::interface_adapters::http::{health_handler, save_handler, state_handler};
use crate::interface_adapters::net::ws_handler;
use crate::interface_adapters::state::AppState;
use crate::use_cases::BattleState;

use axum::{
    Router,
    extract::ws::Utf8Bytes,
    routing::{get, post},
};
use std::io::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    // build state
    let state = build_state();
    // Start the Web Server
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/state", get(state_handler))
        .route("/api/save", post(save_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Arc<AppState> {
    let mut battle = BattleState::new(config::map_width(), config::map_height());

    // Initial roster: a missing or unreadable file means an empty map, not a
    // failed startup. Ships can still be created at runtime.
    let ships_file = config::ships_file();
    match load_roster(&ships_file) {
        Ok(roster) => {
            tracing::info!(path = %ships_file, count = roster.len(), "initial roster loaded");
            battle.load(roster);
        }
        Err(e) => {
            tracing::warn!(path = %ships_file, error = %e, "starting with an empty map");
        }
    }

    let (update_tx, _update_rx) =
        broadcast::channel::<Utf8Bytes>(config::UPDATE_BROADCAST_CAPACITY);

    Arc::new(AppState {
        battle: Arc::new(RwLock::new(battle)),
        update_tx,
        snapshot_path: Arc::new(PathBuf::from(config::snapshot_file())),
    })
}

fn load_roster(path: &str) -> Result<Vec<ShipInput>> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(std::io::Error::other)
}
