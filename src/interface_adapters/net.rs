use crate::interface_adapters::protocol::{
    ClientMessage, FullState, ServerMessage, ShipDeleteResult, ShipUpdateResult,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::BattleError;

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures_util::sink::SinkExt;
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    UpdatesClosed,
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;

const NOT_FOUND_MSG: &str = "Not found";
const INVALID_COMBATANTS_MSG: &str = "Invalid attacker or target";

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

/// Returns a process-unique, monotonically increasing connection id, so log
/// lines from concurrent sockets can be told apart.
fn conn_id() -> u64 {
    static COUNTER: OnceLock<AtomicU64> = OnceLock::new();
    let counter = COUNTER.get_or_init(|| {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        AtomicU64::new(seed)
    });
    counter.fetch_add(1, Ordering::Relaxed)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Connection id for correlating all log lines from this socket.
    let conn_id = conn_id();
    let span = info_span!("conn", conn_id);
    run_connection(socket, state).instrument(span).await
}

async fn run_connection(mut socket: WebSocket, state: Arc<AppState>) {
    let mut ctx = match bootstrap_connection(&mut socket, &state).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(error = ?e, "failed to bootstrap connection");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::POLICY,
                    reason: "bootstrap failed".into(),
                })))
                .await;
            let _ = socket.close().await;
            return;
        }
    };

    info!("client connected");

    // Main Client Loop
    if let Err(e) = run_client_loop(&mut socket, &state, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    // Serialize message safely; log JSON errors instead of panicking.
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

/// Serializes a message once and fans the shared bytes out to every
/// connection, the sender included.
fn broadcast_message(state: &AppState, msg: &ServerMessage) {
    match serde_json::to_string(msg) {
        Ok(txt) => {
            // Send fails only when no client is subscribed; nothing to do then.
            let _ = state.update_tx.send(Utf8Bytes::from(txt));
        }
        Err(e) => {
            error!(error = ?e, "failed to serialize broadcast");
        }
    }
}

struct ConnCtx {
    pub update_rx: broadcast::Receiver<Utf8Bytes>,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,
    // Count full-state resyncs sent to this client after broadcast lag.
    pub resync_count: u64,

    pub last_invalid_msg_log: Instant,
    pub last_lag_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &AppState,
) -> Result<ConnCtx, NetError> {
    // Subscribe *before* the first send so no broadcast lands in the gap
    // between the snapshot and the loop picking up updates.
    let update_rx = state.update_tx.subscribe();

    // Initial full sync: every client starts from the authoritative snapshot.
    let snapshot = state.battle.read().await.snapshot();
    send_message(socket, &ServerMessage::FullState(FullState::from(snapshot))).await?;

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        update_rx,

        msgs_in: 0,
        msgs_out: 0,
        bytes_in: 0,
        bytes_out: 0,

        invalid_json: 0,
        resync_count: 0,

        last_invalid_msg_log: now,
        last_lag_log: now,

        close_frame: None,
    })
}

enum LoopControl {
    Continue,
    Disconnect,
}

async fn run_client_loop(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    ctx: &mut ConnCtx,
) -> Result<(), NetError> {
    // Split borrows so `tokio::select!` can hold them concurrently.
    let ConnCtx {
        update_rx,
        msgs_in,
        msgs_out,
        bytes_in,
        bytes_out,
        invalid_json,
        resync_count,
        last_invalid_msg_log,
        last_lag_log,
        close_frame,
    } = ctx;

    let mut fatal: Option<NetError> = None;

    loop {
        // disconnect becomes true on error
        let disconnect: bool = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => {
                match handle_incoming_ws(
                    socket,
                    state,
                    incoming,
                    msgs_in,
                    msgs_out,
                    bytes_in,
                    bytes_out,
                    invalid_json,
                    last_invalid_msg_log,
                    close_frame,
                ).await {
                    Ok(LoopControl::Continue) => false,
                    Ok(LoopControl::Disconnect) => true,
                    Err(e) => {
                        fatal = Some(e);
                        true
                    }
                }
            }

            // Outgoing Broadcast Update
            update = update_rx.recv() => {
                match update {
                    Ok(bytes) => match forward_update_bytes(bytes, socket, msgs_out, bytes_out).await {
                        LoopControl::Continue => false,
                        LoopControl::Disconnect => true,
                    },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        if should_log(last_lag_log) {
                            warn!(missed = n, "broadcasts lagged; resyncing with full state");
                        }

                        // Resync strategy: skip the missed deltas and send a
                        // fresh authoritative snapshot instead.
                        let snapshot = state.battle.read().await.snapshot();
                        let msg = ServerMessage::FullState(FullState::from(snapshot));
                        match send_message(socket, &msg).await {
                            Ok(bytes) => {
                                *msgs_out += 1;
                                *bytes_out += bytes as u64;
                                *resync_count += 1;
                                false
                            }
                            Err(err) => {
                                warn!(error = ?err, "failed to send resync snapshot");
                                true
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        fatal = Some(NetError::UpdatesClosed);
                        true
                    }
                }
            }
        };

        if disconnect {
            if let Some(frame) = close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    debug!(
        msgs_in = *msgs_in,
        msgs_out = *msgs_out,
        bytes_in = *bytes_in,
        bytes_out = *bytes_out,
        invalid_json = *invalid_json,
        resync_count = *resync_count,
        "connection stats"
    );
    info!("client disconnected");

    if let Some(err) = fatal { Err(err) } else { Ok(()) }
}

#[allow(clippy::too_many_arguments)]
async fn handle_incoming_ws(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    incoming: Option<Result<Message, axum::Error>>,
    msgs_in: &mut u64,
    msgs_out: &mut u64,
    bytes_in: &mut u64,
    bytes_out: &mut u64,
    invalid_json: &mut u32,
    last_invalid_msg_log: &mut Instant,
    close_frame: &mut Option<CloseFrame>,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                *msgs_in += 1;
                *bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(request) => {
                        dispatch_client_message(socket, state, request, msgs_out, bytes_out).await
                    }
                    Err(parse_err) => {
                        *invalid_json += 1;
                        if should_log(last_invalid_msg_log) {
                            warn!(
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        if *invalid_json > MAX_INVALID_JSON {
                            *close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                *close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!("websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn unicast(
    socket: &mut WebSocket,
    msg: &ServerMessage,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> Result<(), NetError> {
    let bytes = send_message(socket, msg).await?;
    *msgs_out += 1;
    *bytes_out += bytes as u64;
    Ok(())
}

/// Applies one client request against the battle state and routes the
/// outcome: authoritative changes are broadcast to everyone, failures and
/// request receipts go back to the requester alone.
///
/// The write guard is dropped before any socket send; the guard must never be
/// held across an await.
async fn dispatch_client_message(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    request: ClientMessage,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> Result<LoopControl, NetError> {
    match request {
        ClientMessage::MoveShip { id, x, y } => {
            let outcome = state.battle.write().await.move_ship(&id, x, y);
            match outcome {
                Ok(ship) => {
                    debug!(ship_id = %ship.id, x = ship.x, y = ship.y, "ship moved");
                    broadcast_message(state, &ServerMessage::ShipMoved(ship));
                }
                Err(BattleError::NotFound) => {
                    unicast(
                        socket,
                        &ServerMessage::Error {
                            message: NOT_FOUND_MSG.to_string(),
                        },
                        msgs_out,
                        bytes_out,
                    )
                    .await?;
                }
            }
        }
        ClientMessage::Attack {
            attacker_id,
            target_id,
        } => {
            let outcome = state.battle.write().await.attack(&attacker_id, &target_id);
            match outcome {
                Ok(report) => {
                    info!(
                        attacker_id = %report.attacker_id,
                        target_id = %report.target_id,
                        damage = report.damage,
                        "attack resolved"
                    );
                    broadcast_message(state, &ServerMessage::AttackResult(report));
                }
                Err(BattleError::NotFound) => {
                    unicast(
                        socket,
                        &ServerMessage::Error {
                            message: INVALID_COMBATANTS_MSG.to_string(),
                        },
                        msgs_out,
                        bytes_out,
                    )
                    .await?;
                }
            }
        }
        ClientMessage::ManualAttack {
            attacker_id,
            target_id,
            damage,
        } => {
            let outcome = state
                .battle
                .write()
                .await
                .apply_damage(&attacker_id, &target_id, damage);
            match outcome {
                Ok(report) => {
                    info!(
                        attacker_id = %report.attacker_id,
                        target_id = %report.target_id,
                        damage = report.damage,
                        "manual damage applied"
                    );
                    broadcast_message(state, &ServerMessage::AttackResult(report));
                }
                Err(BattleError::NotFound) => {
                    unicast(
                        socket,
                        &ServerMessage::Error {
                            message: INVALID_COMBATANTS_MSG.to_string(),
                        },
                        msgs_out,
                        bytes_out,
                    )
                    .await?;
                }
            }
        }
        ClientMessage::UpdateShip { id, patch } => {
            let outcome = state.battle.write().await.update_ship(&id, &patch);
            match outcome {
                Ok(ship) => {
                    broadcast_message(state, &ServerMessage::ShipMoved(ship.clone()));
                    unicast(
                        socket,
                        &ServerMessage::ShipUpdateResult(ShipUpdateResult::updated(ship)),
                        msgs_out,
                        bytes_out,
                    )
                    .await?;
                }
                Err(BattleError::NotFound) => {
                    unicast(
                        socket,
                        &ServerMessage::ShipUpdateResult(ShipUpdateResult::failed(NOT_FOUND_MSG)),
                        msgs_out,
                        bytes_out,
                    )
                    .await?;
                }
            }
        }
        ClientMessage::CreateShip(input) => {
            let ship = state.battle.write().await.create_ship(&input);
            info!(ship_id = %ship.id, name = %ship.name, "ship created");
            broadcast_message(state, &ServerMessage::ShipCreated(ship));
        }
        ClientMessage::DeleteShip { id } => {
            let outcome = state.battle.write().await.delete_ship(&id);
            match outcome {
                Ok(()) => {
                    info!(ship_id = %id, "ship deleted");
                    broadcast_message(state, &ServerMessage::ShipDeleted { id: id.clone() });
                    unicast(
                        socket,
                        &ServerMessage::ShipDeleteResult(ShipDeleteResult::deleted(id)),
                        msgs_out,
                        bytes_out,
                    )
                    .await?;
                }
                Err(BattleError::NotFound) => {
                    unicast(
                        socket,
                        &ServerMessage::ShipDeleteResult(ShipDeleteResult::failed(NOT_FOUND_MSG)),
                        msgs_out,
                        bytes_out,
                    )
                    .await?;
                }
            }
        }
        ClientMessage::UndoMove => {
            let outcome = state.battle.write().await.undo_last();
            match outcome {
                Some(ship) => {
                    info!(ship_id = %ship.id, "operation undone");
                    broadcast_message(state, &ServerMessage::ShipMoved(ship));
                }
                None => {
                    // Empty history is a no-op, not an error.
                    debug!("undo requested with nothing to undo");
                }
            }
        }
        ClientMessage::SetView(view) => {
            // Pure relay; the server keeps no viewport state.
            broadcast_message(state, &ServerMessage::ViewUpdated(view));
        }
    }

    Ok(LoopControl::Continue)
}

async fn forward_update_bytes(
    update: Utf8Bytes,
    socket: &mut WebSocket,
    msgs_out: &mut u64,
    bytes_out: &mut u64,
) -> LoopControl {
    let bytes_len = update.len();
    match socket.send(Message::Text(update)).await.map_err(NetError::Ws) {
        Ok(()) => {
            *msgs_out += 1;
            *bytes_out += bytes_len as u64;
            LoopControl::Continue
        }
        Err(err) => {
            // Log unexpected send failures; disconnect will follow immediately.
            warn!(error = ?err, "failed to send broadcast update");
            LoopControl::Disconnect
        }
    }
}
