// Wire protocol DTOs and conversions for public battlemap messages.
// The JSON envelope is `{"type": ..., "data": ...}` with camelCase names,
// matching the browser clients.

use crate::domain::ship::{Ship, ShipInput};
use crate::use_cases::{AttackReport, BattleSnapshot, MapSize};
use serde::{Deserialize, Serialize};

/// Range band radii (map units) drawn around a selected ship. Presentation
/// data served with the full state, not part of the battle state itself.
pub const RANGE_BANDS: [u32; 4] = [200, 400, 800, 1600];

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ServerMessage {
    // Full map sync: sent once on connect and again for lag recovery.
    FullState(FullState),
    // Authoritative ship record after a move, update or undo.
    ShipMoved(Ship),
    // Outcome of a dice-rolled or manually entered attack.
    AttackResult(AttackReport),
    ShipCreated(Ship),
    ShipDeleted { id: String },
    // Unicast reply to updateShip.
    ShipUpdateResult(ShipUpdateResult),
    // Unicast reply to deleteShip.
    ShipDeleteResult(ShipDeleteResult),
    // GM viewport relay for follow-along viewers.
    ViewUpdated(ViewState),
    // Unicast failure feedback for requests with no dedicated reply shape.
    Error { message: String },
}

/// Messages clients send to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    MoveShip {
        id: String,
        x: f32,
        y: f32,
    },
    #[serde(rename_all = "camelCase")]
    Attack {
        attacker_id: String,
        target_id: String,
    },
    #[serde(rename_all = "camelCase")]
    ManualAttack {
        attacker_id: String,
        target_id: String,
        damage: f32,
    },
    UpdateShip {
        id: String,
        patch: ShipInput,
    },
    CreateShip(ShipInput),
    DeleteShip {
        id: String,
    },
    UndoMove,
    SetView(ViewState),
}

/// Full state payload: map dimensions, every ship, and the range band radii.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FullState {
    pub map: MapSize,
    pub ships: Vec<Ship>,
    pub range_bands: [u32; 4],
}

impl From<BattleSnapshot> for FullState {
    fn from(snapshot: BattleSnapshot) -> Self {
        Self {
            map: snapshot.map,
            ships: snapshot.ships,
            range_bands: RANGE_BANDS,
        }
    }
}

/// Unicast result of a partial ship update.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipUpdateResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ship: Option<Ship>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShipUpdateResult {
    pub fn updated(ship: Ship) -> Self {
        Self {
            ok: true,
            ship: Some(ship),
            error: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            ok: false,
            ship: None,
            error: Some(message.to_string()),
        }
    }
}

/// Unicast result of a ship deletion.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipDeleteResult {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ShipDeleteResult {
    pub fn deleted(id: String) -> Self {
        Self {
            ok: true,
            id: Some(id),
            error: None,
        }
    }

    pub fn failed(message: &str) -> Self {
        Self {
            ok: false,
            id: None,
            error: Some(message.to_string()),
        }
    }
}

/// Shared GM viewport: relayed verbatim, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_move_ship_json_arrives_then_it_parses() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{ "type": "moveShip", "data": { "id": "S1", "x": 10.0, "y": 20.0 } }"#,
        )
        .expect("moveShip should parse");
        assert!(matches!(msg, ClientMessage::MoveShip { ref id, .. } if id == "S1"));
    }

    #[test]
    fn when_manual_attack_json_arrives_then_camel_case_fields_parse() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{ "type": "manualAttack", "data": { "attackerId": "S1", "targetId": "S2", "damage": 4 } }"#,
        )
        .expect("manualAttack should parse");
        match msg {
            ClientMessage::ManualAttack {
                attacker_id,
                target_id,
                damage,
            } => {
                assert_eq!(attacker_id, "S1");
                assert_eq!(target_id, "S2");
                assert_eq!(damage, 4.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn when_undo_move_json_has_no_data_then_it_still_parses() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{ "type": "undoMove" }"#).expect("undoMove should parse");
        assert!(matches!(msg, ClientMessage::UndoMove));
    }

    #[test]
    fn when_server_message_serializes_then_envelope_is_tagged_camel_case() {
        let json = serde_json::to_value(ServerMessage::ShipDeleted {
            id: "S3".to_string(),
        })
        .expect("shipDeleted should serialize");
        assert_eq!(
            json,
            serde_json::json!({ "type": "shipDeleted", "data": { "id": "S3" } })
        );
    }

    #[test]
    fn when_update_result_is_a_failure_then_ship_is_omitted_from_the_wire() {
        let json = serde_json::to_value(ServerMessage::ShipUpdateResult(ShipUpdateResult::failed(
            "Not found",
        )))
        .expect("result should serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "type": "shipUpdateResult",
                "data": { "ok": false, "error": "Not found" }
            })
        );
    }
}
