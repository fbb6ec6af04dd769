mod support;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect() -> WsStream {
    let base_url = support::ensure_server();
    let ws_url = format!(
        "ws://{}/ws",
        base_url
            .strip_prefix("http://")
            .expect("base url should use http://")
    );
    let (stream, _response) = tokio_tungstenite::connect_async(ws_url)
        .await
        .expect("websocket connect should succeed");
    stream
}

// Reads the next text frame and parses the `{type, data}` envelope.
async fn next_message(stream: &mut WsStream) -> Value {
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
            .await
            .expect("server should reply within the timeout")
            .expect("stream should stay open")
            .expect("frame should be readable");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("server messages are json envelopes");
        }
    }
}

async fn send_message(stream: &mut WsStream, payload: Value) {
    stream
        .send(Message::Text(payload.to_string().into()))
        .await
        .expect("send should succeed");
}

// Collects `count` messages and indexes them by envelope type, for flows that
// produce both a unicast receipt and a broadcast.
async fn next_messages_by_type(
    stream: &mut WsStream,
    count: usize,
) -> std::collections::HashMap<String, Value> {
    let mut seen = std::collections::HashMap::new();
    for _ in 0..count {
        let envelope = next_message(stream).await;
        let kind = envelope["type"]
            .as_str()
            .expect("envelope carries a type")
            .to_string();
        seen.insert(kind, envelope["data"].clone());
    }
    seen
}

#[tokio::test]
async fn test_full_session_flow() {
    let mut stream = connect().await;

    // 1. Connecting yields the authoritative full state.
    let hello = next_message(&mut stream).await;
    assert_eq!(hello["type"], "fullState");
    assert_eq!(hello["data"]["map"]["width"], 4000.0);
    let ships = hello["data"]["ships"]
        .as_array()
        .expect("full state carries the roster");
    assert_eq!(ships.len(), 4);

    // 2. Moves are clamped into map bounds and broadcast back.
    send_message(
        &mut stream,
        json!({ "type": "moveShip", "data": { "id": "S2", "x": -500.0, "y": 999999.0 } }),
    )
    .await;
    let moved = next_message(&mut stream).await;
    assert_eq!(moved["type"], "shipMoved");
    assert_eq!(moved["data"]["id"], "S2");
    assert_eq!(moved["data"]["x"], 0.0);
    assert_eq!(moved["data"]["y"], 3000.0);

    // 3. Manual damage produces an attack report.
    send_message(
        &mut stream,
        json!({
            "type": "manualAttack",
            "data": { "attackerId": "S1", "targetId": "S3", "damage": 5.0 }
        }),
    )
    .await;
    let attack = next_message(&mut stream).await;
    assert_eq!(attack["type"], "attackResult");
    assert_eq!(attack["data"]["targetId"], "S3");
    assert_eq!(attack["data"]["damage"], 5.0);
    assert_eq!(attack["data"]["remainingHp"], 65.0);

    // 4. Undo reverses the damage (the most recent operation), not the move.
    send_message(&mut stream, json!({ "type": "undoMove" })).await;
    let undone = next_message(&mut stream).await;
    assert_eq!(undone["type"], "shipMoved");
    assert_eq!(undone["data"]["id"], "S3");
    assert_eq!(undone["data"]["hp"], 70.0);

    // 5. Updates answer the requester and broadcast the new record; out of
    //    range speed clamps, legacy full shields upgrade to bilateral.
    send_message(
        &mut stream,
        json!({
            "type": "updateShip",
            "data": {
                "id": "S1",
                "patch": { "speed": 9.0, "shield": { "type": "full", "value": 2 } }
            }
        }),
    )
    .await;
    let replies = next_messages_by_type(&mut stream, 2).await;
    let receipt = &replies["shipUpdateResult"];
    assert_eq!(receipt["ok"], true);
    assert_eq!(receipt["ship"]["speed"], 5);
    assert_eq!(
        receipt["ship"]["shield"],
        json!({ "type": "bilateral", "front": 2, "back": 2 })
    );
    assert_eq!(replies["shipMoved"]["id"], "S1");

    // 6. Creation assigns the next free server id.
    let name = format!("Marauder-{}", uuid::Uuid::new_v4());
    send_message(
        &mut stream,
        json!({ "type": "createShip", "data": { "name": name, "icon": "wing" } }),
    )
    .await;
    let created = next_message(&mut stream).await;
    assert_eq!(created["type"], "shipCreated");
    assert_eq!(created["data"]["id"], "S5");
    assert_eq!(created["data"]["name"], name.as_str());
    assert_eq!(created["data"]["icon"], "wing");

    // 7. Deletion answers the requester and broadcasts the removal.
    send_message(
        &mut stream,
        json!({ "type": "deleteShip", "data": { "id": "S5" } }),
    )
    .await;
    let replies = next_messages_by_type(&mut stream, 2).await;
    assert_eq!(replies["shipDeleteResult"]["ok"], true);
    assert_eq!(replies["shipDeleted"]["id"], "S5");

    // 8. Unknown ids come back as unicast errors, not silence or a crash.
    send_message(
        &mut stream,
        json!({ "type": "moveShip", "data": { "id": "S99", "x": 1.0, "y": 1.0 } }),
    )
    .await;
    let error = next_message(&mut stream).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["data"]["message"], "Not found");

    // 9. The GM viewport relays to all clients.
    send_message(
        &mut stream,
        json!({
            "type": "setView",
            "data": { "scale": 1.5, "offsetX": 10.0, "offsetY": 20.0 }
        }),
    )
    .await;
    let view = next_message(&mut stream).await;
    assert_eq!(view["type"], "viewUpdated");
    assert_eq!(view["data"]["scale"], 1.5);

    // 10. Malformed JSON is tolerated; the connection keeps serving.
    stream
        .send(Message::Text("this is not json".to_string().into()))
        .await
        .expect("send should succeed");
    send_message(&mut stream, json!({ "type": "undoMove" })).await;
    let survived = next_message(&mut stream).await;
    // The top of the undo stack is the speed change from step 5.
    assert_eq!(survived["type"], "shipMoved");
    assert_eq!(survived["data"]["id"], "S1");
    assert_eq!(survived["data"]["speed"], 0);
}
