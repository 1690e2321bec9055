mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

use roomcast_gateway::broker::MemoryBus;
use roomcast_gateway::rooms::RoomManager;
use roomcast_gateway::AppState;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Helper: open a WebSocket to `/ping/{room}`.
async fn connect(addr: SocketAddr, room: &str) -> WsStream {
    let url = format!("ws://{addr}/ping/{room}");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream
}

/// Helper: read frames until a text frame arrives and parse it as JSON.
async fn next_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for message")
            .expect("stream ended")
            .expect("ws read error");

        match msg {
            tungstenite::Message::Text(text) => {
                return serde_json::from_str(&text).expect("parse message");
            }
            tungstenite::Message::Ping(_) | tungstenite::Message::Pong(_) => continue,
            other => panic!("Expected text frame, got: {other:?}"),
        }
    }
}

/// Helper: read JSON frames until one has `message == text`.
async fn expect_message(ws: &mut WsStream, text: &str) -> serde_json::Value {
    loop {
        let value = next_json(ws).await;
        if value["message"] == text {
            return value;
        }
    }
}

/// Helper: connect and consume the join notice and own connection broadcast.
async fn join(addr: SocketAddr, room: &str) -> WsStream {
    let mut ws = connect(addr, room).await;

    let joined = next_json(&mut ws).await;
    assert_eq!(joined["room_id"], room);
    assert_eq!(joined["message"], format!("Joined room - {room}"));

    expect_message(&mut ws, &format!("User connected to room - {room}")).await;
    ws
}

async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(tungstenite::Message::Text(text.to_string().into()))
        .await
        .expect("send text");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn join_sends_notice_then_connection_broadcast() {
    let (state, broker) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let _ws = join(addr, "lobby").await;

    assert_eq!(broker.subscribe_count("lobby"), 1);
    assert_eq!(state.rooms.registry().room_sizes(), vec![("lobby".to_string(), 1)]);
}

#[tokio::test]
async fn text_frames_are_relayed_to_every_member() {
    let (state, _broker) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut alice = join(addr, "lobby").await;
    let mut bob = join(addr, "lobby").await;
    expect_message(&mut alice, "User connected to room - lobby").await;

    send_text(&mut alice, "hello from alice").await;

    let at_bob = expect_message(&mut bob, "hello from alice").await;
    assert_eq!(at_bob["room_id"], "lobby");
    expect_message(&mut alice, "hello from alice").await;
}

#[tokio::test]
async fn rooms_are_isolated() {
    let (state, _broker) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut lobby = join(addr, "lobby").await;
    let mut kitchen = join(addr, "kitchen").await;

    send_text(&mut kitchen, "kitchen only").await;
    expect_message(&mut kitchen, "kitchen only").await;

    send_text(&mut lobby, "lobby only").await;
    let value = next_json(&mut lobby).await;
    assert_eq!(value["message"], "lobby only", "lobby saw another room's traffic");
}

#[tokio::test]
async fn close_announces_departure_and_cleans_up() {
    let (state, broker) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut stays = join(addr, "lobby").await;
    let mut leaves = join(addr, "lobby").await;
    expect_message(&mut stays, "User connected to room - lobby").await;

    leaves.close(None).await.expect("close");

    expect_message(&mut stays, "User disconnected from room - lobby").await;
    assert!(common::eventually(|| state.rooms.registry().connection_count() == 1).await);
    assert_eq!(broker.unsubscribe_count("lobby"), 0);

    stays.close(None).await.expect("close");
    assert!(common::eventually(|| !state.rooms.registry().contains_room("lobby")).await);
    assert!(common::eventually(|| broker.unsubscribe_count("lobby") == 1).await);
}

#[tokio::test]
async fn dropped_connection_still_runs_disconnect() {
    let (state, broker) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let ws = join(addr, "lobby").await;
    drop(ws);

    assert!(common::eventually(|| !state.rooms.registry().contains_room("lobby")).await);
    assert!(common::eventually(|| broker.unsubscribe_count("lobby") == 1).await);
}

#[tokio::test]
async fn http_ping_reaches_websocket_members() {
    let (state, _broker) = common::test_state();
    let addr = common::start_server(state.clone()).await;

    let mut ws = join(addr, "lobby").await;

    let client = reqwest::Client::new();
    let resp = client
        .post(format!("http://{addr}/api/v0/example/ping/lobby"))
        .send()
        .await
        .expect("ping request");
    assert!(resp.status().is_success());

    let pong = expect_message(&mut ws, "pong").await;
    assert_eq!(pong["room_id"], "lobby");
}

#[tokio::test]
async fn join_is_refused_when_broker_is_down() {
    let (state, broker) = common::test_state();
    let addr = common::start_server(state.clone()).await;
    broker.set_available(false);

    let mut ws = connect(addr, "lobby").await;

    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout")
        .expect("stream ended")
        .expect("read error");

    match msg {
        tungstenite::Message::Close(Some(frame)) => {
            assert_eq!(
                frame.code,
                tungstenite::protocol::frame::coding::CloseCode::from(1011)
            );
        }
        other => {
            panic!("Expected Close frame, got: {other:?}");
        }
    }
    assert!(!state.rooms.registry().contains_room("lobby"));
}

#[tokio::test]
async fn two_processes_share_rooms_through_the_bus() {
    let bus = MemoryBus::new();
    let east_state = AppState::new(
        std::sync::Arc::new(RoomManager::new(std::sync::Arc::new(bus.connect()))),
        common::test_config(),
    );
    let west_state = AppState::new(
        std::sync::Arc::new(RoomManager::new(std::sync::Arc::new(bus.connect()))),
        common::test_config(),
    );
    let east = common::start_server(east_state).await;
    let west = common::start_server(west_state).await;

    let mut on_east = join(east, "lobby").await;
    let mut on_west = join(west, "lobby").await;
    expect_message(&mut on_east, "User connected to room - lobby").await;

    send_text(&mut on_west, "across the fleet").await;

    expect_message(&mut on_east, "across the fleet").await;
    expect_message(&mut on_west, "across the fleet").await;
}
