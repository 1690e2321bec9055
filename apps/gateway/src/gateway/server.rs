//! WebSocket upgrade handler and per-connection event loop.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::rooms::{ClientHandle, RoomError, RoomMessage};
use crate::AppState;

use super::session::{Outbound, RoomMembership, WsHandle};

/// Close codes.
const CLOSE_INTERNAL_ERROR: u16 = 1011;
const CLOSE_INVALID_ROOM: u16 = 4000;

/// Frames buffered per connection before broadcasts to it are dropped.
const OUTBOUND_CAPACITY: usize = 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ping/{room_id}", get(ws_upgrade))
        .route("/ping/{room_id}/", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, room_id))
}

async fn handle_connection(socket: WebSocket, state: AppState, room_id: String) {
    let (ws_tx, ws_rx) = socket.split();
    let (handle, outbound_rx) = WsHandle::new(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(write_outbound(ws_tx, outbound_rx));

    let membership =
        match RoomMembership::join(state.rooms.clone(), handle.clone(), room_id.clone()).await {
            Ok(membership) => membership,
            Err(err) => {
                tracing::warn!(room_id = %room_id, conn_id = %handle.id(), %err, "join failed");
                let code = match err {
                    RoomError::InvalidRoom | RoomError::AlreadyJoined(_) => CLOSE_INVALID_ROOM,
                    RoomError::Broker(_) => CLOSE_INTERNAL_ERROR,
                };
                handle.close(code, "Unable to join room").await;
                drop(handle);
                let _ = writer.await;
                return;
            }
        };

    tracing::info!(room_id = %room_id, conn_id = %handle.id(), "websocket session established");

    if let Err(err) = state
        .rooms
        .send_message(&RoomMessage::user_connected(&room_id))
        .await
    {
        tracing::warn!(room_id = %room_id, %err, "failed to announce connection");
    }

    run_session(&state, &handle, membership.room(), ws_rx).await;

    if let Err(err) = state
        .rooms
        .send_message(&RoomMessage::user_disconnected(&room_id))
        .await
    {
        tracing::warn!(room_id = %room_id, %err, "failed to announce disconnection");
    }

    if let Err(err) = membership.leave().await {
        tracing::warn!(room_id = %room_id, conn_id = %handle.id(), %err, "disconnect failed");
    }

    tracing::info!(room_id = %room_id, conn_id = %handle.id(), "websocket session ended");

    // The writer exits once every sender (our handle) is gone.
    drop(handle);
    let _ = writer.await;
}

/// Relay client text frames to the room until the client goes away or
/// publishing fails.
async fn run_session(
    state: &AppState,
    handle: &WsHandle,
    room_id: &str,
    mut ws_rx: SplitStream<WebSocket>,
) {
    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let message = RoomMessage::new(room_id, text.as_str());
                if let Err(err) = state.rooms.send_message(&message).await {
                    tracing::warn!(room_id = %room_id, conn_id = %handle.id(), %err, "publish failed; closing");
                    handle.close(CLOSE_INTERNAL_ERROR, "Broker unavailable").await;
                    break;
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(?e, room_id = %room_id, conn_id = %handle.id(), "ws read error");
                break;
            }
        }
    }
}

/// Drain the connection's outbound queue into the socket.
async fn write_outbound(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Text(text) => {
                if ws_tx.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Outbound::Close { code, reason } => {
                let _ = send_close(&mut ws_tx, code, &reason).await;
                break;
            }
        }
    }
}

/// Send a WebSocket close frame with a code and reason.
async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    code: u16,
    reason: &str,
) -> Result<(), axum::Error> {
    let close_msg = Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }));
    ws_tx.send(close_msg).await
}
