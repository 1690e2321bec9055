//! Per-connection state: the client handle backing one WebSocket and the
//! room membership it holds.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::rooms::{ClientHandle, RoomError, RoomManager, SendError, SharedHandle};

/// Frames queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Client handle for a WebSocket connection.
///
/// Text goes into a bounded queue drained by the connection's writer task,
/// so `send_text` never waits on the network.
pub struct WsHandle {
    /// Unique connection identifier (`conn_` prefixed ULID).
    id: String,
    tx: mpsc::Sender<Outbound>,
}

impl WsHandle {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = Self {
            id: roomcast_common::id::prefixed_ulid(roomcast_common::id::prefix::CONNECTION),
            tx,
        };
        (Arc::new(handle), rx)
    }

    /// Queue a close frame. The writer task stops after sending it.
    pub async fn close(&self, code: u16, reason: &str) {
        let _ = self
            .tx
            .send(Outbound::Close {
                code,
                reason: reason.to_string(),
            })
            .await;
    }
}

impl ClientHandle for WsHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.tx
            .try_send(Outbound::Text(text.to_string()))
            .map_err(|err| match err {
                mpsc::error::TrySendError::Full(_) => SendError::Full,
                mpsc::error::TrySendError::Closed(_) => SendError::Closed,
            })
    }
}

/// A joined room. Leaving happens through [`RoomMembership::leave`]; if the
/// membership is dropped without it (panic, task cancelled) the disconnect
/// is spawned onto the runtime instead.
pub struct RoomMembership {
    manager: Arc<RoomManager>,
    handle: SharedHandle,
    room: String,
    joined: bool,
}

impl RoomMembership {
    pub async fn join(
        manager: Arc<RoomManager>,
        handle: SharedHandle,
        room: String,
    ) -> Result<Self, RoomError> {
        manager.connect(handle.clone(), &room).await?;
        Ok(Self {
            manager,
            handle,
            room,
            joined: true,
        })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    /// Leave the room. If this is cancelled before the disconnect finishes,
    /// dropping the membership runs it instead.
    pub async fn leave(mut self) -> Result<(), RoomError> {
        let result = self.manager.disconnect(self.handle.as_ref(), &self.room).await;
        self.joined = false;
        result
    }
}

impl Drop for RoomMembership {
    fn drop(&mut self) {
        if !self.joined {
            return;
        }

        let manager = self.manager.clone();
        let handle = self.handle.clone();
        let room = std::mem::take(&mut self.room);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(err) = manager.disconnect(handle.as_ref(), &room).await {
                        tracing::warn!(room_id = %room, conn_id = %handle.id(), %err, "deferred disconnect failed");
                    }
                });
            }
            Err(_) => {
                tracing::error!(room_id = %room, conn_id = %handle.id(), "no runtime to run disconnect; membership leaked");
            }
        }
    }
}
