#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use parking_lot::Mutex;
use tokio::time;

use roomcast_gateway::broker::{MemoryBroker, MemoryBus};
use roomcast_gateway::config::Config;
use roomcast_gateway::rooms::{ClientHandle, RoomManager, SendError};
use roomcast_gateway::AppState;

/// A client handle that records every text frame it is sent.
pub struct RecordingHandle {
    id: String,
    failing: AtomicBool,
    received: Mutex<Vec<String>>,
}

impl RecordingHandle {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            failing: AtomicBool::new(false),
            received: Mutex::new(Vec::new()),
        })
    }

    /// A handle whose connection is already gone.
    pub fn broken(id: &str) -> Arc<Self> {
        let handle = Self::new(id);
        handle.failing.store(true, Ordering::SeqCst);
        handle
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Frames whose `message` field equals `text`.
    pub fn count_message(&self, text: &str) -> usize {
        self.received
            .lock()
            .iter()
            .filter_map(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .filter(|value| value["message"] == text)
            .count()
    }

    pub fn has_message(&self, text: &str) -> bool {
        self.count_message(text) > 0
    }
}

impl ClientHandle for RecordingHandle {
    fn id(&self) -> &str {
        &self.id
    }

    fn send_text(&self, text: &str) -> Result<(), SendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(SendError::Closed);
        }
        self.received.lock().push(text.to_string());
        Ok(())
    }
}

/// Poll `cond` until it holds, for at most two seconds.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    time::timeout(Duration::from_secs(2), async {
        while !cond() {
            time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Give the listener a moment to deliver anything that is in flight.
pub async fn settle() {
    time::sleep(Duration::from_millis(50)).await;
}

/// A manager backed by its own in-memory broker.
pub fn test_manager() -> (Arc<RoomManager>, Arc<MemoryBroker>) {
    let broker = Arc::new(MemoryBroker::new());
    let manager = Arc::new(RoomManager::new(broker.clone()));
    (manager, broker)
}

/// A manager whose broker is connected to `bus`, like one process in a fleet.
pub fn test_manager_on(bus: &MemoryBus) -> (Arc<RoomManager>, Arc<MemoryBroker>) {
    let broker = Arc::new(bus.connect());
    let manager = Arc::new(RoomManager::new(broker.clone()));
    (manager, broker)
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        redis_url: None,
        cors_allow_any: true,
    }
}

/// Build a test AppState on a fresh in-memory broker.
pub fn test_state() -> (AppState, Arc<MemoryBroker>) {
    let (manager, broker) = test_manager();
    (AppState::new(manager, test_config()), broker)
}

/// Build the full application router wired to the test state.
pub fn test_app() -> (Router, AppState, Arc<MemoryBroker>) {
    let (state, broker) = test_state();
    let app = roomcast_gateway::routes::router().with_state(state.clone());
    (app, state, broker)
}

/// Start an actual TCP server for WebSocket testing. The server runs in
/// the background.
pub async fn start_server(state: AppState) -> SocketAddr {
    let app = roomcast_gateway::routes::router().with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}
