//! The per-process broadcast listener.
//!
//! Drains the broker's single subscriber stream and hands each message to
//! the local members of the room it was published to.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::broker::{BrokerMessage, PubSubBroker};

use super::registry::RoomRegistry;

const NOT_STARTED: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// Lifecycle of the listener task: `NotStarted → Running → Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    NotStarted,
    Running,
    Stopped,
}

/// Atomic holder for [`ListenerState`], shared by the manager and the task.
#[derive(Debug, Default)]
pub struct ListenerStatus(AtomicU8);

impl ListenerStatus {
    pub fn get(&self) -> ListenerState {
        match self.0.load(Ordering::Acquire) {
            NOT_STARTED => ListenerState::NotStarted,
            RUNNING => ListenerState::Running,
            _ => ListenerState::Stopped,
        }
    }

    /// `NotStarted → Running`. Returns true for exactly one caller.
    pub fn try_start(&self) -> bool {
        self.0
            .compare_exchange(NOT_STARTED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `NotStarted → Stopped`, so no listener is ever started afterwards.
    pub fn prevent_start(&self) -> bool {
        self.0
            .compare_exchange(NOT_STARTED, STOPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn mark_stopped(&self) {
        self.0.store(STOPPED, Ordering::Release);
    }
}

/// Run the listener until the broker stream ends, a receive fails, or
/// shutdown is signalled. Per-message problems never end the loop.
pub async fn run(
    broker: Arc<dyn PubSubBroker>,
    registry: Arc<RoomRegistry>,
    status: Arc<ListenerStatus>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!("broadcast listener started");

    loop {
        if *shutdown.borrow() {
            tracing::info!("broadcast listener shutting down");
            break;
        }

        let next = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    // Manager dropped.
                    tracing::info!("broadcast listener detached; stopping");
                    break;
                }
                continue;
            }
            next = broker.next_message() => next,
        };

        match next {
            Ok(Some(msg)) => {
                deliver(&registry, &msg);
            }
            Ok(None) => {
                tracing::error!("broker message stream ended; broadcast listener stopped");
                break;
            }
            Err(err) => {
                tracing::error!(%err, "broker receive failed; broadcast listener stopped");
                break;
            }
        }
    }

    status.mark_stopped();
}

/// Send `msg` to every local member of its room. Returns how many members
/// accepted it; failures are logged and skipped.
pub fn deliver(registry: &RoomRegistry, msg: &BrokerMessage) -> usize {
    let Some(text) = msg.payload_str() else {
        tracing::warn!(room_id = %msg.channel, len = msg.payload.len(), "dropping non-UTF-8 broker payload");
        return 0;
    };

    let members = registry.members(&msg.channel);
    if members.is_empty() {
        tracing::trace!(room_id = %msg.channel, "no local members for broadcast");
        return 0;
    }

    let mut delivered = 0;
    for handle in &members {
        match handle.send_text(text) {
            Ok(()) => delivered += 1,
            Err(err) => {
                tracing::debug!(
                    room_id = %msg.channel,
                    conn_id = %handle.id(),
                    %err,
                    "broadcast not delivered to client"
                );
            }
        }
    }

    tracing::trace!(room_id = %msg.channel, delivered, members = members.len(), "broadcast delivered");
    delivered
}
