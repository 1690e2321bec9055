//! Connection lifecycle: join/leave rooms, keep broker subscriptions in step
//! with local membership, and own the broadcast listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broker::PubSubBroker;

use super::handle::ClientHandle;
use super::listener::{self, ListenerState, ListenerStatus};
use super::message::RoomMessage;
use super::registry::{RoomRegistry, SharedHandle};
use super::{validate_room, RoomError};

/// Per-process room manager. Construct once at startup and share via `Arc`.
///
/// Subscribe/unsubscribe calls are serialized with the registry transitions
/// that trigger them by `lifecycle`, so the broker sees them in the same
/// order. The registry's own lock is never held across broker I/O.
pub struct RoomManager {
    registry: Arc<RoomRegistry>,
    broker: Arc<dyn PubSubBroker>,
    lifecycle: Arc<tokio::sync::Mutex<()>>,
    status: Arc<ListenerStatus>,
    listener_starts: AtomicUsize,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl RoomManager {
    pub fn new(broker: Arc<dyn PubSubBroker>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            registry: Arc::new(RoomRegistry::new()),
            broker,
            lifecycle: Arc::new(tokio::sync::Mutex::new(())),
            status: Arc::new(ListenerStatus::default()),
            listener_starts: AtomicUsize::new(0),
            listener_task: Mutex::new(None),
            shutdown,
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    /// Join `handle` to `room`.
    ///
    /// When this makes the room locally non-empty the broker subscription is
    /// in place before this returns. On a subscribe failure the registration
    /// is rolled back and no join notice is sent. A handle that is already in
    /// another room is refused.
    pub async fn connect(&self, handle: SharedHandle, room: &str) -> Result<(), RoomError> {
        validate_room(room)?;

        {
            let _lifecycle = self.lifecycle.lock().await;
            if let Some(current) = self.registry.room_of(handle.id()) {
                if current != room {
                    tracing::warn!(room_id = %room, conn_id = %handle.id(), current_room = %current, "handle already in another room");
                    return Err(RoomError::AlreadyJoined(current));
                }
            }

            if self.registry.register(room, handle.clone()) {
                let mut pending = PendingTransition::new(self, room, Some(handle.clone()));
                let subscribed = self.broker.subscribe(room).await;
                pending.disarm();

                if let Err(err) = subscribed {
                    self.registry.deregister(room, handle.as_ref());
                    tracing::warn!(room_id = %room, conn_id = %handle.id(), %err, "subscribe failed; join rolled back");
                    return Err(err.into());
                }
                tracing::info!(room_id = %room, "room opened; subscribed");
            }
        }

        self.ensure_listener();

        tracing::debug!(room_id = %room, conn_id = %handle.id(), "client joined room");
        if let Err(err) = handle.send_text(&RoomMessage::joined(room).to_json()) {
            tracing::debug!(room_id = %room, conn_id = %handle.id(), %err, "join notice not delivered");
        }
        Ok(())
    }

    /// Remove `handle` from `room`, unsubscribing when the room empties.
    /// Unknown handles are a no-op.
    pub async fn disconnect(&self, handle: &dyn ClientHandle, room: &str) -> Result<(), RoomError> {
        let _lifecycle = self.lifecycle.lock().await;
        if self.registry.deregister(room, handle) {
            let mut pending = PendingTransition::new(self, room, None);
            let unsubscribed = self.broker.unsubscribe(room).await;
            pending.disarm();

            unsubscribed?;
            tracing::info!(room_id = %room, "room closed; unsubscribed");
        }
        tracing::debug!(room_id = %room, conn_id = %handle.id(), "client left room");
        Ok(())
    }

    /// Publish `message` to `room` on the broker. Local members receive it
    /// through the listener like everyone else.
    pub async fn send(&self, room: &str, message: &str) -> Result<(), RoomError> {
        validate_room(room)?;
        self.broker.publish(room, message).await?;
        Ok(())
    }

    /// Publish a [`RoomMessage`] as JSON.
    pub async fn send_message(&self, message: &RoomMessage) -> Result<(), RoomError> {
        self.send(&message.room_id, &message.to_json()).await
    }

    pub fn listener_state(&self) -> ListenerState {
        self.status.get()
    }

    /// How many listener tasks this manager has ever spawned (0 or 1).
    pub fn listener_starts(&self) -> usize {
        self.listener_starts.load(Ordering::Acquire)
    }

    /// Stop the listener (if running) and wait for it to exit. No listener
    /// is started after this.
    pub async fn shutdown(&self) {
        if self.status.prevent_start() {
            return;
        }
        self.shutdown.send_replace(true);
        let task = self.listener_task.lock().take();
        if let Some(task) = task {
            if let Err(err) = task.await {
                tracing::warn!(?err, "broadcast listener did not exit cleanly");
            }
        }
        self.status.mark_stopped();
    }

    fn ensure_listener(&self) {
        if !self.status.try_start() {
            return;
        }
        self.listener_starts.fetch_add(1, Ordering::AcqRel);

        let task = tokio::spawn(listener::run(
            self.broker.clone(),
            self.registry.clone(),
            self.status.clone(),
            self.shutdown.subscribe(),
        ));
        *self.listener_task.lock() = Some(task);
    }

    /// Bring the broker subscription for `room` back in line with local
    /// membership once the lifecycle lock is free: unsubscribe if the room is
    /// still empty by then.
    fn spawn_resync(&self, room: &str) {
        let room = room.to_string();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::error!(room_id = %room, "no runtime to resync room subscription");
            return;
        };

        let lifecycle = self.lifecycle.clone();
        let registry = self.registry.clone();
        let broker = self.broker.clone();
        runtime.spawn(async move {
            let _lifecycle = lifecycle.lock().await;
            if registry.contains_room(&room) {
                return;
            }
            match broker.unsubscribe(&room).await {
                Ok(()) => tracing::info!(room_id = %room, "room subscription resynced; unsubscribed"),
                Err(err) => tracing::warn!(room_id = %room, %err, "resync unsubscribe failed"),
            }
        });
    }
}

/// A registry change whose broker call is still in flight.
///
/// If the caller is cancelled before [`PendingTransition::disarm`], the
/// half-joined handle (if any) is removed and a resync of the room's
/// subscription is spawned.
struct PendingTransition<'a> {
    manager: &'a RoomManager,
    room: &'a str,
    rollback: Option<SharedHandle>,
    armed: bool,
}

impl<'a> PendingTransition<'a> {
    fn new(manager: &'a RoomManager, room: &'a str, rollback: Option<SharedHandle>) -> Self {
        Self {
            manager,
            room,
            rollback,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PendingTransition<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        if let Some(handle) = self.rollback.take() {
            self.manager.registry.deregister(self.room, handle.as_ref());
            tracing::warn!(room_id = %self.room, conn_id = %handle.id(), "join cancelled during subscribe; rolled back");
        } else {
            tracing::warn!(room_id = %self.room, "leave cancelled during unsubscribe");
        }
        self.manager.spawn_resync(self.room);
    }
}
