//! Local room membership: which of this process's connections are in which room.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use super::handle::ClientHandle;

/// A client handle shared between the transport and the registry.
pub type SharedHandle = Arc<dyn ClientHandle>;

#[derive(Default)]
struct RegistryState {
    /// Room key → members keyed by handle id. A key is present iff non-empty.
    rooms: HashMap<String, BTreeMap<String, SharedHandle>>,
    /// Handle id → the one room it is in.
    handle_rooms: HashMap<String, String>,
}

/// Shared registry of locally hosted rooms.
///
/// One `parking_lot::Mutex` guards the whole map. It is only held for the
/// duration of a single call and never across an `.await`.
#[derive(Default)]
pub struct RoomRegistry {
    state: Mutex<RegistryState>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` to `room`. Returns true if the room did not exist before.
    ///
    /// Registering a handle already in `room` is a no-op. A handle already in
    /// a different room is left where it is.
    pub fn register(&self, room: &str, handle: SharedHandle) -> bool {
        let mut state = self.state.lock();
        let id = handle.id().to_string();

        if let Some(current) = state.handle_rooms.get(&id) {
            if current != room {
                invariant_violation(&id, current, room, "register");
            }
            return false;
        }

        let created = !state.rooms.contains_key(room);
        state
            .rooms
            .entry(room.to_string())
            .or_default()
            .insert(id.clone(), handle);
        state.handle_rooms.insert(id, room.to_string());
        created
    }

    /// Remove `handle` from `room`. Returns true if the room is now empty
    /// (and has been removed). Unknown handles are ignored.
    pub fn deregister(&self, room: &str, handle: &dyn ClientHandle) -> bool {
        let mut state = self.state.lock();
        let id = handle.id();

        match state.handle_rooms.get(id) {
            None => return false,
            Some(current) if current != room => {
                invariant_violation(id, current, room, "deregister");
                return false;
            }
            Some(_) => {}
        }
        state.handle_rooms.remove(id);

        let Some(members) = state.rooms.get_mut(room) else {
            return false;
        };
        members.remove(id);
        if members.is_empty() {
            state.rooms.remove(room);
            true
        } else {
            false
        }
    }

    /// Snapshot of the handles in `room`, ordered by handle id.
    pub fn members(&self, room: &str) -> Vec<SharedHandle> {
        self.state
            .lock()
            .rooms
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The room a handle is currently registered in.
    pub fn room_of(&self, handle_id: &str) -> Option<String> {
        self.state.lock().handle_rooms.get(handle_id).cloned()
    }

    pub fn contains_room(&self, room: &str) -> bool {
        self.state.lock().rooms.contains_key(room)
    }

    pub fn room_count(&self) -> usize {
        self.state.lock().rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().handle_rooms.len()
    }

    /// `(room, member count)` for every room, sorted by room key.
    pub fn room_sizes(&self) -> Vec<(String, usize)> {
        let state = self.state.lock();
        let mut sizes: Vec<(String, usize)> = state
            .rooms
            .iter()
            .map(|(room, members)| (room.clone(), members.len()))
            .collect();
        sizes.sort();
        sizes
    }
}

/// A handle showed up in a room other than the one it is registered in.
/// Fatal in debug builds; logged and ignored in release builds.
fn invariant_violation(handle_id: &str, registered: &str, requested: &str, op: &str) {
    tracing::error!(
        conn_id = %handle_id,
        registered_room = %registered,
        requested_room = %requested,
        op,
        "registry invariant violated: handle belongs to another room"
    );
    debug_assert!(
        false,
        "registry invariant violated: {handle_id} is in {registered}, not {requested} ({op})"
    );
}
