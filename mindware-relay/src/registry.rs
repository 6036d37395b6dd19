//! Connection registry: every live connection, indexed by room and by user.
//!
//! Registration and unregistration run under the room's lock and push a
//! fresh presence snapshot before the lock is released. The user index backs
//! direct-message delivery, which is addressed by user rather than by room.
//!
//! Lock order is always room table → room → user index.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use mindware_proto::chat::ChatMessage;
use parking_lot::RwLock;
use tokio::sync::{Notify, mpsc};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::error::RelayError;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::presence;
use crate::rooms::{DEFAULT_MAX_IDLE_ROOMS, Room, RoomTable};

/// Identity of a registered connection, returned by
/// [`ConnectionRegistry::register`] and consumed by
/// [`ConnectionRegistry::unregister`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    conn_id: ConnectionId,
    room: String,
    user_id: String,
}

impl SessionHandle {
    /// Id of the registered connection.
    #[must_use]
    pub const fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    /// Room the connection joined.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// User bound to the connection.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Registry of live connections.
pub struct ConnectionRegistry {
    rooms: RoomTable,
    users: RwLock<HashMap<String, HashMap<ConnectionId, ConnectionHandle>>>,
    next_seq: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry with the default per-room history cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates an empty registry whose rooms keep `history_capacity` messages.
    #[must_use]
    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self::with_limits(history_capacity, DEFAULT_MAX_IDLE_ROOMS)
    }

    /// Creates an empty registry whose rooms keep `history_capacity`
    /// messages, retaining at most `max_idle_rooms` member-less rooms.
    #[must_use]
    pub fn with_limits(history_capacity: usize, max_idle_rooms: usize) -> Self {
        Self {
            rooms: RoomTable::with_limits(history_capacity, max_idle_rooms),
            users: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registers a connection in `room` for `user_id`.
    ///
    /// The room is created on first join. Every member of the room,
    /// including the new connection, receives the updated `user_list`
    /// before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConnection`] if the outbound queue is
    /// already closed; nothing is registered in that case.
    pub fn register(
        &self,
        room: &str,
        user_id: &str,
        outbound: mpsc::Sender<Message>,
        evict: Arc<Notify>,
    ) -> Result<SessionHandle, RelayError> {
        if outbound.is_closed() {
            tracing::debug!(room = %room, user_id = %user_id, "refusing to register closed connection");
            return Err(RelayError::InvalidConnection);
        }
        let handle = ConnectionHandle::new(room, user_id, outbound, evict);
        let session = SessionHandle {
            conn_id: handle.id(),
            room: room.to_string(),
            user_id: user_id.to_string(),
        };

        loop {
            let room_ref = self.rooms.get_or_create(room);
            let mut guard = room_ref.lock();
            if guard.is_retired() {
                // Collected between lookup and lock; look it up again.
                continue;
            }
            guard.insert(handle.clone());
            self.users
                .write()
                .entry(user_id.to_string())
                .or_default()
                .insert(handle.id(), handle);
            presence::on_membership_changed(&guard);
            break;
        }

        tracing::info!(
            conn_id = %session.conn_id,
            room = %room,
            user_id = %user_id,
            "connection registered"
        );
        Ok(session)
    }

    /// Removes a connection and re-broadcasts the room's presence.
    ///
    /// Returns `true` if the connection was registered. A second call for
    /// the same session is a no-op and produces no presence broadcast.
    pub fn unregister(&self, session: &SessionHandle) -> bool {
        let Some(room_ref) = self.rooms.get(&session.room) else {
            return false;
        };
        let mut guard = room_ref.lock();
        if guard.remove(&session.conn_id).is_none() {
            return false;
        }
        {
            let mut users = self.users.write();
            if let Some(conns) = users.get_mut(&session.user_id) {
                conns.remove(&session.conn_id);
                if conns.is_empty() {
                    users.remove(&session.user_id);
                }
            }
        }
        presence::on_membership_changed(&guard);
        let empty = guard.member_count() == 0;
        drop(guard);

        if empty {
            self.rooms.collect_if_idle(&session.room);
        }
        tracing::info!(
            conn_id = %session.conn_id,
            room = %session.room,
            user_id = %session.user_id,
            "connection unregistered"
        );
        true
    }

    /// Live connections in `room`.
    #[must_use]
    pub fn connections_in_room(&self, room: &str) -> Vec<ConnectionHandle> {
        self.rooms
            .get(room)
            .map(|r| r.lock().members().cloned().collect())
            .unwrap_or_default()
    }

    /// Live connections of `user_id`, across all rooms.
    #[must_use]
    pub fn connections_for_user(&self, user_id: &str) -> Vec<ConnectionHandle> {
        self.users
            .read()
            .get(user_id)
            .map(|conns| conns.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Runs `f` with `room` locked. Returns `None` if the room does not exist.
    ///
    /// This is the per-room serialization point used by the router: any
    /// fan-out performed inside `f` is totally ordered with joins, leaves,
    /// and other messages in the same room.
    pub fn with_room<R>(&self, room: &str, f: impl FnOnce(&mut Room) -> R) -> Option<R> {
        let room_ref = self.rooms.get(room)?;
        let mut guard = room_ref.lock();
        if guard.is_retired() {
            return None;
        }
        Some(f(&mut guard))
    }

    /// Allocates the next relay-wide message sequence number.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Appends a message to the room's history.
    ///
    /// Returns the new history length, or `None` if the room does not exist.
    pub fn append_history(&self, room: &str, message: ChatMessage) -> Option<usize> {
        self.with_room(room, |r| r.history_mut().append(message))
    }

    /// The room's buffered history, oldest first. Empty for unknown rooms.
    #[must_use]
    pub fn history_snapshot(&self, room: &str) -> Vec<ChatMessage> {
        self.with_room(room, |r| r.history().snapshot())
            .unwrap_or_default()
    }

    /// The `n` most recent messages of the room, oldest first.
    #[must_use]
    pub fn history_latest(&self, room: &str, n: usize) -> Vec<ChatMessage> {
        self.with_room(room, |r| r.history().latest(n))
            .unwrap_or_default()
    }

    /// Current presence snapshot of `room`.
    #[must_use]
    pub fn presence(&self, room: &str) -> Vec<String> {
        self.with_room(room, |r| presence::snapshot(r))
            .unwrap_or_default()
    }

    /// The room table.
    #[must_use]
    pub const fn rooms(&self) -> &RoomTable {
        &self.rooms
    }

    /// Total number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.users.read().values().map(HashMap::len).sum()
    }

    /// Sends a WebSocket Close frame to every live connection.
    ///
    /// Each writer task forwards the close, the peer hangs up, and the
    /// sessions unregister through their normal close path.
    pub fn close_all_connections(&self) {
        let users = self.users.read();
        for handle in users.values().flat_map(HashMap::values) {
            tracing::info!(conn_id = %handle.id(), user_id = %handle.user_id(), "sending close frame");
            let _ = handle.deliver(Message::Close(None));
        }
    }
}
