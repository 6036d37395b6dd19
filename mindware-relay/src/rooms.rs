//! Room table for the relay server.
//!
//! A [`Room`] owns its member connections and its [`HistoryBuffer`]; all
//! per-room work (join, leave, presence snapshot, history append, fan-out)
//! happens under the room's mutex, which makes each room a single writer.
//!
//! Rooms are created lazily on first join. When the last member leaves, a
//! room without history is collected at once; a room with history is kept
//! so it can be replayed later. Room ids are chosen by clients, so the
//! number of member-less rooms kept this way is capped: past the cap the
//! longest-idle room is dropped together with its history. Entries are
//! ephemeral and lost on relay restart, same as the connection registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use parking_lot::{Mutex, RwLock};

use crate::connection::{ConnectionHandle, ConnectionId};
use crate::history::{DEFAULT_HISTORY_CAPACITY, HistoryBuffer};

/// Default number of member-less rooms that keep their history.
pub const DEFAULT_MAX_IDLE_ROOMS: usize = 1024;

/// A chat room: live members plus recent history.
#[derive(Debug)]
pub struct Room {
    id: String,
    members: HashMap<ConnectionId, ConnectionHandle>,
    history: HistoryBuffer,
    idle_since: Option<u64>,
    retired: bool,
}

impl Room {
    fn new(id: &str, history_capacity: usize) -> Self {
        Self {
            id: id.to_string(),
            members: HashMap::new(),
            history: HistoryBuffer::with_capacity(history_capacity),
            idle_since: None,
            retired: false,
        }
    }

    /// Room identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Iterates over the room's live connections.
    pub fn members(&self) -> impl Iterator<Item = &ConnectionHandle> {
        self.members.values()
    }

    /// Looks up one member connection.
    #[must_use]
    pub fn member(&self, id: &ConnectionId) -> Option<&ConnectionHandle> {
        self.members.get(id)
    }

    /// Number of live connections in the room.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// The room's recent history.
    #[must_use]
    pub const fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub(crate) const fn history_mut(&mut self) -> &mut HistoryBuffer {
        &mut self.history
    }

    pub(crate) fn insert(&mut self, handle: ConnectionHandle) {
        self.idle_since = None;
        self.members.insert(handle.id(), handle);
    }

    pub(crate) fn remove(&mut self, id: &ConnectionId) -> Option<ConnectionHandle> {
        self.members.remove(id)
    }

    /// Queues `message` on every member connection.
    ///
    /// Returns how many connections accepted it. Members whose queue is full
    /// are signalled for eviction by [`ConnectionHandle::deliver`].
    pub fn fan_out(&self, message: &Message) -> usize {
        self.members
            .values()
            .filter(|handle| handle.deliver(message.clone()).is_ok())
            .count()
    }

    /// A room with no members and no history can be dropped.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.members.is_empty() && self.history.is_empty()
    }

    pub(crate) const fn is_retired(&self) -> bool {
        self.retired
    }
}

/// Directory of live rooms, keyed by room id.
pub struct RoomTable {
    rooms: RwLock<HashMap<String, Arc<Mutex<Room>>>>,
    history_capacity: usize,
    max_idle_rooms: usize,
    idle_clock: AtomicU64,
}

impl Default for RoomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomTable {
    /// Creates an empty table whose rooms use the default history cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Creates an empty table whose rooms keep `history_capacity` messages.
    #[must_use]
    pub fn with_history_capacity(history_capacity: usize) -> Self {
        Self::with_limits(history_capacity, DEFAULT_MAX_IDLE_ROOMS)
    }

    /// Creates an empty table whose rooms keep `history_capacity` messages
    /// and which retains at most `max_idle_rooms` member-less rooms.
    #[must_use]
    pub fn with_limits(history_capacity: usize, max_idle_rooms: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            history_capacity,
            max_idle_rooms,
            idle_clock: AtomicU64::new(0),
        }
    }

    /// Returns the room, creating it if this is the first join.
    ///
    /// The caller must check [`Room::is_retired`] after locking: a room can
    /// be collected between this lookup and the lock.
    pub(crate) fn get_or_create(&self, room_id: &str) -> Arc<Mutex<Room>> {
        if let Some(room) = self.rooms.read().get(room_id) {
            return Arc::clone(room);
        }
        let mut rooms = self.rooms.write();
        let room = rooms.entry(room_id.to_string()).or_insert_with(|| {
            tracing::debug!(room = %room_id, "room created");
            Arc::new(Mutex::new(Room::new(room_id, self.history_capacity)))
        });
        Arc::clone(room)
    }

    /// Returns the room if it exists.
    #[must_use]
    pub fn get(&self, room_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.read().get(room_id).cloned()
    }

    /// Tidies up after the last member of `room_id` left.
    ///
    /// A room without history is dropped. A room with history is kept for
    /// replay, but only the `max_idle_rooms` most recently emptied rooms are
    /// retained; older ones are dropped with their history. Returns `true`
    /// if `room_id` itself was removed.
    pub(crate) fn collect_if_idle(&self, room_id: &str) -> bool {
        let mut rooms = self.rooms.write();
        let Some(room) = rooms.get(room_id) else {
            return false;
        };
        let mut guard = room.lock();
        if guard.member_count() > 0 {
            return false;
        }
        if guard.history.is_empty() {
            guard.retired = true;
            drop(guard);
            rooms.remove(room_id);
            drop(rooms);
            tracing::debug!(room = %room_id, "idle room collected");
            return true;
        }
        if guard.idle_since.is_none() {
            guard.idle_since = Some(self.idle_clock.fetch_add(1, Ordering::Relaxed));
        }
        drop(guard);
        let dropped = self.trim_idle_rooms(&mut rooms);
        drop(rooms);
        dropped.iter().any(|id| id == room_id)
    }

    /// Drops the longest-idle rooms beyond `max_idle_rooms`.
    fn trim_idle_rooms(&self, rooms: &mut HashMap<String, Arc<Mutex<Room>>>) -> Vec<String> {
        let mut idle: Vec<(u64, String)> = rooms
            .iter()
            .filter_map(|(id, room)| room.lock().idle_since.map(|since| (since, id.clone())))
            .collect();
        if idle.len() <= self.max_idle_rooms {
            return Vec::new();
        }
        idle.sort_unstable();
        let excess = idle.len() - self.max_idle_rooms;
        idle.into_iter()
            .take(excess)
            .filter_map(|(_, id)| {
                let room = rooms.remove(&id)?;
                room.lock().retired = true;
                tracing::debug!(room = %id, "idle room dropped with its history");
                Some(id)
            })
            .collect()
    }

    /// Number of rooms currently in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.read().len()
    }

    /// Returns `true` if no room exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.read().is_empty()
    }

    /// Ids of every room in the table, sorted.
    #[must_use]
    pub fn room_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rooms.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}
