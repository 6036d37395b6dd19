//! Connection handles: the registry's view of one live WebSocket.
//!
//! A handle pairs the identity bound at connect time (room, user) with a
//! bounded outbound queue drained by the connection's writer task. Delivery
//! never waits: a full queue evicts the slow consumer instead of stalling
//! the sender.

use std::fmt;
use std::sync::Arc;

use axum::extract::ws::Message;
use mindware_proto::frame::{self, ServerFrame};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use crate::error::RelayError;

/// Server-assigned identifier of one connection (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry entry for a live connection.
///
/// Cloning a handle clones the queue sender, not the connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    room: String,
    user_id: String,
    outbound: mpsc::Sender<Message>,
    evict: Arc<Notify>,
}

impl ConnectionHandle {
    /// Creates a handle for a connection bound to `room` and `user_id`.
    ///
    /// `evict` is notified when the outbound queue overflows; the owning
    /// session listens on it and closes the connection.
    #[must_use]
    pub fn new(
        room: impl Into<String>,
        user_id: impl Into<String>,
        outbound: mpsc::Sender<Message>,
        evict: Arc<Notify>,
    ) -> Self {
        Self {
            id: ConnectionId::new(),
            room: room.into(),
            user_id: user_id.into(),
            outbound,
            evict,
        }
    }

    /// Connection id.
    #[must_use]
    pub const fn id(&self) -> ConnectionId {
        self.id
    }

    /// Room this connection joined.
    #[must_use]
    pub fn room(&self) -> &str {
        &self.room
    }

    /// User identity bound at connect time.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns `true` once the writer side has gone away.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }

    /// Queues a message for this connection without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::CapacityExceeded`] if the queue is full (the
    /// connection is signalled for eviction), or
    /// [`RelayError::InvalidConnection`] if the writer has already stopped.
    pub fn deliver(&self, message: Message) -> Result<(), RelayError> {
        match self.outbound.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    room = %self.room,
                    user_id = %self.user_id,
                    "outbound queue full, evicting slow connection"
                );
                self.evict.notify_one();
                Err(RelayError::CapacityExceeded(self.id.to_string()))
            }
            Err(TrySendError::Closed(_)) => Err(RelayError::InvalidConnection),
        }
    }
}

/// Encodes a server frame into a WebSocket text message.
///
/// # Errors
///
/// Returns [`RelayError::MalformedMessage`] if the frame cannot be serialized.
pub fn text_message(frame: &ServerFrame) -> Result<Message, RelayError> {
    let text = frame::encode(frame)?;
    Ok(Message::Text(text.into()))
}
