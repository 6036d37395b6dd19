//! Chat message record and room naming helpers.
//!
//! A [`ChatMessage`] is what the relay stores in room history and fans out to
//! clients. Broadcast messages serialize as bare objects (no `type` field),
//! private messages carry `"type": "private_message"`, which is the shape the
//! browser client already renders.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The shared public room every client lands in by default.
pub const GLOBAL_ROOM: &str = "global";

/// The room used by clients in "friends" mode for private conversations.
pub const FRIENDS_ROOM: &str = "friends";

/// Maximum length, in characters, of a room or user identifier.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Builds the synthetic per-pair room for a direct conversation.
///
/// The two user ids are ordered so both sides compute the same room.
#[must_use]
pub fn direct_room(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("dm:{lo}:{hi}")
}

/// Checks that a room or user identifier is usable as a routing key.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidIdentifier`] if the identifier is blank,
/// longer than [`MAX_IDENTIFIER_LEN`] characters, or contains control
/// characters.
pub fn validate_identifier(id: &str) -> Result<(), ProtocolError> {
    if id.trim().is_empty() {
        return Err(ProtocolError::InvalidIdentifier(
            "identifier is empty".to_string(),
        ));
    }
    let len = id.chars().count();
    if len > MAX_IDENTIFIER_LEN {
        return Err(ProtocolError::InvalidIdentifier(format!(
            "identifier is {len} characters (max {MAX_IDENTIFIER_LEN})"
        )));
    }
    if id.chars().any(char::is_control) {
        return Err(ProtocolError::InvalidIdentifier(
            "identifier contains control characters".to_string(),
        ));
    }
    Ok(())
}

/// Addressing mode of a chat message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Delivered to every connection in the sender's room.
    #[default]
    #[serde(rename = "broadcast")]
    Broadcast,
    /// Delivered to the recipient's and the sender's connections only.
    #[serde(rename = "private_message")]
    Private,
}

impl MessageKind {
    /// Returns `true` for [`MessageKind::Broadcast`].
    #[must_use]
    #[allow(clippy::trivially_copy_pass_by_ref)] // signature required by serde's skip_serializing_if
    pub const fn is_broadcast(&self) -> bool {
        matches!(self, Self::Broadcast)
    }
}

/// An immutable chat message as stamped by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Broadcast or private. Omitted from the wire for broadcasts.
    #[serde(rename = "type", default, skip_serializing_if = "MessageKind::is_broadcast")]
    pub kind: MessageKind,
    /// Message body.
    #[serde(alias = "content")]
    pub text: String,
    /// User id of the sender, bound at registration.
    pub user_id: String,
    /// Room the broadcast was sent to. `None` for private messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    /// Addressee of a private message. `None` for broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,
    /// Relay wall-clock time, formatted for display (`HH:MM`).
    pub timestamp: String,
    /// Relay-assigned sequence number; the ordering key.
    #[serde(default)]
    pub seq: u64,
}

impl ChatMessage {
    /// Creates a broadcast message for `room_id`.
    #[must_use]
    pub fn broadcast(
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
        seq: u64,
    ) -> Self {
        Self {
            kind: MessageKind::Broadcast,
            text: text.into(),
            user_id: user_id.into(),
            room_id: Some(room_id.into()),
            recipient_id: None,
            timestamp: timestamp.into(),
            seq,
        }
    }

    /// Creates a private message from `user_id` to `recipient_id`.
    #[must_use]
    pub fn private(
        user_id: impl Into<String>,
        recipient_id: impl Into<String>,
        text: impl Into<String>,
        timestamp: impl Into<String>,
        seq: u64,
    ) -> Self {
        Self {
            kind: MessageKind::Private,
            text: text.into(),
            user_id: user_id.into(),
            room_id: None,
            recipient_id: Some(recipient_id.into()),
            timestamp: timestamp.into(),
            seq,
        }
    }

    /// Returns `true` if this is a direct message.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        matches!(self.kind, MessageKind::Private)
    }
}
