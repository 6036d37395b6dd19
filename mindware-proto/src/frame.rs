//! Relay frame envelopes.
//!
//! [`ClientFrame`] is what a connected client may send; [`ServerFrame`] is
//! everything the relay sends back. Both travel as JSON text frames.
//!
//! Inbound parsing is deliberately lenient about extra fields (the browser
//! client attaches `timestamp`, `user_id` and `room_id` to broadcasts) and
//! strict about the fields each frame type needs.

use serde::{Deserialize, Serialize};

use crate::chat::{ChatMessage, validate_identifier};
use crate::error::ProtocolError;

/// A parsed frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Ask for the room's recent history.
    GetHistory,
    /// Post a message to every member of the sender's room.
    Broadcast {
        /// Message body.
        text: String,
    },
    /// Send a direct message to one user.
    PrivateMessage {
        /// Addressee user id.
        recipient_id: String,
        /// Message body.
        text: String,
    },
    /// Invite a user to a private conversation.
    PrivateChatRequest {
        /// Invited user id.
        recipient_id: String,
    },
}

/// Loose view of an inbound frame before classification.
#[derive(Debug, Default, Deserialize)]
struct RawClientFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    recipient_id: Option<String>,
}

fn required(
    value: Option<String>,
    kind: &'static str,
    field: &'static str,
) -> Result<String, ProtocolError> {
    match value {
        None => Err(ProtocolError::MissingField { kind, field }),
        Some(v) if v.trim().is_empty() => Err(ProtocolError::EmptyField { field }),
        Some(v) => Ok(v),
    }
}

fn required_recipient(
    value: Option<String>,
    kind: &'static str,
) -> Result<String, ProtocolError> {
    let recipient_id = required(value, kind, "recipient_id")?;
    validate_identifier(&recipient_id)?;
    Ok(recipient_id)
}

impl ClientFrame {
    /// Parses and classifies a raw client text frame.
    ///
    /// Classification follows the `type` field: `get_history`,
    /// `private_message` and `private_chat_request` are recognised; anything
    /// else (including no `type` at all) is a broadcast and must carry `text`
    /// (or its alias `content`).
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::NotJson`] for unparseable input,
    /// [`ProtocolError::InvalidShape`] for JSON of the wrong shape, and
    /// [`ProtocolError::MissingField`] / [`ProtocolError::EmptyField`] /
    /// [`ProtocolError::InvalidIdentifier`] when the declared type's
    /// required fields are not usable.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let frame: RawClientFrame =
            serde_json::from_str(raw).map_err(|e| ProtocolError::from_json(&e))?;

        match frame.kind.as_deref() {
            Some("get_history") => Ok(Self::GetHistory),
            Some("private_message") => {
                let recipient_id = required_recipient(frame.recipient_id, "private_message")?;
                let text = required(frame.text.or(frame.content), "private_message", "text")?;
                Ok(Self::PrivateMessage { recipient_id, text })
            }
            Some("private_chat_request") => {
                let recipient_id =
                    required_recipient(frame.recipient_id, "private_chat_request")?;
                Ok(Self::PrivateChatRequest { recipient_id })
            }
            _ => {
                let text = required(frame.text.or(frame.content), "broadcast", "text")?;
                Ok(Self::Broadcast { text })
            }
        }
    }

    /// Wraps a raw non-JSON frame as a broadcast of its literal text.
    #[must_use]
    pub fn plain_text(raw: &str) -> Self {
        Self::Broadcast {
            text: raw.to_string(),
        }
    }

    /// Serializes the frame the way a client puts it on the wire.
    #[must_use]
    pub fn to_json(&self) -> String {
        let value = match self {
            Self::GetHistory => serde_json::json!({ "type": "get_history" }),
            Self::Broadcast { text } => serde_json::json!({ "text": text }),
            Self::PrivateMessage { recipient_id, text } => serde_json::json!({
                "type": "private_message",
                "text": text,
                "recipient_id": recipient_id,
            }),
            Self::PrivateChatRequest { recipient_id } => serde_json::json!({
                "type": "private_chat_request",
                "recipient_id": recipient_id,
            }),
        };
        value.to_string()
    }
}

/// Relay-originated control frames. Never stored in history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Full presence snapshot of a room.
    UserList {
        /// Sorted, de-duplicated user ids with a live connection.
        users: Vec<String>,
    },
    /// Recent room history, oldest first.
    History {
        /// Buffered messages.
        messages: Vec<ChatMessage>,
    },
    /// Someone wants to start a private conversation.
    PrivateChatInvitation {
        /// Inviting user id.
        from_user: String,
    },
}

/// Any frame the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerFrame {
    /// A control frame carrying a `type` tag.
    Control(ControlFrame),
    /// A chat message (bare object for broadcasts).
    Chat(ChatMessage),
}

impl From<ControlFrame> for ServerFrame {
    fn from(frame: ControlFrame) -> Self {
        Self::Control(frame)
    }
}

impl From<ChatMessage> for ServerFrame {
    fn from(msg: ChatMessage) -> Self {
        Self::Chat(msg)
    }
}

/// Encodes a [`ServerFrame`] as JSON text.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
pub fn encode(frame: &ServerFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes a [`ServerFrame`] from JSON text.
///
/// # Errors
///
/// Returns [`ProtocolError::NotJson`] or [`ProtocolError::InvalidShape`].
pub fn decode(text: &str) -> Result<ServerFrame, ProtocolError> {
    serde_json::from_str(text).map_err(|e| ProtocolError::from_json(&e))
}
