//! Message routing: classify an inbound frame and fan it out.
//!
//! All routing for a sender happens under the sender's room lock, so within
//! a room every participant observes broadcasts and direct messages in the
//! same relative order, and a history replay is ordered against live
//! fan-out (a message is either in the replay or delivered after it).
//!
//! Identity always comes from the session, never from the frame: any
//! `user_id`, `room_id` or `timestamp` a client puts on the wire is ignored.

use std::collections::HashMap;

use mindware_proto::chat::ChatMessage;
use mindware_proto::frame::{ClientFrame, ControlFrame, ServerFrame};

use crate::connection::{ConnectionHandle, text_message};
use crate::error::RelayError;
use crate::registry::{ConnectionRegistry, SessionHandle};

/// Default maximum accepted frame size in bytes (64 KB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Router limits and compatibility switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    /// Frames longer than this many bytes are dropped.
    pub max_payload_size: usize,
    /// Treat frames that are not JSON as a broadcast of their raw text.
    pub plain_text_fallback: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            plain_text_fallback: false,
        }
    }
}

/// What a successfully routed frame did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    /// History replayed to the sender.
    History {
        /// Number of messages in the replay.
        messages: usize,
    },
    /// Broadcast appended to history and fanned out to the room.
    Broadcast {
        /// Sequence number assigned to the message.
        seq: u64,
        /// Connections that accepted the message.
        delivered: usize,
    },
    /// Direct message delivered to recipient and sender connections.
    Private {
        /// Sequence number assigned to the message.
        seq: u64,
        /// Connections that accepted the message.
        delivered: usize,
    },
    /// Chat invitation delivered to the recipient's connections.
    Invitation {
        /// Connections that accepted the invitation.
        delivered: usize,
    },
}

/// Relay wall-clock time in the format the chat client displays.
#[must_use]
pub fn server_timestamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}

/// Routes one raw text frame from `session`.
///
/// # Errors
///
/// - [`RelayError::MalformedMessage`] if the frame is oversized,
///   unparseable, or lacks a required field. Nothing is delivered.
/// - [`RelayError::UnknownRecipient`] if a direct message or invitation
///   names a user with no live connection. A direct message has still been
///   echoed to the sender's own connections.
/// - [`RelayError::InvalidConnection`] if the session is no longer
///   registered.
/// - [`RelayError::CapacityExceeded`] if the sender's own queue overflowed
///   while replaying history.
pub fn route(
    registry: &ConnectionRegistry,
    session: &SessionHandle,
    raw: &str,
    config: &RouterConfig,
) -> Result<Routed, RelayError> {
    if raw.len() > config.max_payload_size {
        return Err(RelayError::MalformedMessage(format!(
            "frame of {} bytes exceeds limit of {}",
            raw.len(),
            config.max_payload_size
        )));
    }

    let frame = match ClientFrame::parse(raw) {
        Ok(frame) => frame,
        Err(e) if e.is_not_json() && config.plain_text_fallback && !raw.trim().is_empty() => {
            ClientFrame::plain_text(raw)
        }
        Err(e) => return Err(e.into()),
    };

    match frame {
        ClientFrame::GetHistory => replay_history(registry, session),
        ClientFrame::Broadcast { text } => broadcast(registry, session, text),
        ClientFrame::PrivateMessage { recipient_id, text } => {
            send_private(registry, session, recipient_id, text)
        }
        ClientFrame::PrivateChatRequest { recipient_id } => {
            invite(registry, session, recipient_id)
        }
    }
}

fn replay_history(
    registry: &ConnectionRegistry,
    session: &SessionHandle,
) -> Result<Routed, RelayError> {
    registry
        .with_room(session.room(), |room| {
            let sender = room
                .member(&session.conn_id())
                .ok_or(RelayError::InvalidConnection)?;
            let messages = room.history().snapshot();
            let count = messages.len();
            let wire = text_message(&ServerFrame::Control(ControlFrame::History { messages }))?;
            sender.deliver(wire)?;
            Ok(Routed::History { messages: count })
        })
        .unwrap_or(Err(RelayError::InvalidConnection))
}

fn broadcast(
    registry: &ConnectionRegistry,
    session: &SessionHandle,
    text: String,
) -> Result<Routed, RelayError> {
    registry
        .with_room(session.room(), |room| {
            if room.member(&session.conn_id()).is_none() {
                return Err(RelayError::InvalidConnection);
            }
            let seq = registry.next_seq();
            let message =
                ChatMessage::broadcast(room.id(), session.user_id(), text, server_timestamp(), seq);
            let wire = text_message(&ServerFrame::Chat(message.clone()))?;
            room.history_mut().append(message);
            let delivered = room.fan_out(&wire);
            Ok(Routed::Broadcast { seq, delivered })
        })
        .unwrap_or(Err(RelayError::InvalidConnection))
}

/// Union of several connection sets, each connection once.
fn distinct(sets: impl IntoIterator<Item = Vec<ConnectionHandle>>) -> Vec<ConnectionHandle> {
    let mut seen = HashMap::new();
    for handle in sets.into_iter().flatten() {
        seen.entry(handle.id()).or_insert(handle);
    }
    seen.into_values().collect()
}

fn send_private(
    registry: &ConnectionRegistry,
    session: &SessionHandle,
    recipient_id: String,
    text: String,
) -> Result<Routed, RelayError> {
    // The sender's room lock is held only for ordering; the message itself
    // is addressed by user and never touches the room's members or history.
    registry
        .with_room(session.room(), move |_room| {
            let seq = registry.next_seq();
            let message = ChatMessage::private(
                session.user_id(),
                recipient_id.as_str(),
                text,
                server_timestamp(),
                seq,
            );
            let wire = text_message(&ServerFrame::Chat(message))?;

            let recipients = registry.connections_for_user(&recipient_id);
            let recipient_online = !recipients.is_empty();
            let targets = distinct([recipients, registry.connections_for_user(session.user_id())]);
            let delivered = targets
                .iter()
                .filter(|handle| handle.deliver(wire.clone()).is_ok())
                .count();

            if recipient_online {
                Ok(Routed::Private { seq, delivered })
            } else {
                Err(RelayError::UnknownRecipient(recipient_id))
            }
        })
        .unwrap_or(Err(RelayError::InvalidConnection))
}

fn invite(
    registry: &ConnectionRegistry,
    session: &SessionHandle,
    recipient_id: String,
) -> Result<Routed, RelayError> {
    let wire = text_message(&ServerFrame::Control(ControlFrame::PrivateChatInvitation {
        from_user: session.user_id().to_string(),
    }))?;
    let recipients = registry.connections_for_user(&recipient_id);
    if recipients.is_empty() {
        return Err(RelayError::UnknownRecipient(recipient_id));
    }
    let delivered = recipients
        .iter()
        .filter(|handle| handle.deliver(wire.clone()).is_ok())
        .count();
    Ok(Routed::Invitation { delivered })
}
