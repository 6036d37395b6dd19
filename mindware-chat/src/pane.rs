//! Client-side view state for one chat room.

use mindware_proto::chat::ChatMessage;
use mindware_proto::frame::{ControlFrame, ServerFrame};

/// Roster, transcript and pending invitations, rebuilt from server frames.
///
/// `user_list` replaces the roster and `history` replaces the transcript.
/// Live messages are kept in relay sequence order; a message whose `seq`
/// is already present is ignored, so a history replay that overlaps live
/// delivery never shows a message twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatPane {
    users: Vec<String>,
    messages: Vec<ChatMessage>,
    invitations: Vec<String>,
}

impl ChatPane {
    /// Creates an empty pane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one server frame. Returns `true` if the pane changed.
    pub fn apply(&mut self, frame: ServerFrame) -> bool {
        match frame {
            ServerFrame::Control(ControlFrame::UserList { users }) => {
                let changed = self.users != users;
                self.users = users;
                changed
            }
            ServerFrame::Control(ControlFrame::History { messages }) => {
                let mut replay = Vec::with_capacity(messages.len());
                for message in messages {
                    insert_ordered(&mut replay, message);
                }
                let changed = self.messages != replay;
                self.messages = replay;
                changed
            }
            ServerFrame::Control(ControlFrame::PrivateChatInvitation { from_user }) => {
                if self.invitations.contains(&from_user) {
                    false
                } else {
                    self.invitations.push(from_user);
                    true
                }
            }
            ServerFrame::Chat(message) => insert_ordered(&mut self.messages, message),
        }
    }

    /// Users currently present in the room.
    #[must_use]
    pub fn users(&self) -> &[String] {
        &self.users
    }

    /// Messages in relay order.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Users who invited this user to a private chat, oldest first.
    #[must_use]
    pub fn invitations(&self) -> &[String] {
        &self.invitations
    }

    /// Forgets a handled invitation.
    pub fn dismiss_invitation(&mut self, from_user: &str) {
        self.invitations.retain(|u| u != from_user);
    }
}

/// Inserts `message` at its `seq` position. Returns `false` for duplicates.
///
/// Messages without a sequence number (`seq == 0`) are appended and never
/// reordered. A sequenced message goes in front of the first sequenced
/// message with a larger `seq`, so the sequenced entries stay sorted even
/// when unsequenced ones sit between them.
fn insert_ordered(messages: &mut Vec<ChatMessage>, message: ChatMessage) -> bool {
    if message.seq == 0 {
        messages.push(message);
        return true;
    }
    if messages.iter().any(|m| m.seq == message.seq) {
        return false;
    }
    match messages.iter().position(|m| m.seq > message.seq) {
        Some(index) => messages.insert(index, message),
        None => messages.push(message),
    }
    true
}
