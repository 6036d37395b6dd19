//! Presence tracking: who is online in a room.
//!
//! Presence is never stored. It is derived from the room's member
//! connections each time membership changes and pushed to every member as a
//! full `user_list` snapshot. Callers hold the room lock, so a snapshot can
//! never be stale relative to the join or leave that triggered it.

use std::collections::BTreeSet;

use mindware_proto::frame::{ControlFrame, ServerFrame};

use crate::connection::text_message;
use crate::rooms::Room;

/// Sorted, de-duplicated ids of users with at least one live connection.
#[must_use]
pub fn snapshot(room: &Room) -> Vec<String> {
    room.members()
        .map(|handle| handle.user_id().to_string())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Builds the `user_list` frame for the room's current membership.
#[must_use]
pub fn user_list_frame(room: &Room) -> ServerFrame {
    ServerFrame::Control(ControlFrame::UserList {
        users: snapshot(room),
    })
}

/// Pushes the room's presence snapshot to every member.
///
/// Must be called with the room locked, once per net membership change.
/// Returns the number of connections the snapshot was queued on.
pub fn on_membership_changed(room: &Room) -> usize {
    let frame = user_list_frame(room);
    match text_message(&frame) {
        Ok(message) => {
            let delivered = room.fan_out(&message);
            tracing::debug!(
                room = %room.id(),
                members = room.member_count(),
                delivered,
                "presence broadcast"
            );
            delivered
        }
        Err(e) => {
            tracing::error!(room = %room.id(), error = %e, "failed to encode user list");
            0
        }
    }
}
