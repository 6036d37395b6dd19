//! Property-based tests for the relay wire protocol.
//!
//! Uses proptest to verify:
//! 1. Arbitrary client input never panics the frame parser.
//! 2. Every frame the relay can emit decodes back to the same frame.
//! 3. Any text a client can send as a broadcast survives client-side
//!    serialization and relay-side parsing unchanged.

use mindware_proto::chat::ChatMessage;
use mindware_proto::frame::{self, ClientFrame, ControlFrame, ServerFrame};
use proptest::prelude::*;

/// Strategy for identifiers that pass relay validation.
fn arb_identifier() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9_-]{0,31}"
}

/// Strategy for non-blank message bodies.
fn arb_text() -> impl Strategy<Value = String> {
    "[^\x00]{0,256}[a-z][^\x00]{0,256}"
}

fn arb_chat_message() -> impl Strategy<Value = ChatMessage> {
    (
        any::<bool>(),
        arb_identifier(),
        arb_identifier(),
        arb_text(),
        "[0-2][0-9]:[0-5][0-9]",
        any::<u64>(),
    )
        .prop_map(|(private, user, other, text, timestamp, seq)| {
            if private {
                ChatMessage::private(user, other, text, timestamp, seq)
            } else {
                ChatMessage::broadcast(other, user, text, timestamp, seq)
            }
        })
}

fn arb_server_frame() -> impl Strategy<Value = ServerFrame> {
    prop_oneof![
        arb_chat_message().prop_map(ServerFrame::Chat),
        prop::collection::vec(arb_identifier(), 0..8)
            .prop_map(|users| ServerFrame::Control(ControlFrame::UserList { users })),
        prop::collection::vec(arb_chat_message(), 0..8)
            .prop_map(|messages| ServerFrame::Control(ControlFrame::History { messages })),
        arb_identifier().prop_map(|from_user| ServerFrame::Control(
            ControlFrame::PrivateChatInvitation { from_user }
        )),
    ]
}

proptest! {
    #[test]
    fn parse_never_panics_on_arbitrary_input(raw in ".*") {
        let _ = ClientFrame::parse(&raw);
    }

    #[test]
    fn parse_never_panics_on_arbitrary_objects(
        kind in prop::option::of("[a-z_]{0,24}"),
        text in prop::option::of(".*"),
        recipient in prop::option::of(".*"),
    ) {
        let mut obj = serde_json::Map::new();
        if let Some(kind) = kind {
            obj.insert("type".to_string(), serde_json::Value::String(kind));
        }
        if let Some(text) = text {
            obj.insert("text".to_string(), serde_json::Value::String(text));
        }
        if let Some(recipient) = recipient {
            obj.insert("recipient_id".to_string(), serde_json::Value::String(recipient));
        }
        let _ = ClientFrame::parse(&serde_json::Value::Object(obj).to_string());
    }

    #[test]
    fn server_frames_decode_to_themselves(frame in arb_server_frame()) {
        let text = frame::encode(&frame).unwrap();
        prop_assert_eq!(frame::decode(&text).unwrap(), frame);
    }

    #[test]
    fn broadcast_text_survives_the_wire(text in arb_text()) {
        let sent = ClientFrame::Broadcast { text };
        prop_assert_eq!(ClientFrame::parse(&sent.to_json()).unwrap(), sent);
    }
}
