// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for room chat: broadcast fan-out, history replay,
//! direct messages and invitations through a live relay.

use std::sync::Arc;
use std::time::Duration;

use mindware_chat::{ClientError, RelayClient};
use mindware_proto::chat::{ChatMessage, MessageKind};
use mindware_proto::frame::{ControlFrame, ServerFrame};
use mindware_relay::config::RelayConfig;
use mindware_relay::relay::{self, RelayState};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper: start an in-process relay and return its base URL.
async fn start_relay() -> String {
    let (addr, _handle) = relay::start_server("127.0.0.1:0").await.unwrap();
    format!("ws://{addr}")
}

/// Helper: join `room` and wait until our own `user_list` arrives.
async fn join(base: &str, room: &str, user: &str) -> RelayClient {
    let mut client = RelayClient::connect(base, room, user).await.unwrap();
    match client.next_frame_timeout(RECV_TIMEOUT).await.unwrap() {
        ServerFrame::Control(ControlFrame::UserList { users }) => {
            assert!(users.contains(&user.to_string()), "{user} missing from {users:?}");
        }
        other => panic!("expected user_list, got {other:?}"),
    }
    client
}

/// Helper: next chat message, skipping presence updates.
async fn next_chat(client: &mut RelayClient) -> ChatMessage {
    loop {
        match client.next_frame_timeout(RECV_TIMEOUT).await.unwrap() {
            ServerFrame::Chat(message) => return message,
            ServerFrame::Control(ControlFrame::UserList { .. }) => {}
            other => panic!("expected chat message, got {other:?}"),
        }
    }
}

/// Helper: next non-presence frame.
async fn next_non_presence(client: &mut RelayClient) -> ServerFrame {
    loop {
        match client.next_frame_timeout(RECV_TIMEOUT).await.unwrap() {
            ServerFrame::Control(ControlFrame::UserList { .. }) => {}
            other => return other,
        }
    }
}

#[tokio::test]
async fn hello_then_history_then_private() {
    let base = start_relay().await;
    let mut a = join(&base, "global", "A").await;
    let mut b = join(&base, "global", "B").await;
    let mut c = join(&base, "global", "C").await;

    // A broadcasts to the room.
    a.send_text("hello").await.unwrap();
    let at_b = next_chat(&mut b).await;
    assert_eq!(at_b.text, "hello");
    assert_eq!(at_b.user_id, "A");
    assert_eq!(at_b.room_id.as_deref(), Some("global"));
    assert_eq!(next_chat(&mut a).await, at_b, "sender sees its own message");
    assert_eq!(next_chat(&mut c).await, at_b);

    // A fresh history request returns exactly that message.
    a.request_history().await.unwrap();
    match next_non_presence(&mut a).await {
        ServerFrame::Control(ControlFrame::History { messages }) => {
            let texts: Vec<&str> = messages.iter().map(|m| m.text.as_str()).collect();
            assert_eq!(texts, vec!["hello"]);
        }
        other => panic!("expected history, got {other:?}"),
    }

    // A messages B privately; both see it.
    a.send_private("B", "hi").await.unwrap();
    let private_at_b = next_chat(&mut b).await;
    assert_eq!(private_at_b.kind, MessageKind::Private);
    assert_eq!(private_at_b.text, "hi");
    assert_eq!(private_at_b.user_id, "A");
    assert_eq!(private_at_b.recipient_id.as_deref(), Some("B"));
    assert_eq!(next_chat(&mut a).await, private_at_b);

    // C sends a marker afterwards; it is the next thing C sees, so the
    // private message never reached C.
    c.send_text("marker").await.unwrap();
    let at_c = next_chat(&mut c).await;
    assert_eq!(at_c.text, "marker");
    assert!(at_c.seq > private_at_b.seq);
}

#[tokio::test]
async fn recipients_agree_on_broadcast_order() {
    let base = start_relay().await;
    let mut a = join(&base, "global", "A").await;
    let mut b = join(&base, "global", "B").await;
    let mut c = join(&base, "global", "C").await;
    let mut d = join(&base, "global", "D").await;

    let send_a = async {
        for i in 0..10 {
            a.send_text(&format!("a{i}")).await.unwrap();
        }
    };
    let send_b = async {
        for i in 0..10 {
            b.send_text(&format!("b{i}")).await.unwrap();
        }
    };
    tokio::join!(send_a, send_b);

    let mut at_c = Vec::new();
    let mut at_d = Vec::new();
    for _ in 0..20 {
        at_c.push(next_chat(&mut c).await);
        at_d.push(next_chat(&mut d).await);
    }
    assert_eq!(at_c, at_d);
    assert!(at_c.windows(2).all(|w| w[0].seq < w[1].seq));

    // Each sender's own messages keep their send order.
    let from_a: Vec<&str> = at_c
        .iter()
        .filter(|m| m.user_id == "A")
        .map(|m| m.text.as_str())
        .collect();
    assert_eq!(from_a, (0..10).map(|i| format!("a{i}")).collect::<Vec<_>>());
}

#[tokio::test]
async fn private_message_reaches_recipient_in_another_room() {
    let base = start_relay().await;
    let mut a = join(&base, "friends", "A").await;
    let mut b = join(&base, "global", "B").await;

    a.send_private("B", "over here").await.unwrap();
    let at_b = next_chat(&mut b).await;
    assert_eq!(at_b.text, "over here");
    assert!(at_b.is_private());
    assert_eq!(next_chat(&mut a).await, at_b);
}

#[tokio::test]
async fn private_message_to_offline_user_echoes_to_sender() {
    let base = start_relay().await;
    let mut a = join(&base, "friends", "A").await;

    a.send_private("nobody", "anyone?").await.unwrap();
    let echo = next_chat(&mut a).await;
    assert_eq!(echo.text, "anyone?");
    assert_eq!(echo.recipient_id.as_deref(), Some("nobody"));
}

#[tokio::test]
async fn private_chat_invitation_reaches_recipient() {
    let base = start_relay().await;
    let mut a = join(&base, "global", "A").await;
    let mut b = join(&base, "global", "B").await;

    a.request_private_chat("B").await.unwrap();
    assert_eq!(
        next_non_presence(&mut b).await,
        ServerFrame::Control(ControlFrame::PrivateChatInvitation {
            from_user: "A".to_string()
        })
    );

    // The inviter gets nothing back.
    match a.next_frame_timeout(Duration::from_millis(200)).await {
        Err(ClientError::Timeout) | Ok(ServerFrame::Control(ControlFrame::UserList { .. })) => {}
        other => panic!("inviter should receive nothing, got {other:?}"),
    }
}

#[tokio::test]
async fn plain_text_is_broadcast_when_enabled() {
    let state = Arc::new(RelayState::with_config(&RelayConfig {
        plain_text_fallback: true,
        ..RelayConfig::default()
    }));
    let (addr, _handle) = relay::start_server_with_state("127.0.0.1:0", state)
        .await
        .unwrap();
    let base = format!("ws://{addr}");
    let mut a = join(&base, "global", "A").await;
    let mut b = join(&base, "global", "B").await;

    a.send_raw("just words").await.unwrap();
    let at_b = next_chat(&mut b).await;
    assert_eq!(at_b.text, "just words");
    assert_eq!(at_b.user_id, "A");
}

#[tokio::test]
async fn plain_text_is_dropped_by_default() {
    let base = start_relay().await;
    let mut a = join(&base, "global", "A").await;

    a.send_raw("just words").await.unwrap();
    a.send_text("real message").await.unwrap();
    assert_eq!(next_chat(&mut a).await.text, "real message");
}
