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

//! Integration tests for history replay: the per-room bound, persistence
//! across empty periods, and what never enters history.

use std::sync::Arc;
use std::time::Duration;

use mindware_chat::RelayClient;
use mindware_proto::chat::ChatMessage;
use mindware_proto::frame::{ControlFrame, ServerFrame};
use mindware_relay::config::RelayConfig;
use mindware_relay::relay::{self, RelayState};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper: start an in-process relay with `config` and return its state
/// and base URL.
async fn start_relay_with(config: &RelayConfig) -> (Arc<RelayState>, String) {
    let state = Arc::new(RelayState::with_config(config));
    let (addr, _handle) = relay::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    (state, format!("ws://{addr}"))
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

/// Helper: request history and return the replayed texts.
async fn history_texts(client: &mut RelayClient) -> Vec<String> {
    client.request_history().await.unwrap();
    loop {
        match client.next_frame_timeout(RECV_TIMEOUT).await.unwrap() {
            ServerFrame::Control(ControlFrame::History { messages }) => {
                return messages.into_iter().map(|m| m.text).collect();
            }
            ServerFrame::Control(ControlFrame::UserList { .. }) | ServerFrame::Chat(_) => {}
            other => panic!("expected history, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn history_keeps_only_most_recent_messages() {
    let (_state, base) = start_relay_with(&RelayConfig {
        history_capacity: 3,
        ..RelayConfig::default()
    })
    .await;
    let mut alice = RelayClient::connect(&base, "global", "alice").await.unwrap();

    for i in 1..=5 {
        alice.send_text(&format!("m{i}")).await.unwrap();
        assert_eq!(next_chat(&mut alice).await.text, format!("m{i}"));
    }

    assert_eq!(history_texts(&mut alice).await, vec!["m3", "m4", "m5"]);
}

#[tokio::test]
async fn history_survives_an_empty_room() {
    let (state, base) = start_relay_with(&RelayConfig::default()).await;

    let mut alice = RelayClient::connect(&base, "friends", "alice").await.unwrap();
    alice.send_text("anyone around?").await.unwrap();
    next_chat(&mut alice).await;
    alice.close().await.unwrap();
    assert!(state.registry.presence("friends").is_empty());

    let mut bob = RelayClient::connect(&base, "friends", "bob").await.unwrap();
    assert_eq!(history_texts(&mut bob).await, vec!["anyone around?"]);
}

#[tokio::test]
async fn fresh_room_has_empty_history() {
    let (_state, base) = start_relay_with(&RelayConfig::default()).await;
    let mut alice = RelayClient::connect(&base, "global", "alice").await.unwrap();
    assert!(history_texts(&mut alice).await.is_empty());
}

#[tokio::test]
async fn history_is_per_room() {
    let (_state, base) = start_relay_with(&RelayConfig::default()).await;
    let mut alice = RelayClient::connect(&base, "global", "alice").await.unwrap();
    let mut bob = RelayClient::connect(&base, "friends", "bob").await.unwrap();

    alice.send_text("in global").await.unwrap();
    next_chat(&mut alice).await;
    bob.send_text("in friends").await.unwrap();
    next_chat(&mut bob).await;

    assert_eq!(history_texts(&mut alice).await, vec!["in global"]);
    assert_eq!(history_texts(&mut bob).await, vec!["in friends"]);
}

#[tokio::test]
async fn private_messages_never_enter_history() {
    let (_state, base) = start_relay_with(&RelayConfig::default()).await;
    let mut alice = RelayClient::connect(&base, "global", "alice").await.unwrap();
    let mut bob = RelayClient::connect(&base, "global", "bob").await.unwrap();

    alice.send_private("bob", "just for you").await.unwrap();
    assert_eq!(next_chat(&mut bob).await.text, "just for you");
    alice.send_text("for everyone").await.unwrap();
    next_chat(&mut bob).await;

    assert_eq!(history_texts(&mut bob).await, vec!["for everyone"]);
}

#[tokio::test]
async fn malformed_and_oversized_frames_are_dropped() {
    let (_state, base) = start_relay_with(&RelayConfig {
        max_payload_size: 256,
        ..RelayConfig::default()
    })
    .await;
    let mut alice = RelayClient::connect(&base, "global", "alice").await.unwrap();

    alice.send_raw("{not json").await.unwrap();
    alice.send_raw(r#"{"user_id":"alice"}"#).await.unwrap();
    alice.send_raw(r#"{"type":"private_message","text":"no recipient"}"#).await.unwrap();
    alice.send_text(&"x".repeat(1024)).await.unwrap();

    // The connection is still open and nothing was recorded.
    assert!(history_texts(&mut alice).await.is_empty());
    alice.send_text("fine").await.unwrap();
    assert_eq!(next_chat(&mut alice).await.text, "fine");
}

#[tokio::test]
async fn replay_and_live_delivery_do_not_overlap() {
    let (_state, base) = start_relay_with(&RelayConfig::default()).await;
    let mut alice = RelayClient::connect(&base, "global", "alice").await.unwrap();
    let mut bob = RelayClient::connect(&base, "global", "bob").await.unwrap();

    let sender = async {
        for i in 0..20 {
            alice.send_text(&format!("m{i}")).await.unwrap();
        }
    };
    let reader = async {
        bob.request_history().await.unwrap();
        let mut replayed = None;
        let mut live = Vec::new();
        while live.len() + replayed.as_ref().map_or(0, Vec::len) < 20 {
            match bob.next_frame_timeout(RECV_TIMEOUT).await.unwrap() {
                ServerFrame::Control(ControlFrame::History { messages }) => {
                    replayed = Some(messages.into_iter().map(|m| m.seq).collect::<Vec<_>>());
                }
                ServerFrame::Chat(message) if replayed.is_some() => live.push(message.seq),
                _ => {}
            }
        }
        (replayed.unwrap_or_default(), live)
    };
    let ((), (replayed, live)) = tokio::join!(sender, reader);

    // Every message appears exactly once: either in the replay or after it.
    let mut all: Vec<u64> = replayed.iter().chain(live.iter()).copied().collect();
    assert_eq!(all.len(), 20);
    all.dedup();
    assert_eq!(all.len(), 20);
    assert!(all.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn only_the_most_recent_idle_rooms_keep_history() {
    let (state, base) = start_relay_with(&RelayConfig {
        max_idle_rooms: 1,
        ..RelayConfig::default()
    })
    .await;

    for room in ["first", "second"] {
        let mut alice = RelayClient::connect(&base, room, "alice").await.unwrap();
        alice.send_text(&format!("hello {room}")).await.unwrap();
        next_chat(&mut alice).await;
        alice.close().await.unwrap();
    }

    // "second" emptying pushes "first" past the limit.
    tokio::time::timeout(RECV_TIMEOUT, async {
        while state.registry.rooms().get("first").is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let mut bob = RelayClient::connect(&base, "second", "bob").await.unwrap();
    assert_eq!(history_texts(&mut bob).await, vec!["hello second"]);
    let mut carol = RelayClient::connect(&base, "first", "carol").await.unwrap();
    assert!(history_texts(&mut carol).await.is_empty());
}
