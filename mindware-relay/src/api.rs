//! Plain HTTP endpoints served next to the WebSocket route.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use mindware_proto::frame::ControlFrame;
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;

use crate::relay::RelayState;

const ADJECTIVES: [&str; 7] = ["Calm", "Brave", "Wise", "Happy", "Gentle", "Silent", "Swift"];
const NOUNS: [&str; 7] = ["Tiger", "Eagle", "River", "Sky", "Moon", "Sun", "Leaf"];

/// Body of `GET /api/pseudonym`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PseudonymResponse {
    /// Generated display name.
    pub pseudonym: String,
}

/// Generates an anonymous display name such as `CalmRiver42`.
pub fn generate_pseudonym<R: Rng>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("Calm");
    let noun = NOUNS.choose(rng).copied().unwrap_or("River");
    let number: u8 = rng.random_range(10..100);
    format!("{adjective}{noun}{number}")
}

/// `GET /`
pub async fn health() -> &'static str {
    "Mindware chat relay is running"
}

/// `GET /api/pseudonym`
pub async fn pseudonym() -> Json<PseudonymResponse> {
    Json(PseudonymResponse {
        pseudonym: generate_pseudonym(&mut rand::rng()),
    })
}

/// `GET /api/history/{room_id}`: the room's most recent messages,
/// oldest-first. Unknown rooms yield an empty list.
pub async fn history(
    Path(room_id): Path<String>,
    State(state): State<Arc<RelayState>>,
) -> Json<ControlFrame> {
    let messages = state
        .registry
        .history_latest(&room_id, state.http_history_limit());
    tracing::debug!(room = %room_id, count = messages.len(), "http history request");
    Json(ControlFrame::History { messages })
}
