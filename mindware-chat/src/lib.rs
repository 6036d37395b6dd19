//! Mindware chat client library.
//!
//! [`RelayClient`] speaks the relay's WebSocket protocol; [`ChatPane`]
//! reconciles the frames it receives into the state a chat view renders.

pub mod client;
pub mod pane;

pub use client::{ClientError, RelayClient};
pub use pane::ChatPane;
