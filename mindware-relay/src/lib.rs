//! Mindware chat relay library.
//!
//! Exposes the relay server for use in tests and embedding. Clients join a
//! room over a WebSocket, see who else is present, replay recent history,
//! broadcast to the room and exchange direct messages.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod history;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod router;
pub mod session;
