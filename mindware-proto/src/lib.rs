//! Shared protocol definitions for the Mindware chat relay wire format.
//!
//! Every frame on the relay WebSocket is a UTF-8 JSON object. [`frame`]
//! holds the inbound/outbound envelopes, [`chat`] the chat message record
//! and room naming helpers.

pub mod chat;
pub mod error;
pub mod frame;

pub use error::ProtocolError;
