//! Relay error taxonomy.
//!
//! Every variant is scoped to a single connection or a single message;
//! none of them is fatal to the relay process.

/// Errors raised while registering connections or routing frames.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The transport was already closed when it tried to register, or the
    /// session is no longer registered.
    #[error("connection is not live")]
    InvalidConnection,

    /// The frame could not be parsed or lacks a field its type requires.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// A direct message or invitation named a user with no live connection.
    #[error("recipient {0} has no live connection")]
    UnknownRecipient(String),

    /// A connection's outbound queue overflowed; that connection is evicted.
    #[error("outbound queue full for connection {0}")]
    CapacityExceeded(String),
}

impl From<mindware_proto::ProtocolError> for RelayError {
    fn from(err: mindware_proto::ProtocolError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}
