//! Error type shared by the protocol parsers.

/// Errors produced while parsing or producing relay frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The frame is not valid JSON at all (syntax error or truncated input).
    #[error("frame is not valid JSON: {0}")]
    NotJson(String),

    /// The frame is valid JSON but does not have the expected shape.
    #[error("frame has an invalid shape: {0}")]
    InvalidShape(String),

    /// A field required by the declared frame type is absent.
    #[error("missing required field `{field}` for {kind} frame")]
    MissingField {
        /// Frame type being parsed.
        kind: &'static str,
        /// Name of the absent field.
        field: &'static str,
    },

    /// A required field is present but blank.
    #[error("field `{field}` must not be empty")]
    EmptyField {
        /// Name of the blank field.
        field: &'static str,
    },

    /// A room or user identifier failed validation.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Serializing an outbound frame failed.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Classifies a `serde_json` failure into [`Self::NotJson`] or
    /// [`Self::InvalidShape`].
    #[must_use]
    pub fn from_json(err: &serde_json::Error) -> Self {
        if err.is_syntax() || err.is_eof() {
            Self::NotJson(err.to_string())
        } else {
            Self::InvalidShape(err.to_string())
        }
    }

    /// Returns `true` when the input could not be read as JSON at all.
    #[must_use]
    pub const fn is_not_json(&self) -> bool {
        matches!(self, Self::NotJson(_))
    }
}
