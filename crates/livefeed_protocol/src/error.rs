//! Error types for the wire layer.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while turning wire text into typed values.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The payload parsed, but is not a JSON object.
    #[error("payload is not an object")]
    NotAnObject,

    /// The record has no usable identifier.
    #[error("invalid record identifier: {reason}")]
    InvalidIdentifier {
        /// Why the identifier was rejected.
        reason: String,
    },

    /// The record timestamp cannot be resolved to an absolute instant.
    #[error("invalid timestamp {value:?}")]
    InvalidTimestamp {
        /// The raw timestamp text.
        value: String,
    },

    /// The record is structurally wrong in some other way.
    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

impl ProtocolError {
    /// Creates an invalid identifier error.
    pub fn invalid_identifier(reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            reason: reason.into(),
        }
    }
}
