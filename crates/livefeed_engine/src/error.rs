//! Error types for the feed engine.

use livefeed_protocol::ProtocolError;
use thiserror::Error;

/// Result type for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;

/// Errors that can occur while synchronizing a feed.
#[derive(Error, Debug)]
pub enum FeedError {
    /// The one-shot snapshot read failed.
    #[error("snapshot fetch failed: {message}")]
    SnapshotFetch {
        /// Error message.
        message: String,
        /// HTTP status, if the server answered.
        status: Option<u16>,
    },

    /// The stream request could not be established.
    #[error("stream connect failed: {message}")]
    StreamConnect {
        /// Error message.
        message: String,
        /// HTTP status, if the server answered.
        status: Option<u16>,
        /// Whether reconnecting may help.
        retryable: bool,
    },

    /// Reading the stream body failed mid-connection.
    #[error("stream read failed: {0}")]
    StreamRead(String),

    /// A single frame could not be turned into a record.
    #[error("stream decode failed: {0}")]
    StreamDecode(#[from] ProtocolError),

    /// The attempt was cancelled locally.
    #[error("stream aborted")]
    StreamAborted,

    /// A configuration value is out of range.
    #[error("invalid config {field}: {reason}")]
    InvalidConfig {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The synchronizer has been torn down.
    #[error("synchronizer stopped")]
    Stopped,
}

impl FeedError {
    /// Creates a snapshot error without a status.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::SnapshotFetch {
            message: message.into(),
            status: None,
        }
    }

    /// Creates a retryable connect error.
    pub fn connect_retryable(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::StreamConnect {
            message: message.into(),
            status,
            retryable: true,
        }
    }

    /// Creates a connect error that reconnecting will not fix.
    pub fn connect_fatal(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::StreamConnect {
            message: message.into(),
            status,
            retryable: false,
        }
    }

    /// Creates a configuration error.
    pub fn invalid_config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            FeedError::StreamConnect { retryable, .. } => *retryable,
            FeedError::StreamRead(_) => true,
            FeedError::SnapshotFetch { status, .. } => !matches!(status, Some(400..=499)),
            _ => false,
        }
    }

    /// Returns true if this error is the expected result of cancellation.
    pub fn is_abort(&self) -> bool {
        matches!(self, FeedError::StreamAborted | FeedError::Stopped)
    }

    /// Returns the HTTP status attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            FeedError::SnapshotFetch { status, .. } | FeedError::StreamConnect { status, .. } => {
                *status
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(FeedError::connect_retryable("connection refused", None).is_retryable());
        assert!(!FeedError::connect_fatal("bad url", None).is_retryable());
        assert!(FeedError::StreamRead("reset by peer".into()).is_retryable());
        assert!(!FeedError::StreamAborted.is_retryable());
        assert!(!FeedError::Stopped.is_retryable());
        assert!(FeedError::snapshot("timeout").is_retryable());
        assert!(!FeedError::SnapshotFetch {
            message: "unauthorized".into(),
            status: Some(401)
        }
        .is_retryable());
    }

    #[test]
    fn aborts_are_not_failures() {
        assert!(FeedError::StreamAborted.is_abort());
        assert!(FeedError::Stopped.is_abort());
        assert!(!FeedError::StreamRead("eof".into()).is_abort());
    }

    #[test]
    fn error_display() {
        let err = FeedError::invalid_config("capacity", "must be > 0");
        assert_eq!(err.to_string(), "invalid config capacity: must be > 0");

        let err = FeedError::connect_retryable("HTTP 503", Some(503));
        assert!(err.to_string().contains("503"));
        assert_eq!(err.status(), Some(503));

        let err = FeedError::from(ProtocolError::NotAnObject);
        assert!(err.to_string().starts_with("stream decode failed"));
    }
}
