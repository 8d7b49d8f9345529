//! Synchronizer state and counters.

use std::fmt;

/// The current state of the stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection; waiting to become eligible.
    Idle,
    /// A stream request is in flight.
    Connecting,
    /// The stream is open and being read.
    Streaming,
    /// Waiting before the next attempt, or for eligibility after it.
    BackingOff,
    /// Torn down. Terminal.
    Stopped,
}

impl ConnectionState {
    /// Returns true if a network attempt is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Streaming)
    }

    /// Returns true if the feed is receiving live records.
    pub fn is_live(&self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }

    /// Returns the lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::BackingOff => "backing-off",
            ConnectionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the one-shot snapshot read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    /// Not finished yet.
    Pending,
    /// Loaded; `count` records were returned.
    Loaded {
        /// Number of records in the snapshot page.
        count: usize,
    },
    /// Failed. The live tail keeps running.
    Failed {
        /// Error shown to the user.
        message: String,
    },
}

impl SnapshotStatus {
    /// Returns true while the snapshot is outstanding.
    pub fn is_pending(&self) -> bool {
        matches!(self, SnapshotStatus::Pending)
    }

    /// Returns the failure message, if the snapshot failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            SnapshotStatus::Failed { message } => Some(message),
            _ => None,
        }
    }
}

/// Statistics about a synchronizer's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedStats {
    /// Stream connections that reached the streaming state.
    pub connections_opened: u64,
    /// Records inserted into the store, snapshot included.
    pub records_merged: u64,
    /// Records ignored because their id was already held.
    pub duplicates_rejected: u64,
    /// Record frames whose payload could not be decoded.
    pub frames_dropped: u64,
    /// Reconnect delays scheduled.
    pub reconnects_scheduled: u64,
    /// Stream body bytes received.
    pub bytes_received: u64,
    /// Last connection or snapshot error.
    pub last_error: Option<String>,
}
