//! # livefeed protocol
//!
//! Wire types for the live activity feed.
//!
//! This crate provides:
//! - `EventRecord`, the unit of the feed, with identifier and timestamp rules
//! - `FrameDecoder`, an incremental `text/event-stream` decoder
//! - `SnapshotPage`, the body of the one-shot snapshot read
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod frame;
mod record;
mod snapshot;

pub use error::{ProtocolError, ProtocolResult};
pub use frame::{Frame, FrameDecoder, DEFAULT_EVENT};
pub use record::{format_cursor, parse_identifier, parse_timestamp, EventRecord};
pub use snapshot::SnapshotPage;
