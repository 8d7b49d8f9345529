//! # livefeed engine
//!
//! Keeps a bounded, de-duplicated, newest-first view of an append-only
//! event feed fresh in real time.
//!
//! This crate provides:
//! - `FeedStore`, the ordered record collection the view renders
//! - `Backoff`, the reconnect delay policy
//! - `VisibilityMonitor`, which gates whether a connection may be held
//! - `FeedSynchronizer`, the snapshot + live tail state machine
//! - `FeedTransport`, with an HTTP implementation and an in-memory mock
//!
//! ## Architecture
//!
//! The synchronizer seeds the store once from a paginated snapshot and, in
//! parallel, holds a `text/event-stream` connection whose records are merged
//! as they are decoded:
//!
//! ```text
//! idle → connecting → streaming → backing-off → connecting → …
//!                                                  (stopped from anywhere)
//! ```
//!
//! ## Key Invariants
//!
//! - The store never holds two records with the same id
//! - Records are always sorted newest first and never exceed capacity
//! - At most one connection attempt is alive at a time
//! - Nothing read by a cancelled attempt reaches the store
//! - Cancellation is a clean stop, never a reason to back off

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backoff;
mod config;
mod error;
mod http;
mod state;
mod store;
mod synchronizer;
mod transport;
mod visibility;

pub use backoff::Backoff;
pub use config::{BackoffConfig, FeedConfig, DEFAULT_CAPACITY, DEFAULT_RESOURCE};
pub use error::{FeedError, FeedResult};
pub use http::HttpTransport;
pub use state::{ConnectionState, FeedStats, SnapshotStatus};
pub use store::FeedStore;
pub use synchronizer::FeedSynchronizer;
pub use transport::{
    ByteStream, FeedTransport, MockConnection, MockTransport, SnapshotRequest, StreamRequest,
};
pub use visibility::VisibilityMonitor;

pub use livefeed_protocol::{EventRecord, Frame, FrameDecoder, SnapshotPage};
