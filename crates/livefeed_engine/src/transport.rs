//! Transport layer abstraction for the feed.

use crate::error::{FeedError, FeedResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};
use livefeed_protocol::{EventRecord, SnapshotPage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Body of an open stream connection, chunk by chunk.
pub type ByteStream = BoxStream<'static, FeedResult<Bytes>>;

/// Parameters of the one-shot snapshot read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Maximum number of records to return.
    pub limit: u32,
    /// Board filter.
    pub board_id: Option<Uuid>,
}

/// Parameters of one stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Catch-up cursor; `None` on a cold start.
    pub since: Option<DateTime<Utc>>,
    /// Board filter.
    pub board_id: Option<Uuid>,
}

/// A feed transport fetches snapshots and opens event streams.
///
/// This trait abstracts the network layer so the synchronizer can run over
/// HTTP or an in-memory script.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    /// Performs the one-shot snapshot read.
    async fn fetch_snapshot(&self, request: &SnapshotRequest) -> FeedResult<SnapshotPage>;

    /// Opens a stream connection.
    ///
    /// Resolves once the server has accepted the request. Cancelling
    /// `cancel` aborts a pending open with [`FeedError::StreamAborted`].
    async fn open_stream(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> FeedResult<ByteStream>;
}

#[async_trait]
impl<T: FeedTransport> FeedTransport for Arc<T> {
    async fn fetch_snapshot(&self, request: &SnapshotRequest) -> FeedResult<SnapshotPage> {
        (**self).fetch_snapshot(request).await
    }

    async fn open_stream(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> FeedResult<ByteStream> {
        (**self).open_stream(request, cancel).await
    }
}

enum ScriptedSnapshot {
    Page(SnapshotPage),
    Fail { status: Option<u16>, message: String },
}

enum ScriptedConnection {
    Accept(mpsc::UnboundedReceiver<FeedResult<Bytes>>),
    Reject { status: Option<u16>, message: String },
}

struct MockState {
    snapshot: Mutex<ScriptedSnapshot>,
    snapshot_delay: Mutex<Duration>,
    snapshot_calls: AtomicUsize,
    connections: Mutex<VecDeque<ScriptedConnection>>,
    connection_ready: Notify,
    requests: Mutex<Vec<StreamRequest>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

/// A mock transport for testing.
///
/// Stream opens are served from a queue of scripted connections; when the
/// queue is empty an open waits until one is scripted or the attempt is
/// cancelled. Accepted connections deliver whatever the test pushes through
/// the matching [`MockConnection`] and deliberately ignore cancellation, like
/// a socket whose buffered reads still resolve after an abort.
///
/// Clones share state, so a test can keep one handle and give another to
/// the synchronizer.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    /// Creates a mock with an empty snapshot and no scripted connections.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                snapshot: Mutex::new(ScriptedSnapshot::Page(SnapshotPage::default())),
                snapshot_delay: Mutex::new(Duration::ZERO),
                snapshot_calls: AtomicUsize::new(0),
                connections: Mutex::new(VecDeque::new()),
                connection_ready: Notify::new(),
                requests: Mutex::new(Vec::new()),
                tokens: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Sets the records returned by the snapshot read.
    pub fn set_snapshot(&self, items: Vec<EventRecord>) {
        let total = items.len() as u64;
        *self.state.snapshot.lock() = ScriptedSnapshot::Page(SnapshotPage {
            items,
            total: Some(total),
            rejected: 0,
        });
    }

    /// Makes the snapshot read fail.
    pub fn fail_snapshot(&self, status: Option<u16>, message: impl Into<String>) {
        *self.state.snapshot.lock() = ScriptedSnapshot::Fail {
            status,
            message: message.into(),
        };
    }

    /// Delays the snapshot response.
    pub fn set_snapshot_delay(&self, delay: Duration) {
        *self.state.snapshot_delay.lock() = delay;
    }

    /// Scripts the next accepted connection and returns its sending end.
    pub fn push_connection(&self) -> MockConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        self.enqueue(ScriptedConnection::Accept(rx));
        MockConnection { tx }
    }

    /// Scripts the next open to be rejected.
    pub fn reject_next(&self, status: Option<u16>, message: impl Into<String>) {
        self.enqueue(ScriptedConnection::Reject {
            status,
            message: message.into(),
        });
    }

    /// Returns how many times the snapshot was read.
    pub fn snapshot_calls(&self) -> usize {
        self.state.snapshot_calls.load(Ordering::SeqCst)
    }

    /// Returns every stream request served so far, oldest first.
    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.state.requests.lock().clone()
    }

    /// Returns the cancellation token handed to each open, oldest first.
    pub fn stream_tokens(&self) -> Vec<CancellationToken> {
        self.state.tokens.lock().clone()
    }

    /// Returns the number of stream opens attempted.
    pub fn stream_opens(&self) -> usize {
        self.state.requests.lock().len()
    }

    fn enqueue(&self, connection: ScriptedConnection) {
        self.state.connections.lock().push_back(connection);
        self.state.connection_ready.notify_one();
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("snapshot_calls", &self.snapshot_calls())
            .field("stream_opens", &self.stream_opens())
            .field("queued", &self.state.connections.lock().len())
            .finish()
    }
}

#[async_trait]
impl FeedTransport for MockTransport {
    async fn fetch_snapshot(&self, _request: &SnapshotRequest) -> FeedResult<SnapshotPage> {
        self.state.snapshot_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.snapshot_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match &*self.state.snapshot.lock() {
            ScriptedSnapshot::Page(page) => Ok(page.clone()),
            ScriptedSnapshot::Fail { status, message } => Err(FeedError::SnapshotFetch {
                message: message.clone(),
                status: *status,
            }),
        }
    }

    async fn open_stream(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> FeedResult<ByteStream> {
        self.state.requests.lock().push(request.clone());
        self.state.tokens.lock().push(cancel.clone());

        let scripted = loop {
            let next = self.state.connections.lock().pop_front();
            if let Some(next) = next {
                break next;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(FeedError::StreamAborted),
                _ = self.state.connection_ready.notified() => {}
            }
        };

        match scripted {
            ScriptedConnection::Accept(rx) => {
                let body = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(body.boxed())
            }
            ScriptedConnection::Reject { status, message } => {
                Err(FeedError::connect_retryable(message, status))
            }
        }
    }
}

/// Sending end of a scripted connection.
///
/// Dropping it, or calling [`MockConnection::close`], ends the body cleanly.
#[derive(Debug, Clone)]
pub struct MockConnection {
    tx: mpsc::UnboundedSender<FeedResult<Bytes>>,
}

impl MockConnection {
    /// Delivers one body chunk. Returns false once the reader has gone away.
    pub fn send(&self, chunk: impl Into<Bytes>) -> bool {
        self.tx.send(Ok(chunk.into())).is_ok()
    }

    /// Delivers a complete record frame.
    pub fn send_frame(&self, event: &str, data: &str) -> bool {
        self.send(format!("event: {event}\ndata: {data}\n\n"))
    }

    /// Fails the body with a read error.
    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.tx.send(Err(FeedError::StreamRead(message.into()))).is_ok()
    }

    /// Ends the body.
    pub fn close(self) {}

    /// Returns true if the synchronizer still holds the body.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}
