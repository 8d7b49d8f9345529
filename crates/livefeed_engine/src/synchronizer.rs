//! The feed synchronizer.
//!
//! One driver task per synchronizer runs two things side by side:
//!
//! 1. the snapshot read, once, seeding the store
//! 2. the connection loop: `idle → connecting → streaming → backing-off → …`
//!
//! Every connection attempt gets its own child of the shutdown token. Losing
//! eligibility drops the attempt's future and cancels its token, so nothing
//! it reads afterwards reaches the store. At most one attempt exists at a
//! time, which keeps merges in decode order.

use crate::backoff::Backoff;
use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::state::{ConnectionState, FeedStats, SnapshotStatus};
use crate::store::FeedStore;
use crate::transport::{FeedTransport, SnapshotRequest, StreamRequest};
use crate::visibility::VisibilityMonitor;
use futures_util::StreamExt;
use livefeed_protocol::{EventRecord, Frame, FrameDecoder};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// How a single connection attempt ended.
enum Outcome {
    /// Cancelled, by us or by the transport; not a failure.
    Aborted,
    /// The server ended the body.
    Closed,
    /// Connect or read failure.
    Failed(FeedError),
}

/// Keeps a bounded, de-duplicated, newest-first view of a live feed.
///
/// Dropping the synchronizer tears it down.
pub struct FeedSynchronizer<T: FeedTransport> {
    shared: Arc<Shared<T>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Shared<T> {
    config: FeedConfig,
    transport: T,
    eligibility: watch::Receiver<bool>,
    store: RwLock<FeedStore>,
    state: watch::Sender<ConnectionState>,
    revision: watch::Sender<u64>,
    snapshot: RwLock<SnapshotStatus>,
    stats: RwLock<FeedStats>,
    shutdown: CancellationToken,
}

impl<T: FeedTransport> FeedSynchronizer<T> {
    /// Creates a synchronizer. Nothing happens until [`start`](Self::start).
    pub fn new(config: FeedConfig, transport: T, monitor: &VisibilityMonitor) -> FeedResult<Self> {
        config.validate()?;
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (revision, _) = watch::channel(0);
        Ok(Self {
            shared: Arc::new(Shared {
                store: RwLock::new(FeedStore::new(config.capacity)),
                config,
                transport,
                eligibility: monitor.subscribe(),
                state,
                revision,
                snapshot: RwLock::new(SnapshotStatus::Pending),
                stats: RwLock::new(FeedStats::default()),
                shutdown: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        })
    }

    /// Spawns the driver task.
    ///
    /// Calling it again while running does nothing. After [`stop`](Self::stop)
    /// it fails with [`FeedError::Stopped`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) -> FeedResult<()> {
        if self.shared.shutdown.is_cancelled() {
            return Err(FeedError::Stopped);
        }
        let mut task = self.task.lock();
        if task.is_some() {
            return Ok(());
        }
        let shared = Arc::clone(&self.shared);
        *task = Some(tokio::spawn(shared.run()));
        info!(url = %self.shared.config.stream_url(), "feed synchronizer started");
        Ok(())
    }

    /// Tears the synchronizer down.
    ///
    /// Cancels any in-flight request and pending retry timer. Safe to call
    /// any number of times, from any state.
    pub fn stop(&self) {
        let first = !self.shared.shutdown.is_cancelled();
        self.shared.shutdown.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.shared.state.send_if_modified(|state| {
            let changed = *state != ConnectionState::Stopped;
            *state = ConnectionState::Stopped;
            changed
        });
        if first {
            info!("feed synchronizer stopped");
        }
    }

    /// Returns a copy of the records, newest first.
    pub fn records(&self) -> Vec<EventRecord> {
        self.shared.store.read().records().to_vec()
    }

    /// Returns the number of records held.
    pub fn len(&self) -> usize {
        self.shared.store.read().len()
    }

    /// Returns true if no records are held.
    pub fn is_empty(&self) -> bool {
        self.shared.store.read().is_empty()
    }

    /// Returns true while the stream is open.
    pub fn is_live(&self) -> bool {
        self.state().is_live()
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Returns a receiver that observes connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Returns the snapshot outcome.
    pub fn snapshot_status(&self) -> SnapshotStatus {
        self.shared.snapshot.read().clone()
    }

    /// Returns a receiver whose value increases whenever the records or the
    /// snapshot status change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Returns the current revision.
    pub fn revision(&self) -> u64 {
        *self.shared.revision.borrow()
    }

    /// Returns the lifetime counters.
    pub fn stats(&self) -> FeedStats {
        self.shared.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &FeedConfig {
        &self.shared.config
    }
}

impl<T: FeedTransport> Drop for FeedSynchronizer<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<T: FeedTransport> std::fmt::Debug for FeedSynchronizer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSynchronizer")
            .field("state", &self.state())
            .field("records", &self.len())
            .field("snapshot", &self.snapshot_status())
            .finish()
    }
}

impl<T: FeedTransport> Shared<T> {
    async fn run(self: Arc<Self>) {
        let shutdown = self.shutdown.clone();
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = async { tokio::join!(self.load_snapshot(), self.connection_loop()) } => {}
        }
    }

    async fn load_snapshot(&self) {
        let request = SnapshotRequest {
            limit: self.config.snapshot_limit,
            board_id: self.config.board_id,
        };
        let status = match self.transport.fetch_snapshot(&request).await {
            Ok(page) => {
                let count = page.items.len();
                let inserted = self.store.write().seed(page.items);
                self.stats.write().records_merged += inserted as u64;
                info!(count, inserted, rejected = page.rejected, "snapshot loaded");
                SnapshotStatus::Loaded { count }
            }
            Err(err) => {
                warn!(error = %err, "snapshot fetch failed");
                self.stats.write().last_error = Some(err.to_string());
                SnapshotStatus::Failed {
                    message: err.to_string(),
                }
            }
        };
        *self.snapshot.write() = status;
        self.bump_revision();
    }

    async fn connection_loop(&self) {
        let mut eligibility = self.eligibility.clone();
        let mut backoff = Backoff::new(self.config.backoff.clone());

        loop {
            wait_for_eligibility(&mut eligibility, true).await;
            self.set_state(ConnectionState::Connecting);

            let attempt = self.shutdown.child_token();
            let outcome = tokio::select! {
                outcome = self.connect_and_stream(&attempt, &mut backoff) => outcome,
                _ = wait_for_eligibility(&mut eligibility, false) => {
                    attempt.cancel();
                    debug!("feed no longer eligible, connection released");
                    self.set_state(ConnectionState::Idle);
                    continue;
                }
            };
            attempt.cancel();

            match outcome {
                Outcome::Aborted if self.shutdown.is_cancelled() => return,
                Outcome::Aborted => {
                    // Not a failure: no retry until eligibility comes back.
                    debug!("feed stream aborted by transport");
                    self.set_state(ConnectionState::Idle);
                    wait_for_eligibility(&mut eligibility, false).await;
                    continue;
                }
                Outcome::Closed => debug!("feed stream closed by server"),
                Outcome::Failed(err) => {
                    if err.is_retryable() {
                        debug!(error = %err, "feed stream failed");
                    } else {
                        warn!(error = %err, "feed stream failed");
                    }
                    self.stats.write().last_error = Some(err.to_string());
                }
            }

            let delay = backoff.next_delay();
            self.stats.write().reconnects_scheduled += 1;
            self.set_state(ConnectionState::BackingOff);
            debug!(
                delay_ms = delay.as_millis() as u64,
                attempt = backoff.attempt(),
                "reconnect scheduled"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_stream(&self, attempt: &CancellationToken, backoff: &mut Backoff) -> Outcome {
        let request = StreamRequest {
            since: self.store.read().latest_timestamp(),
            board_id: self.config.board_id,
        };
        debug!(since = ?request.since, "opening feed stream");

        let mut body = match self.transport.open_stream(&request, attempt.clone()).await {
            Ok(body) => body,
            Err(err) if err.is_abort() || attempt.is_cancelled() => return Outcome::Aborted,
            Err(err) => return Outcome::Failed(err),
        };
        if attempt.is_cancelled() {
            return Outcome::Aborted;
        }
        self.stats.write().connections_opened += 1;
        self.set_state(ConnectionState::Streaming);

        let mut decoder = FrameDecoder::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = attempt.cancelled() => return Outcome::Aborted,
                next = body.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    backoff.reset();
                    self.stats.write().bytes_received += chunk.len() as u64;
                    for frame in decoder.push(&chunk) {
                        if attempt.is_cancelled() {
                            return Outcome::Aborted;
                        }
                        self.apply_frame(&frame);
                    }
                }
                Some(Err(err)) if err.is_abort() => return Outcome::Aborted,
                Some(Err(err)) => {
                    decoder.finish();
                    return Outcome::Failed(err);
                }
                None => {
                    let discarded = decoder.finish();
                    if discarded > 0 {
                        trace!(discarded, "partial frame discarded at end of stream");
                    }
                    return Outcome::Closed;
                }
            }
        }
    }

    fn apply_frame(&self, frame: &Frame) {
        if frame.event != self.config.record_event {
            trace!(event = %frame.event, "ignoring frame");
            return;
        }
        let record = match frame.record(self.config.envelope_key.as_deref()) {
            Ok(record) => record,
            Err(err) => {
                let err = FeedError::from(err);
                debug!(error = %err, "dropping malformed frame");
                self.stats.write().frames_dropped += 1;
                return;
            }
        };

        let mut store = self.store.write();
        if store.contains(&record.id) {
            drop(store);
            trace!(id = %record.id, "duplicate record");
            self.stats.write().duplicates_rejected += 1;
            return;
        }
        let id = record.id.clone();
        let retained = store.merge(record);
        drop(store);
        if retained {
            trace!(id = %id, "record merged");
            self.stats.write().records_merged += 1;
            self.bump_revision();
        } else {
            trace!(id = %id, "record older than the retained window");
        }
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|state| {
            if *state == next || *state == ConnectionState::Stopped {
                return false;
            }
            debug!(from = %state, to = %next, "feed state");
            *state = next;
            true
        });
    }

    fn bump_revision(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }
}

/// Resolves once eligibility equals `wanted`.
///
/// If the monitor is gone its last value is final, so a value that can no
/// longer change never resolves.
async fn wait_for_eligibility(rx: &mut watch::Receiver<bool>, wanted: bool) {
    let reached = rx.wait_for(|eligible| *eligible == wanted).await.is_ok();
    if reached {
        return;
    }
    let current = *rx.borrow();
    if current != wanted {
        std::future::pending::<()>().await;
    }
}
