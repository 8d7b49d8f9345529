//! Tail command implementation.

use super::{print_record, OutputFormat};
use livefeed_engine::{
    FeedConfig, FeedSynchronizer, HttpTransport, SnapshotStatus, VisibilityMonitor,
};
use std::collections::HashSet;
use tracing::{info, warn};

/// Runs the tail command until Ctrl-C.
///
/// Records are printed oldest first, each exactly once while it stays in
/// the retained window.
pub async fn run(config: FeedConfig, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(&config)?;
    // A terminal has no visibility; it is always eligible.
    let monitor = VisibilityMonitor::always_eligible();
    let sync = FeedSynchronizer::new(config, transport, &monitor)?;

    let mut revisions = sync.subscribe();
    let mut states = sync.subscribe_state();
    sync.start()?;

    let mut printed: HashSet<String> = HashSet::new();
    let mut snapshot_reported = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                if !snapshot_reported {
                    match sync.snapshot_status() {
                        SnapshotStatus::Pending => {}
                        SnapshotStatus::Loaded { count } => {
                            info!(count, "history loaded");
                            snapshot_reported = true;
                        }
                        SnapshotStatus::Failed { message } => {
                            warn!(%message, "history unavailable, following live records only");
                            snapshot_reported = true;
                        }
                    }
                }

                let records = sync.records();
                for record in records.iter().rev() {
                    if !printed.contains(&record.id) {
                        print_record(record, format)?;
                    }
                }
                printed = records.into_iter().map(|record| record.id).collect();
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                info!(%state, "connection");
            }
        }
    }

    sync.stop();
    let stats = sync.stats();
    info!(
        merged = stats.records_merged,
        duplicates = stats.duplicates_rejected,
        dropped = stats.frames_dropped,
        reconnects = stats.reconnects_scheduled,
        "tail finished"
    );
    Ok(())
}
