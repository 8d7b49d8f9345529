//! Snapshot command implementation.

use super::{print_record, OutputFormat};
use livefeed_engine::{
    EventRecord, FeedConfig, FeedStore, FeedTransport, HttpTransport, SnapshotRequest,
};
use serde::Serialize;

/// JSON shape of the snapshot command.
#[derive(Debug, Serialize)]
struct SnapshotOutput<'a> {
    total: Option<u64>,
    rejected: usize,
    records: &'a [EventRecord],
}

/// Runs the snapshot command.
pub async fn run(config: &FeedConfig, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(config)?;
    let page = transport
        .fetch_snapshot(&SnapshotRequest {
            limit: config.snapshot_limit,
            board_id: config.board_id,
        })
        .await?;
    if page.rejected > 0 {
        tracing::warn!(rejected = page.rejected, "skipped invalid snapshot items");
    }

    let mut store = FeedStore::new(config.capacity);
    store.seed(page.items);

    match format {
        OutputFormat::Json => {
            let output = SnapshotOutput {
                total: page.total,
                rejected: page.rejected,
                records: store.records(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            for record in store.records().iter().rev() {
                print_record(record, format)?;
            }
            tracing::info!(shown = store.len(), total = ?page.total, "snapshot");
        }
    }
    Ok(())
}
