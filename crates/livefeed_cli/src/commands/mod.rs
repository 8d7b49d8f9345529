//! CLI command implementations.

pub mod frames;
pub mod snapshot;
pub mod tail;

use clap::ValueEnum;
use livefeed_engine::EventRecord;
use std::io::{self, Write};

/// How records and frames are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One human-readable line per item.
    Text,
    /// One JSON document per item.
    Json,
}

/// Prints one record to stdout.
pub fn print_record(record: &EventRecord, format: OutputFormat) -> io::Result<()> {
    let line = match format {
        OutputFormat::Text => render_record(record),
        OutputFormat::Json => serde_json::to_string(record)?,
    };
    let mut out = io::stdout().lock();
    writeln!(out, "{line}")?;
    out.flush()
}

/// Renders a record as a single line.
pub fn render_record(record: &EventRecord) -> String {
    let when = record.created_at.format("%Y-%m-%d %H:%M:%S");
    let who = record
        .agent_name
        .as_deref()
        .or(record.agent_id.as_deref())
        .unwrap_or("-");
    let place = match (record.board_name.as_deref(), record.task_title.as_deref()) {
        (Some(board), Some(task)) => format!(" [{board} / {task}]"),
        (None, Some(task)) => format!(" [{task}]"),
        (Some(board), None) => format!(" [{board}]"),
        (None, None) => String::new(),
    };
    let message = record
        .message
        .as_deref()
        .map(|text| text.replace('\n', " "))
        .unwrap_or_default();
    format!("{when}Z  {who}{place}  {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn renders_full_record() {
        let mut record = EventRecord::new("c1", Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap())
            .with_message("line one\nline two");
        record.agent_name = Some("builder".into());
        record.board_name = Some("Ops".into());
        record.task_title = Some("Ship it".into());

        assert_eq!(
            render_record(&record),
            "2025-01-02 03:04:05Z  builder [Ops / Ship it]  line one line two"
        );
    }

    #[test]
    fn renders_sparse_record() {
        let record = EventRecord::new("c2", Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap());
        assert_eq!(render_record(&record), "2025-01-02 00:00:00Z  -  ");
    }
}
