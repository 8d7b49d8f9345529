//! Frames command implementation.

use super::OutputFormat;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use livefeed_engine::{FeedConfig, FeedTransport, Frame, FrameDecoder, HttpTransport, StreamRequest};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// JSON shape of one dumped frame.
#[derive(Debug, Serialize)]
struct FrameOutput<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_ms: Option<u64>,
    data: Value,
}

/// Runs the frames command.
pub async fn run(
    config: &FeedConfig,
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(config)?;
    let cancel = CancellationToken::new();
    let request = StreamRequest {
        since,
        board_id: config.board_id,
    };
    let mut body = transport.open_stream(&request, cancel.clone()).await?;
    tracing::info!(url = transport.stream_url(), "stream open");

    let mut decoder = FrameDecoder::new();
    let mut shown = 0usize;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    'read: loop {
        let next = tokio::select! {
            _ = &mut ctrl_c => break,
            next = body.next() => next,
        };
        match next {
            Some(Ok(chunk)) => {
                for frame in decoder.push(&chunk) {
                    print_frame(&frame, format)?;
                    shown += 1;
                    if limit.is_some_and(|limit| shown >= limit) {
                        break 'read;
                    }
                }
            }
            Some(Err(err)) => return Err(err.into()),
            None => {
                tracing::info!("stream closed by server");
                break;
            }
        }
    }

    cancel.cancel();
    let discarded = decoder.finish();
    tracing::info!(frames = shown, bytes = decoder.bytes_seen(), discarded, "done");
    Ok(())
}

fn print_frame(frame: &Frame, format: OutputFormat) -> Result<(), serde_json::Error> {
    match format {
        OutputFormat::Text => {
            let id = frame.id.as_deref().map(|id| format!(" id={id}")).unwrap_or_default();
            println!("[{}]{id} {}", frame.event, frame.data);
        }
        OutputFormat::Json => {
            let output = FrameOutput {
                event: &frame.event,
                id: frame.id.as_deref(),
                retry_ms: frame.retry_ms,
                data: serde_json::from_str(&frame.data)
                    .unwrap_or_else(|_| Value::String(frame.data.clone())),
            };
            println!("{}", serde_json::to_string(&output)?);
        }
    }
    Ok(())
}
