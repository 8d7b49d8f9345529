//! Incremental `text/event-stream` frame decoding.
//!
//! Bytes arrive in arbitrary chunks. The decoder normalizes line endings,
//! splits the text at blank lines and turns each complete block into a
//! [`Frame`]. Whatever follows the last blank line stays buffered until the
//! next chunk completes it.

use crate::error::ProtocolResult;
use crate::record::EventRecord;

/// Event type used when a frame has no `event:` line.
pub const DEFAULT_EVENT: &str = "message";

/// One decoded unit of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Event type from the `event:` field, or [`DEFAULT_EVENT`].
    pub event: String,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// Value of the last `id:` field, if any.
    pub id: Option<String>,
    /// Reconnection hint from a `retry:` field, in milliseconds.
    pub retry_ms: Option<u64>,
}

impl Frame {
    /// Creates a frame with the given type and payload.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
            retry_ms: None,
        }
    }

    /// Decodes the payload as a feed record.
    pub fn record(&self, envelope_key: Option<&str>) -> ProtocolResult<EventRecord> {
        EventRecord::from_payload(&self.data, envelope_key)
    }

    /// Parses a complete block (without its terminating blank line).
    ///
    /// Returns `None` for blocks that carry no data, such as keep-alive
    /// comments.
    fn parse(block: &str) -> Option<Self> {
        let mut event = None;
        let mut data: Vec<&str> = Vec::new();
        let mut id = None;
        let mut retry_ms = None;

        for line in block.split('\n') {
            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "event" => event = Some(value),
                "data" => data.push(value),
                "id" => id = Some(value.to_string()),
                "retry" => retry_ms = value.trim().parse().ok(),
                _ => {}
            }
        }

        if data.is_empty() {
            return None;
        }

        Some(Self {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or(DEFAULT_EVENT)
                .to_string(),
            data: data.join("\n"),
            id,
            retry_ms,
        })
    }
}

/// Stateful decoder for a single connection.
///
/// A new decoder must be used for every connection; leftovers from a dead
/// connection never leak into the next one.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Normalized bytes not yet terminated by a blank line.
    buffer: Vec<u8>,
    /// The last byte seen was `\r`, so an immediately following `\n` is swallowed.
    pending_cr: bool,
    /// Offset in `buffer` before which no delimiter can start.
    scanned: usize,
    /// Total bytes accepted.
    bytes_seen: u64,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.bytes_seen += chunk.len() as u64;
        self.normalize_into_buffer(chunk);

        let mut frames = Vec::new();
        while let Some(end) = self.find_delimiter() {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            self.scanned = 0;
            let text = String::from_utf8_lossy(&block[..end]);
            if let Some(frame) = Frame::parse(&text) {
                frames.push(frame);
            }
        }
        self.scanned = self.buffer.len().saturating_sub(1);
        frames
    }

    /// Signals the end of the byte source.
    ///
    /// An unterminated trailing block is discarded; the number of discarded
    /// bytes is returned.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        self.pending_cr = false;
        self.scanned = 0;
        discarded
    }

    /// Returns the number of buffered bytes awaiting a delimiter.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the total number of bytes fed to this decoder.
    pub fn bytes_seen(&self) -> u64 {
        self.bytes_seen
    }

    fn normalize_into_buffer(&mut self, chunk: &[u8]) {
        self.buffer.reserve(chunk.len());
        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            if byte == b'\r' {
                self.buffer.push(b'\n');
                self.pending_cr = true;
            } else {
                self.buffer.push(byte);
            }
        }
    }

    fn find_delimiter(&self) -> Option<usize> {
        let start = self.scanned.min(self.buffer.len());
        self.buffer[start..]
            .windows(2)
            .position(|pair| pair == b"\n\n")
            .map(|offset| start + offset)
    }
}
