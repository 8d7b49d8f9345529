//! HTTP transport implementation.
//!
//! The snapshot is a plain `GET` returning JSON. The stream is a long-lived
//! `GET` whose `text/event-stream` body is handed to the synchronizer chunk
//! by chunk.

use crate::config::FeedConfig;
use crate::error::{FeedError, FeedResult};
use crate::transport::{ByteStream, FeedTransport, SnapshotRequest, StreamRequest};
use async_trait::async_trait;
use futures_util::StreamExt;
use livefeed_protocol::{format_cursor, SnapshotPage};
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Longest slice of an error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// HTTP-based feed transport built on `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    snapshot_url: String,
    stream_url: String,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Creates a transport for the feed described by `config`.
    pub fn new(config: &FeedConfig) -> FeedResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("livefeed/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|err| FeedError::invalid_config("http_client", err.to_string()))?;
        Ok(Self::with_client(config, client))
    }

    /// Creates a transport reusing an existing client.
    ///
    /// The client must not carry a global request timeout, or long-lived
    /// streams will be cut off.
    pub fn with_client(config: &FeedConfig, client: reqwest::Client) -> Self {
        Self {
            client,
            snapshot_url: config.snapshot_url(),
            stream_url: config.stream_url(),
            auth_token: config.auth_token.clone(),
            request_timeout: config.request_timeout,
        }
    }

    /// Returns the snapshot URL.
    pub fn snapshot_url(&self) -> &str {
        &self.snapshot_url
    }

    /// Returns the stream URL.
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn fetch_snapshot(&self, request: &SnapshotRequest) -> FeedResult<SnapshotPage> {
        let mut query = vec![("limit", request.limit.to_string())];
        if let Some(board_id) = request.board_id {
            query.push(("board_id", board_id.to_string()));
        }

        let response = self
            .authorized(self.client.get(&self.snapshot_url))
            .query(&query)
            .header(ACCEPT, "application/json")
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|err| FeedError::snapshot(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::SnapshotFetch {
                message: describe_failure(response).await,
                status: Some(status.as_u16()),
            });
        }

        let body = response.bytes().await.map_err(|err| FeedError::SnapshotFetch {
            message: format!("reading body: {err}"),
            status: Some(status.as_u16()),
        })?;
        let page = SnapshotPage::from_json(&body).map_err(|err| FeedError::SnapshotFetch {
            message: format!("invalid snapshot body: {err}"),
            status: Some(status.as_u16()),
        })?;

        if page.rejected > 0 {
            tracing::debug!(rejected = page.rejected, "snapshot items dropped");
        }
        Ok(page)
    }

    async fn open_stream(
        &self,
        request: &StreamRequest,
        cancel: CancellationToken,
    ) -> FeedResult<ByteStream> {
        let mut query = Vec::new();
        if let Some(since) = &request.since {
            query.push(("since", format_cursor(since)));
        }
        if let Some(board_id) = request.board_id {
            query.push(("board_id", board_id.to_string()));
        }

        let send = self
            .authorized(self.client.get(&self.stream_url))
            .query(&query)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FeedError::StreamAborted),
            result = send => result.map_err(|err| {
                FeedError::connect_retryable(err.to_string(), err.status().map(|s| s.as_u16()))
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let message = describe_failure(response).await;
            return Err(if is_transient(status) {
                FeedError::connect_retryable(message, Some(status.as_u16()))
            } else {
                FeedError::connect_fatal(message, Some(status.as_u16()))
            });
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|err| FeedError::StreamRead(err.to_string())))
            .take_until(cancel.cancelled_owned());
        Ok(body.boxed())
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

async fn describe_failure(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let text = text.trim();
    if text.is_empty() {
        return format!("HTTP {}", status.as_u16());
    }
    let mut end = text.len().min(ERROR_BODY_LIMIT);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("HTTP {}: {}", status.as_u16(), &text[..end])
}
