//! Configuration for the feed synchronizer.

use crate::error::{FeedError, FeedResult};
use std::time::Duration;
use uuid::Uuid;

/// Default resource serving the task comment feed.
pub const DEFAULT_RESOURCE: &str = "/api/v1/activity/task-comments";

/// Default number of records kept in the store.
pub const DEFAULT_CAPACITY: usize = 200;

/// Configuration for one live feed.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Server base URL (e.g. `https://mission.example.com`).
    pub base_url: String,
    /// Feed resource path; the stream lives at `<resource>/stream`.
    pub resource: String,
    /// Number of records requested by the snapshot read.
    pub snapshot_limit: u32,
    /// Maximum number of records retained.
    pub capacity: usize,
    /// Frame event type that carries records.
    pub record_event: String,
    /// Key the record is wrapped in inside the frame payload.
    pub envelope_key: Option<String>,
    /// Restrict the feed to one board.
    pub board_id: Option<Uuid>,
    /// Bearer token sent with every request.
    pub auth_token: Option<String>,
    /// Timeout for the snapshot read. The stream has none.
    pub request_timeout: Duration,
    /// Reconnect policy.
    pub backoff: BackoffConfig,
}

impl FeedConfig {
    /// Creates a configuration for the task comment feed at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            resource: DEFAULT_RESOURCE.to_string(),
            snapshot_limit: DEFAULT_CAPACITY as u32,
            capacity: DEFAULT_CAPACITY,
            record_event: "comment".to_string(),
            envelope_key: Some("comment".to_string()),
            board_id: None,
            auth_token: None,
            request_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
        }
    }

    /// Sets the feed resource path.
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Sets the store capacity and the snapshot limit together.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self.snapshot_limit = u32::try_from(capacity).unwrap_or(u32::MAX);
        self
    }

    /// Sets the snapshot limit independently of the capacity.
    pub fn with_snapshot_limit(mut self, limit: u32) -> Self {
        self.snapshot_limit = limit;
        self
    }

    /// Sets the record event type and its payload envelope.
    pub fn with_record_event(
        mut self,
        event: impl Into<String>,
        envelope_key: Option<String>,
    ) -> Self {
        self.record_event = event.into();
        self.envelope_key = envelope_key;
        self
    }

    /// Restricts the feed to a single board.
    pub fn with_board(mut self, board_id: Uuid) -> Self {
        self.board_id = Some(board_id);
        self
    }

    /// Sets the bearer token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Sets the snapshot request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the reconnect policy.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Checks every field, returning the first problem found.
    pub fn validate(&self) -> FeedResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(FeedError::invalid_config("base_url", "must not be empty"));
        }
        if !self.resource.starts_with('/') {
            return Err(FeedError::invalid_config("resource", "must start with '/'"));
        }
        if self.capacity == 0 {
            return Err(FeedError::invalid_config("capacity", "must be > 0"));
        }
        if self.snapshot_limit == 0 {
            return Err(FeedError::invalid_config("snapshot_limit", "must be > 0"));
        }
        if self.record_event.trim().is_empty() {
            return Err(FeedError::invalid_config("record_event", "must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(FeedError::invalid_config("request_timeout", "must be > 0"));
        }
        self.backoff.validate()
    }

    /// Returns the snapshot URL.
    pub fn snapshot_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.resource)
    }

    /// Returns the stream URL.
    pub fn stream_url(&self) -> String {
        format!("{}/stream", self.snapshot_url())
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self::new("http://127.0.0.1:8000")
    }
}

/// Reconnect delay policy.
///
/// Delay for attempt `n` (0-indexed) is `min(base * factor^n, max)`,
/// perturbed by up to `jitter` of itself in either direction.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Delay before the first reconnect.
    pub base_delay: Duration,
    /// Growth factor per attempt.
    pub factor: f64,
    /// Jitter fraction in `[0, 1)`.
    pub jitter: f64,
    /// Upper bound before jitter.
    pub max_delay: Duration,
}

impl BackoffConfig {
    /// Creates a policy with the given bounds and default factor and jitter.
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    /// Sets the growth factor.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    /// Sets the jitter fraction.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Checks the policy bounds.
    pub fn validate(&self) -> FeedResult<()> {
        if self.base_delay.is_zero() {
            return Err(FeedError::invalid_config("backoff.base_delay", "must be > 0"));
        }
        if self.max_delay < self.base_delay {
            return Err(FeedError::invalid_config(
                "backoff.max_delay",
                "must be >= base_delay",
            ));
        }
        if !(self.factor >= 1.0) || !self.factor.is_finite() {
            return Err(FeedError::invalid_config("backoff.factor", "must be >= 1.0"));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(FeedError::invalid_config("backoff.jitter", "must be in [0, 1)"));
        }
        Ok(())
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.2,
            max_delay: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_config_builder() {
        let board = Uuid::new_v4();
        let config = FeedConfig::new("https://mission.example.com/")
            .with_capacity(50)
            .with_board(board)
            .with_auth_token("secret")
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.capacity, 50);
        assert_eq!(config.snapshot_limit, 50);
        assert_eq!(config.board_id, Some(board));
        assert_eq!(config.auth_token.as_deref(), Some("secret"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.snapshot_url(),
            "https://mission.example.com/api/v1/activity/task-comments"
        );
        assert_eq!(
            config.stream_url(),
            "https://mission.example.com/api/v1/activity/task-comments/stream"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn feed_config_rejects_bad_values() {
        assert!(FeedConfig::new("").validate().is_err());
        assert!(FeedConfig::default().with_capacity(0).validate().is_err());
        assert!(FeedConfig::default()
            .with_resource("no-slash")
            .validate()
            .is_err());
        assert!(FeedConfig::default()
            .with_record_event(" ", None)
            .validate()
            .is_err());

        let err = FeedConfig::default()
            .with_snapshot_limit(0)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("snapshot_limit"));
    }

    #[test]
    fn backoff_config_validation() {
        assert!(BackoffConfig::default().validate().is_ok());
        assert!(BackoffConfig::new(Duration::ZERO, Duration::from_secs(1))
            .validate()
            .is_err());
        assert!(
            BackoffConfig::new(Duration::from_secs(2), Duration::from_secs(1))
                .validate()
                .is_err()
        );
        assert!(BackoffConfig::default().with_factor(0.5).validate().is_err());
        assert!(BackoffConfig::default()
            .with_factor(f64::NAN)
            .validate()
            .is_err());
        assert!(BackoffConfig::default().with_jitter(1.0).validate().is_err());
        assert!(BackoffConfig::default().with_jitter(-0.1).validate().is_err());
        assert!(BackoffConfig::default().with_jitter(0.0).validate().is_ok());
    }
}
