//! Reconnect delay scheduling.

use crate::config::BackoffConfig;
use rand::Rng;
use std::time::Duration;

/// Smallest delay ever handed out.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Largest jitter fraction applied, whatever the config says.
const MAX_JITTER: f64 = 0.99;

/// Exponential backoff with jitter.
///
/// Owned by the synchronizer's single control flow, so no interior locking.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    /// Creates a scheduler at attempt zero.
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Returns the policy this scheduler follows.
    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    /// Returns the number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Calculates the un-jittered delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_nanos() as f64;
        let max = self.config.max_delay.as_nanos() as f64;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        // powi overflows to inf for large attempts; min() clamps that too.
        let nanos = (base * self.config.factor.powi(exponent)).min(max);
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Returns the next delay and advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let nominal = self.delay_for_attempt(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        // An unvalidated config may carry jitter >= 1, which would scale by a
        // negative factor.
        let jitter = self.config.jitter.min(MAX_JITTER);
        let delay = if jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(-jitter..=jitter);
            nominal.mul_f64(1.0 + spread)
        } else {
            nominal
        };
        delay.max(MIN_DELAY)
    }

    /// Returns to attempt zero; the next delay is about the base delay.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
