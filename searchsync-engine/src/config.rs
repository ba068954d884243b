//! Engine configuration.
//!
//! Configuration values are immutable and passed explicitly; there is no
//! process-wide endpoint cache.

use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Documents per bulk write.
pub const BATCH_SIZE: usize = 100;

/// Whole milliseconds of `duration`, capped at `u64::MAX`.
fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Bounded linear backoff for transient network failures.
///
/// The delay before retry `n` (1-based) is
/// `back_off_rate * n + uniform(0, back_off_rate)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff step in milliseconds.
    pub back_off_rate_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            back_off_rate_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    pub fn new(max_attempts: u32, back_off_rate: Duration) -> Self {
        Self {
            max_attempts,
            back_off_rate_ms: saturating_millis(back_off_rate),
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// The backoff step.
    pub fn back_off_rate(&self) -> Duration {
        Duration::from_millis(self.back_off_rate_ms)
    }

    /// Delay after failed attempt `attempt`, with `jitter` in `[0, 1)`.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let rate = self.back_off_rate();
        rate.saturating_mul(attempt)
            .saturating_add(rate.mul_f64(jitter.clamp(0.0, 1.0)))
    }
}

/// Configuration for the synchronization engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry policy applied to every request.
    pub retry: RetryPolicy,
    /// Documents per bulk write.
    pub batch_size: usize,
    /// Per-request timeout (ms).
    pub request_timeout_ms: u64,
    /// Serialize overlapping syncs of the same collection type.
    pub serialize_syncs: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            batch_size: BATCH_SIZE,
            request_timeout_ms: 60_000,
            serialize_syncs: true,
        }
    }
}

impl EngineConfig {
    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the bulk batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = saturating_millis(timeout);
        self
    }

    /// Enables or disables per-type serialization of overlapping syncs.
    pub fn with_serialized_syncs(mut self, serialize: bool) -> Self {
        self.serialize_syncs = serialize;
        self
    }

    /// The per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> IndexResult<()> {
        if self.batch_size == 0 {
            return Err(IndexError::Config("batch_size must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(IndexError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
