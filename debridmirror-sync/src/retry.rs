//! Exponential backoff policy for remote calls.

use crate::error::SyncError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable retry settings, threaded by reference through every call.
///
/// The delay before retry `n` (1-based, counting failed attempts) is
/// `min(2^(n-1) * base_delay, max_delay) * jitter` with `jitter` drawn from
/// `[jitter_min, jitter_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 7,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_min: 0.8,
            jitter_max: 1.2,
        }
    }
}

impl RetryPolicy {
    /// Whether a failure on `attempt` (1-based) earns another try.
    pub fn should_retry(&self, attempt: u32, error: &SyncError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }

    /// Backoff before the retry that follows failed `attempt`, for a given
    /// jitter factor. Pure, so it can be checked without a clock.
    pub fn delay_for(&self, attempt: u32, jitter: f64) -> Duration {
        let exp = attempt.saturating_sub(1).min(32);
        let raw = self.base_delay_ms.saturating_mul(1u64 << exp);
        let capped = raw.min(self.max_delay_ms);
        Duration::from_millis(capped).mul_f64(jitter.max(0.0))
    }

    /// [`delay_for`](Self::delay_for) with a freshly drawn jitter factor.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let jitter = if self.jitter_max > self.jitter_min {
            rand::rng().random_range(self.jitter_min..=self.jitter_max)
        } else {
            self.jitter_min
        };
        self.delay_for(attempt, jitter)
    }
}
