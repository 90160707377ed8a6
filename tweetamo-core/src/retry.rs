use rand::{rng, Rng};
use std::time::Duration;

/// Bounded retry with capped exponential backoff and jitter.
///
/// Shared by the publisher (drop after the last attempt) and the shard workers
/// (fail the shard after the last attempt).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: usize,
    base_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Zero values fall back to 5 retries, 200ms base and 5s cap.
    pub fn new(max_retries: usize, base_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries: if max_retries == 0 { 5 } else { max_retries },
            base_backoff_ms: if base_backoff_ms == 0 {
                200
            } else {
                base_backoff_ms
            },
            max_backoff_ms: if max_backoff_ms == 0 {
                5_000
            } else {
                max_backoff_ms
            },
        }
    }

    /// Maximum number of retries after the first attempt.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Exponential backoff: base * 2^attempt, capped at max, with 50-100% jitter.
    pub fn calculate_backoff(&self, attempt: usize) -> Duration {
        let backoff = self.capped_backoff_ms(attempt);
        let jitter = rng().random_range(backoff / 2..=backoff);
        Duration::from_millis(jitter)
    }

    fn capped_backoff_ms(&self, attempt: usize) -> u64 {
        let factor = 1u64.checked_shl(attempt.min(32) as u32).unwrap_or(u64::MAX);
        self.base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 200, 5_000)
    }
}
