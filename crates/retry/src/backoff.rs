//! Exponential backoff with jitter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backoff configuration for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Hard cap on any single delay.
    pub max_delay_ms: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            multiplier: 2.0,
            max_delay_ms: 300_000,
        }
    }
}

impl BackoffConfig {
    /// Delay in milliseconds before retry `attempt` (1-indexed).
    ///
    /// `min(base * multiplier^(attempt-1) + jitter, max)`, where jitter is
    /// uniform in `[0, 0.1 * raw)`. The jitter spreads retries of many jobs
    /// that failed together, so they do not hammer the provider in lockstep.
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let raw = self.base_delay_ms as f64 * self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let jitter = rand::random::<f64>() * raw * 0.1;
        (raw + jitter).min(self.max_delay_ms as f64) as u64
    }

    /// Same as [`delay_ms`](Self::delay_ms), as a `Duration`.
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}
