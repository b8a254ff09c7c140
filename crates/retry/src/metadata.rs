//! Retry metadata and its failure transition.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::backoff::BackoffConfig;
use crate::classify::{is_retryable_error, DEFAULT_RETRYABLE_TAGS};

/// Default retry budget per job.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// One recorded execution failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub error: String,
    /// Backoff chosen for this attempt; absent when the failure was terminal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}

/// Retry state embedded in a job.
///
/// Created on first failure, updated on every subsequent failure, never
/// rolled back. The default value is the zero state of a job that has not
/// failed yet: no attempts, still retryable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryMetadata {
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub attempts: Vec<AttemptRecord>,
    pub last_error: Option<String>,
    pub is_retryable: bool,
}

impl Default for RetryMetadata {
    fn default() -> Self {
        Self {
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            next_retry_at: None,
            attempts: Vec::new(),
            last_error: None,
            is_retryable: true,
        }
    }
}

/// Which errors are transient, how many times to retry, how long to wait.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retryable_tags: Vec<String>,
    pub backoff: BackoffConfig,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retryable_tags: DEFAULT_RETRYABLE_TAGS
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl RetryPolicy {
    pub fn is_retryable(&self, error: &str) -> bool {
        is_retryable_error(error, &self.retryable_tags)
    }

    /// Fold a new failure into the metadata.
    ///
    /// Returns the successor state, never mutating the input: attempt number
    /// is `retry_count + 1`; the result is retryable only when the error
    /// classifies as transient AND the attempt number is still under
    /// `max_retries`. Retryable failures get a backoff delay and a
    /// `next_retry_at`; terminal ones leave `next_retry_at` unset.
    pub fn next(&self, current: &RetryMetadata, error: &str, now: DateTime<Utc>) -> RetryMetadata {
        let attempt = current.retry_count + 1;
        let retryable = self.is_retryable(error) && attempt < self.max_retries;

        let mut meta = current.clone();
        meta.max_retries = self.max_retries;

        let mut record = AttemptRecord {
            attempt,
            at: now,
            error: error.to_string(),
            delay_ms: None,
        };

        if retryable {
            let delay_ms = self.backoff.delay_ms(attempt);
            record.delay_ms = Some(delay_ms);
            meta.next_retry_at = Some(now + Duration::milliseconds(delay_ms as i64));
        } else {
            meta.next_retry_at = None;
        }

        meta.attempts.push(record);
        meta.retry_count = attempt;
        meta.last_error = Some(error.to_string());
        meta.is_retryable = retryable;
        meta
    }
}
