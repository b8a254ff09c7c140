//! Retry policy module (error classification, backoff, retry metadata).
//!
//! Pure domain logic only: everything here is a total function over its
//! inputs. Persisting metadata and re-running jobs is the scheduler's job.

pub mod backoff;
pub mod classify;
pub mod metadata;

pub use backoff::BackoffConfig;
pub use classify::{is_retryable_error, DEFAULT_RETRYABLE_TAGS};
pub use metadata::{AttemptRecord, RetryMetadata, RetryPolicy, DEFAULT_MAX_RETRIES};
