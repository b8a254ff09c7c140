//! Core job types.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use repogauge_core::{AccountId, DomainError, JobId};
use repogauge_retry::RetryMetadata;

/// Analysis job status.
///
/// Transitions:
///
/// ```text
/// Pending --(sweep/executor picks up)--> Processing
/// Processing --(success)--> Completed                       [terminal]
/// Processing --(failure, retryable, under budget)--> Pending
/// Processing --(failure, permanent or exhausted)--> Failed  [terminal]
/// Failed --(manual bulk retry, still retryable)--> Pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up (initially or for a retry).
    Pending,
    /// Currently being executed.
    Processing,
    /// Completed successfully.
    Completed,
    /// Failed permanently; only a manual retry can revive it.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown job status: {other}"
            ))),
        }
    }
}

/// One unit of retryable analysis work.
///
/// A job exists only after its cost was successfully debited; `credits_cost`
/// records what was charged. Retry state lives in an embedded, typed
/// [`RetryMetadata`] that is persisted together with `status` in a single
/// store write, so readers never observe a partial transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub account_id: AccountId,
    pub status: JobStatus,
    /// Credits already debited for this job at submission time.
    pub credits_cost: i64,
    /// Analysis request (repository descriptor, options).
    pub payload: JsonValue,
    /// Analysis output, present once completed.
    pub result: Option<JsonValue>,
    /// Retry state; created on first failure.
    pub retry: Option<RetryMetadata>,
    /// Actor of the last manual requeue, if any.
    pub requeued_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a freshly submitted job in `Pending`.
    pub fn new(account_id: AccountId, credits_cost: i64, payload: JsonValue) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            account_id,
            status: JobStatus::Pending,
            credits_cost,
            payload,
            result: None,
            retry: None,
            requeued_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The job's retry state, or the zero state if it has never failed.
    pub fn retry_state(&self) -> RetryMetadata {
        self.retry.clone().unwrap_or_default()
    }

    /// Whether a Pending job is due for a retry sweep at `now`.
    ///
    /// Jobs without retry metadata are first-run submissions and belong to
    /// the regular execution path, not the sweep. A cleared `next_retry_at`
    /// (manual requeue) counts as immediately due.
    pub fn ready_for_retry(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending
            && self
                .retry
                .as_ref()
                .is_some_and(|r| r.next_retry_at.is_none_or(|at| at <= now))
    }

    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, result: JsonValue) {
        self.status = JobStatus::Completed;
        self.result = Some(result);
        self.updated_at = Utc::now();
    }

    /// Apply a retry transition: re-arm as `Pending` when the metadata is
    /// still retryable, otherwise fail terminally. Status and metadata
    /// change together.
    pub fn apply_retry(&mut self, meta: RetryMetadata) {
        self.status = if meta.is_retryable {
            JobStatus::Pending
        } else {
            JobStatus::Failed
        };
        self.retry = Some(meta);
        self.updated_at = Utc::now();
    }

    /// Manual requeue: back to `Pending` with backoff bypassed.
    pub fn requeue(&mut self, actor: &str) {
        let mut meta = self.retry_state();
        meta.next_retry_at = None;
        self.retry = Some(meta);
        self.status = JobStatus::Pending;
        self.requeued_by = Some(actor.to_string());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use repogauge_retry::{RetryMetadata, RetryPolicy};

    fn test_job() -> Job {
        Job::new(AccountId::new(), 5, serde_json::json!({"repo": "git://example"}))
    }

    #[test]
    fn new_jobs_start_pending_without_retry_state() {
        let job = test_job();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.retry.is_none());
        assert_eq!(job.retry_state(), RetryMetadata::default());
    }

    #[test]
    fn first_run_jobs_are_not_sweep_candidates() {
        let job = test_job();
        assert!(!job.ready_for_retry(Utc::now()));
    }

    #[test]
    fn armed_retry_becomes_due_when_the_clock_passes() {
        let mut job = test_job();
        let now = Utc::now();

        let meta = RetryPolicy::default().next(
            &RetryMetadata::default(),
            "NETWORK_ERROR: connection reset",
            now,
        );
        job.apply_retry(meta);

        assert_eq!(job.status, JobStatus::Pending);
        assert!(!job.ready_for_retry(now));
        assert!(job.ready_for_retry(now + Duration::minutes(10)));
    }

    #[test]
    fn permanent_failure_is_terminal() {
        let mut job = test_job();
        let meta = RetryPolicy::default().next(
            &RetryMetadata::default(),
            "INVALID_API_KEY",
            Utc::now(),
        );
        job.apply_retry(meta);

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.status.is_terminal());
        assert!(!job.ready_for_retry(Utc::now()));
    }

    #[test]
    fn requeue_bypasses_backoff_and_records_the_actor() {
        let mut job = test_job();
        let meta = RetryPolicy::default().next(
            &RetryMetadata::default(),
            "NETWORK_ERROR: connection reset",
            Utc::now(),
        );
        job.apply_retry(meta);
        job.status = JobStatus::Failed;

        job.requeue("ops@example.com");

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.requeued_by.as_deref(), Some("ops@example.com"));
        assert!(job.ready_for_retry(Utc::now()));
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }
}
