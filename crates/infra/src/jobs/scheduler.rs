//! Retry scheduling over the job store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use repogauge_core::JobId;
use repogauge_retry::RetryPolicy;

use super::store::{JobStore, JobStoreError};
use super::types::JobStatus;

/// Scheduler operation error.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The referenced job does not exist: a bug or race-condition signal,
    /// propagated hard rather than swallowed.
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<JobStoreError> for SchedulerError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(id) => SchedulerError::JobNotFound(id),
            other => SchedulerError::Storage(other.to_string()),
        }
    }
}

/// Outcome of [`RetryScheduler::schedule_retry`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryDecision {
    pub scheduled: bool,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
}

/// Per-item failure reported by [`RetryScheduler::bulk_retry`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BulkRetryFailure {
    pub id: JobId,
    pub reason: String,
}

/// Per-item result of a manual bulk retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkRetryOutcome {
    pub successful: Vec<JobId>,
    pub failed: Vec<BulkRetryFailure>,
}

/// Decides whether and when failed jobs run again.
pub struct RetryScheduler<S: JobStore> {
    store: S,
    policy: RetryPolicy,
}

impl<S: JobStore> RetryScheduler<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetryPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Record a failure and either re-arm the job (`Pending`, future
    /// `next_retry_at`) or fail it terminally.
    ///
    /// Status and retry metadata are persisted in one store update, so no
    /// reader observes a partial transition.
    pub async fn schedule_retry(
        &self,
        job_id: JobId,
        error: &str,
    ) -> Result<RetryDecision, SchedulerError> {
        let mut job = self
            .store
            .get(job_id)
            .await?
            .ok_or(SchedulerError::JobNotFound(job_id))?;

        let meta = self.policy.next(&job.retry_state(), error, Utc::now());
        let decision = RetryDecision {
            scheduled: meta.is_retryable,
            next_retry_at: meta.next_retry_at,
            retry_count: meta.retry_count,
        };

        job.apply_retry(meta);
        self.store.update(&job).await?;

        if decision.scheduled {
            debug!(
                %job_id,
                retry_count = decision.retry_count,
                next_retry_at = ?decision.next_retry_at,
                error,
                "retry armed"
            );
        } else {
            warn!(%job_id, retry_count = decision.retry_count, error, "job failed terminally");
        }

        Ok(decision)
    }

    /// Pending jobs whose retry is due, oldest first, capped at `limit`.
    ///
    /// Degrades to an empty list on store faults: a sweep tolerates a missed
    /// poll better than a crash.
    pub async fn jobs_ready_for_retry(&self, limit: usize) -> Vec<JobId> {
        match self.store.ready_for_retry(Utc::now(), limit).await {
            Ok(jobs) => jobs.into_iter().map(|j| j.id).collect(),
            Err(err) => {
                warn!(error = %err, "ready-for-retry query failed, returning no work");
                Vec::new()
            }
        }
    }

    /// Manually requeue a batch of failed jobs for immediate reprocessing.
    ///
    /// Each id is checked independently (exists, `Failed`, retry budget not
    /// exhausted); one job's rejection never aborts the batch.
    pub async fn bulk_retry(&self, job_ids: &[JobId], actor: &str) -> BulkRetryOutcome {
        let mut outcome = BulkRetryOutcome::default();
        for &id in job_ids {
            match self.requeue(id, actor).await {
                Ok(()) => outcome.successful.push(id),
                Err(reason) => {
                    debug!(job_id = %id, actor, %reason, "bulk retry item rejected");
                    outcome.failed.push(BulkRetryFailure { id, reason });
                }
            }
        }
        outcome
    }

    async fn requeue(&self, job_id: JobId, actor: &str) -> Result<(), String> {
        let job = self.store.get(job_id).await.map_err(|e| e.to_string())?;
        let Some(mut job) = job else {
            return Err("Analysis not found or access denied".to_string());
        };

        if job.status != JobStatus::Failed {
            return Err(format!("Job is {} and cannot be retried", job.status));
        }
        if !job.retry_state().is_retryable {
            return Err("Retry limit exhausted".to_string());
        }

        job.requeue(actor);
        self.store.update(&job).await.map_err(|e| e.to_string())
    }
}
