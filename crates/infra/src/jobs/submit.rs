//! Job submission: debit first, then enqueue.

use serde_json::{json, Value as JsonValue};
use tracing::{error, info};

use repogauge_billing::RepoMetrics;
use repogauge_core::AccountId;

use crate::ledger::{CreditLedger, LedgerStore};

use super::store::JobStore;
use super::types::Job;

/// Submission failure.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// Surfaced immediately, before any job work begins. Never retried.
    #[error("Insufficient credits: {required} required, {balance} available")]
    InsufficientCredits { balance: i64, required: i64 },

    #[error("debit rejected: {0}")]
    Ledger(String),

    /// The job row could not be written after the debit committed. The
    /// charge stands (no automatic refund); the caller decides how to
    /// compensate.
    #[error("job creation failed: {0}")]
    Store(String),
}

/// Submit a repository analysis: price it, debit the account, enqueue the
/// job as `Pending`.
///
/// The debit commits before the job exists, so a job row always represents
/// paid-for work.
pub async fn submit_analysis<L, J>(
    ledger: &CreditLedger<L>,
    jobs: &J,
    account_id: AccountId,
    metrics: &RepoMetrics,
    payload: JsonValue,
) -> Result<Job, SubmissionError>
where
    L: LedgerStore,
    J: JobStore,
{
    let cost = ledger.estimate_cost(metrics);

    let outcome = ledger
        .debit(
            account_id,
            cost,
            "Repository analysis",
            json!({
                "repository_size_kb": metrics.repository_size_kb,
                "file_count": metrics.file_count,
                "complexity": metrics.complexity,
            }),
        )
        .await;

    if !outcome.success {
        let message = outcome
            .error
            .unwrap_or_else(|| "debit rejected".to_string());
        if message == "Insufficient credits" {
            return Err(SubmissionError::InsufficientCredits {
                balance: outcome.new_balance,
                required: cost,
            });
        }
        return Err(SubmissionError::Ledger(message));
    }

    let job = Job::new(account_id, cost, payload);
    match jobs.insert(job.clone()).await {
        Ok(job_id) => {
            info!(%job_id, %account_id, credits = cost, "analysis submitted");
            Ok(job)
        }
        Err(err) => {
            error!(%account_id, credits = cost, error = %err, "job creation failed after debit");
            Err(SubmissionError::Store(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repogauge_billing::TransactionKind;

    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::JobStatus;
    use crate::ledger::InMemoryLedgerStore;

    #[tokio::test]
    async fn submission_debits_then_creates_a_pending_job() {
        let ledger = CreditLedger::new(InMemoryLedgerStore::new());
        let jobs = InMemoryJobStore::new();
        let account_id = AccountId::new();
        ledger
            .credit(
                account_id,
                100,
                TransactionKind::Purchase,
                "top-up",
                JsonValue::Null,
            )
            .await;

        let metrics = RepoMetrics::new(1000, 50, 5);
        let job = submit_analysis(&ledger, &jobs, account_id, &metrics, json!({"repo": "x"}))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.credits_cost, 23);
        assert_eq!(ledger.balance(account_id).await, 77);
        assert!(jobs.get(job.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn insufficient_credits_block_submission_entirely() {
        let ledger = CreditLedger::new(InMemoryLedgerStore::new());
        let jobs = InMemoryJobStore::new();
        let account_id = AccountId::new();
        ledger
            .credit(
                account_id,
                5,
                TransactionKind::Purchase,
                "top-up",
                JsonValue::Null,
            )
            .await;

        let metrics = RepoMetrics::new(1000, 50, 5);
        let err = submit_analysis(&ledger, &jobs, account_id, &metrics, json!({}))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SubmissionError::InsufficientCredits {
                balance: 5,
                required: 23
            }
        ));
        // No job row, no charge.
        assert_eq!(ledger.balance(account_id).await, 5);
    }
}
