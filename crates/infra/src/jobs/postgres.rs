//! Postgres-backed job store.
//!
//! Schema (conceptual):
//!
//! ```sql
//! CREATE TABLE jobs (
//!     id           UUID PRIMARY KEY,
//!     account_id   UUID NOT NULL,
//!     status       TEXT NOT NULL,
//!     credits_cost BIGINT NOT NULL,
//!     payload      JSONB NOT NULL,
//!     result       JSONB,
//!     retry        JSONB,
//!     requeued_by  TEXT,
//!     created_at   TIMESTAMPTZ NOT NULL,
//!     updated_at   TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE INDEX jobs_pending_created ON jobs (created_at) WHERE status = 'pending';
//! ```
//!
//! Retry metadata lives in the `retry` JSONB column and is written by the
//! same `UPDATE` as `status`, so a job's state transition is one atomic row
//! write. The column is deserialized into the typed metadata struct at this
//! boundary; business logic never sees raw JSON.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;

use repogauge_core::{AccountId, JobId};
use repogauge_retry::RetryMetadata;

use super::store::{JobStore, JobStoreError};
use super::types::Job;

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("{operation}: {err}"))
}

fn retry_to_json(retry: &Option<RetryMetadata>) -> Result<Option<JsonValue>, JobStoreError> {
    retry
        .as_ref()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| JobStoreError::Storage(format!("retry metadata encode: {e}")))
}

fn job_from_row(row: &PgRow) -> Result<Job, JobStoreError> {
    let decode = |e: sqlx::Error| JobStoreError::Storage(format!("decode job row: {e}"));

    let status: String = row.try_get("status").map_err(decode)?;
    let retry: Option<JsonValue> = row.try_get("retry").map_err(decode)?;
    let retry = retry
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| JobStoreError::Storage(format!("retry metadata decode: {e}")))?;

    Ok(Job {
        id: JobId::from_uuid(row.try_get("id").map_err(decode)?),
        account_id: AccountId::from_uuid(row.try_get("account_id").map_err(decode)?),
        status: status
            .parse()
            .map_err(|e| JobStoreError::Storage(format!("decode job row: {e}")))?,
        credits_cost: row.try_get("credits_cost").map_err(decode)?,
        payload: row.try_get("payload").map_err(decode)?,
        result: row.try_get("result").map_err(decode)?,
        retry,
        requeued_by: row.try_get("requeued_by").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn insert(&self, job: Job) -> Result<JobId, JobStoreError> {
        let retry = retry_to_json(&job.retry)?;

        sqlx::query(
            r#"
            INSERT INTO jobs (id, account_id, status, credits_cost, payload, result, retry,
                              requeued_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.account_id.as_uuid())
        .bind(job.status.as_str())
        .bind(job.credits_cost)
        .bind(&job.payload)
        .bind(&job.result)
        .bind(&retry)
        .bind(&job.requeued_by)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation()) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("insert_job", e)
            }
        })?;

        Ok(job.id)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, status, credits_cost, payload, result, retry,
                   requeued_by, created_at, updated_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("get_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status), err)]
    async fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let retry = retry_to_json(&job.retry)?;

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, result = $3, retry = $4, requeued_by = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(&job.result)
        .bind(&retry)
        .bind(&job.requeued_by)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(JobStoreError::NotFound(job.id));
        }
        Ok(())
    }

    async fn ready_for_retry(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, status, credits_cost, payload, result, retry,
                   requeued_by, created_at, updated_at
            FROM jobs
            WHERE status = 'pending'
              AND retry IS NOT NULL
              AND ((retry->>'next_retry_at') IS NULL
                   OR (retry->>'next_retry_at')::timestamptz <= $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("ready_for_retry", e))?;

        rows.iter().map(job_from_row).collect()
    }
}
