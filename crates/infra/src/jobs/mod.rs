//! Jobs subsystem: types, storage, retry scheduling, submission, and the
//! executor boundary.

pub mod executor;
pub mod postgres;
pub mod scheduler;
pub mod store;
pub mod submit;
pub mod types;

pub use executor::{AnalysisExecutor, ExecutorError};
pub use postgres::PostgresJobStore;
pub use scheduler::{
    BulkRetryFailure, BulkRetryOutcome, RetryDecision, RetryScheduler, SchedulerError,
};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use submit::{submit_analysis, SubmissionError};
pub use types::{Job, JobStatus};
