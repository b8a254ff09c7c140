//! The analysis execution boundary.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use super::types::Job;

/// External collaborator performing the actual analysis (repository fetch +
/// AI call).
///
/// The engine never looks inside the work; it only debits cost up front and
/// interprets the outcome. Failure messages are free text and feed directly
/// into retry classification. Implementations must be idempotent per job:
/// the sweep tolerates at-least-once pickup across process instances.
#[async_trait]
pub trait AnalysisExecutor: Send + Sync {
    async fn execute(&self, job: &Job) -> Result<JsonValue, ExecutorError>;
}

/// Execution failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutorError {
    /// Provider-reported failure; the message drives retry classification.
    #[error("{0}")]
    Failed(String),

    /// The call exceeded its deadline. Displays with a TIMEOUT_ERROR tag so
    /// classification treats it as transient.
    #[error("TIMEOUT_ERROR: analysis execution timed out")]
    TimedOut,
}

impl ExecutorError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repogauge_retry::{is_retryable_error, DEFAULT_RETRYABLE_TAGS};

    #[test]
    fn timeout_classifies_as_transient() {
        let msg = ExecutorError::TimedOut.to_string();
        assert!(is_retryable_error(&msg, DEFAULT_RETRYABLE_TAGS));
    }

    #[test]
    fn failed_preserves_the_provider_message() {
        let msg = ExecutorError::failed("INVALID_API_KEY").to_string();
        assert_eq!(msg, "INVALID_API_KEY");
        assert!(!is_retryable_error(&msg, DEFAULT_RETRYABLE_TAGS));
    }
}
