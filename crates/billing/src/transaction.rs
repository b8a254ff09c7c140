use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use repogauge_core::{AccountId, DomainError, TransactionId};

/// Classification of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Credits bought through the payment provider.
    Purchase,
    /// Credits consumed by an analysis job.
    Deduction,
    Refund,
    Bonus,
}

impl TransactionKind {
    /// Deductions are recorded negative; every other kind adds credits.
    pub fn signed_amount(&self, amount: i64) -> i64 {
        match self {
            TransactionKind::Deduction => -amount,
            _ => amount,
        }
    }

    pub fn is_credit(&self) -> bool {
        !matches!(self, TransactionKind::Deduction)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Purchase => "purchase",
            TransactionKind::Deduction => "deduction",
            TransactionKind::Refund => "refund",
            TransactionKind::Bonus => "bonus",
        }
    }
}

impl core::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionKind::Purchase),
            "deduction" => Ok(TransactionKind::Deduction),
            "refund" => Ok(TransactionKind::Refund),
            "bonus" => Ok(TransactionKind::Bonus),
            other => Err(DomainError::validation(format!(
                "unknown transaction kind: {other}"
            ))),
        }
    }
}

/// One immutable row in the account audit trail.
///
/// Append-only: never mutated or deleted after creation. The transaction log
/// is the source of truth for balance reconstruction and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    /// Signed amount in credits: negative for deductions, positive otherwise.
    pub amount: i64,
    pub description: String,
    /// Free-form context (job id, payment reference, actor).
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Record a mutation of `amount` credits (unsigned; the kind decides the
    /// sign under which it lands in the log).
    pub fn record(
        account_id: AccountId,
        kind: TransactionKind,
        amount: i64,
        description: impl Into<String>,
        metadata: JsonValue,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            account_id,
            kind,
            amount: kind.signed_amount(amount),
            description: description.into(),
            metadata,
            created_at: Utc::now(),
        }
    }
}
