use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use repogauge_core::AccountId;

/// A prepaid credit account.
///
/// Invariant: `balance` never goes negative, and every change to it is paired
/// with exactly one [`crate::Transaction`] row. Both are enforced by the
/// ledger's atomic debit/credit operations; nothing else mutates an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Balance in credits (whole units).
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A fresh account with a zero balance.
    pub fn new(id: AccountId) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
