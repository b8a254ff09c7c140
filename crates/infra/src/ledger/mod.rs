//! Credit ledger: atomic debit/credit over an account store, with an
//! append-only audit trail.

pub mod postgres;
pub mod store;

pub use postgres::PostgresLedgerStore;
pub use store::{InMemoryLedgerStore, LedgerStore, LedgerStoreError};

use serde_json::Value as JsonValue;
use tracing::{debug, error};

use repogauge_billing::{calculator, LedgerOutcome, RepoMetrics, TransactionKind};
use repogauge_core::AccountId;

/// Service wrapper enforcing the ledger's never-throws boundary.
///
/// Store faults and rejections surface as [`LedgerOutcome`] with
/// `success = false`; callers are forced onto the failure path explicitly
/// rather than through a panic or error bubble.
pub struct CreditLedger<S: LedgerStore> {
    store: S,
}

impl<S: LedgerStore> CreditLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Current balance. Unknown accounts read as 0; a store fault also
    /// degrades to 0 (logged), keeping reads total.
    pub async fn balance(&self, account_id: AccountId) -> i64 {
        match self.store.balance(account_id).await {
            Ok(balance) => balance,
            Err(err) => {
                error!(%account_id, error = %err, "balance read failed");
                0
            }
        }
    }

    pub async fn has_sufficient_credits(&self, account_id: AccountId, amount: i64) -> bool {
        self.balance(account_id).await >= amount
    }

    /// Debit `amount` credits, appending one `Deduction` row.
    ///
    /// Insufficient funds reject with `"Insufficient credits"` and the
    /// balance observed by the aborted attempt. Store faults report the
    /// underlying message plus a best-effort re-read of the balance.
    pub async fn debit(
        &self,
        account_id: AccountId,
        amount: i64,
        description: &str,
        metadata: JsonValue,
    ) -> LedgerOutcome {
        if amount <= 0 {
            return LedgerOutcome::rejected(
                self.balance(account_id).await,
                "Amount must be positive",
            );
        }

        match self
            .store
            .apply_debit(account_id, amount, description, metadata)
            .await
        {
            Ok(new_balance) => {
                debug!(%account_id, amount, new_balance, "debit applied");
                LedgerOutcome::ok(new_balance)
            }
            Err(LedgerStoreError::InsufficientCredits { balance }) => {
                debug!(%account_id, amount, balance, "debit rejected, insufficient credits");
                LedgerOutcome::rejected(balance, "Insufficient credits")
            }
            Err(err) => {
                error!(%account_id, amount, error = %err, "debit failed");
                LedgerOutcome::rejected(self.balance(account_id).await, err.to_string())
            }
        }
    }

    /// Credit `amount` under a purchase/refund/bonus kind, appending one row.
    pub async fn credit(
        &self,
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        description: &str,
        metadata: JsonValue,
    ) -> LedgerOutcome {
        if amount <= 0 {
            return LedgerOutcome::rejected(
                self.balance(account_id).await,
                "Amount must be positive",
            );
        }
        if !kind.is_credit() {
            return LedgerOutcome::rejected(
                self.balance(account_id).await,
                "Deductions must go through debit",
            );
        }

        match self
            .store
            .apply_credit(account_id, amount, kind, description, metadata)
            .await
        {
            Ok(new_balance) => {
                debug!(%account_id, amount, %kind, new_balance, "credit applied");
                LedgerOutcome::ok(new_balance)
            }
            Err(err) => {
                error!(%account_id, amount, %kind, error = %err, "credit failed");
                LedgerOutcome::rejected(self.balance(account_id).await, err.to_string())
            }
        }
    }

    /// Price an analysis without touching the ledger.
    pub fn estimate_cost(&self, metrics: &RepoMetrics) -> i64 {
        calculator::cost(metrics)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
