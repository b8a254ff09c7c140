//! Ledger storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;

use repogauge_billing::{Account, Transaction, TransactionKind};
use repogauge_core::AccountId;

/// Ledger store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerStoreError {
    /// Debit rejected: balance below the requested amount. Carries the
    /// balance observed inside the aborted transaction.
    #[error("Insufficient credits")]
    InsufficientCredits { balance: i64 },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Account balance + append-only transaction log.
///
/// Implementations must make each mutation atomic: the balance update and its
/// paired [`Transaction`] row commit together or not at all, and concurrent
/// debits against one account must serialize on the current balance (row
/// lock or equivalent). Unknown accounts read as balance 0; a credit to an
/// unknown account creates it.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Current balance; 0 for an unknown account.
    async fn balance(&self, account_id: AccountId) -> Result<i64, LedgerStoreError>;

    /// Atomically subtract `amount` and append the paired deduction row.
    /// Returns the new balance.
    async fn apply_debit(
        &self,
        account_id: AccountId,
        amount: i64,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError>;

    /// Atomically add `amount` under the given kind and append the paired
    /// row. Returns the new balance.
    async fn apply_credit(
        &self,
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError>;

    /// Audit read: the account's transactions, newest first.
    async fn transactions(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerStoreError>;
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, Account>,
    log: Vec<Transaction>,
}

/// In-memory ledger store for tests/dev.
///
/// A single mutex over balances and log is the in-memory stand-in for
/// per-account row locking: debits serialize on it, so the insufficient-funds
/// check and the decrement are one atomic step.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: Mutex<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn balance(&self, account_id: AccountId) -> Result<i64, LedgerStoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.accounts.get(&account_id).map_or(0, |a| a.balance))
    }

    async fn apply_debit(
        &self,
        account_id: AccountId,
        amount: i64,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError> {
        let mut state = self.state.lock().unwrap();
        let balance = state.accounts.get(&account_id).map_or(0, |a| a.balance);
        if balance < amount {
            return Err(LedgerStoreError::InsufficientCredits { balance });
        }

        let account = state
            .accounts
            .entry(account_id)
            .or_insert_with(|| Account::new(account_id));
        account.balance -= amount;
        account.updated_at = Utc::now();
        let new_balance = account.balance;

        state.log.push(Transaction::record(
            account_id,
            TransactionKind::Deduction,
            amount,
            description,
            metadata,
        ));
        Ok(new_balance)
    }

    async fn apply_credit(
        &self,
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError> {
        let mut state = self.state.lock().unwrap();

        let account = state
            .accounts
            .entry(account_id)
            .or_insert_with(|| Account::new(account_id));
        account.balance += amount;
        account.updated_at = Utc::now();
        let new_balance = account.balance;

        state
            .log
            .push(Transaction::record(account_id, kind, amount, description, metadata));
        Ok(new_balance)
    }

    async fn transactions(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerStoreError> {
        let state = self.state.lock().unwrap();
        let mut result: Vec<_> = state
            .log
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        result.reverse();
        result.truncate(limit);
        Ok(result)
    }
}

#[async_trait]
impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    async fn balance(&self, account_id: AccountId) -> Result<i64, LedgerStoreError> {
        (**self).balance(account_id).await
    }

    async fn apply_debit(
        &self,
        account_id: AccountId,
        amount: i64,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError> {
        (**self).apply_debit(account_id, amount, description, metadata).await
    }

    async fn apply_credit(
        &self,
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError> {
        (**self)
            .apply_credit(account_id, amount, kind, description, metadata)
            .await
    }

    async fn transactions(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerStoreError> {
        (**self).transactions(account_id, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_accounts_read_as_zero() {
        let store = InMemoryLedgerStore::new();
        assert_eq!(store.balance(AccountId::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn credit_creates_the_account() {
        let store = InMemoryLedgerStore::new();
        let account_id = AccountId::new();

        let balance = store
            .apply_credit(
                account_id,
                100,
                TransactionKind::Purchase,
                "top-up",
                JsonValue::Null,
            )
            .await
            .unwrap();

        assert_eq!(balance, 100);
        assert_eq!(store.balance(account_id).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn debit_below_balance_is_rejected_atomically() {
        let store = InMemoryLedgerStore::new();
        let account_id = AccountId::new();
        store
            .apply_credit(account_id, 10, TransactionKind::Purchase, "top-up", JsonValue::Null)
            .await
            .unwrap();

        let err = store
            .apply_debit(account_id, 11, "analysis", JsonValue::Null)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerStoreError::InsufficientCredits { balance: 10 }
        ));

        // Nothing moved, nothing logged.
        assert_eq!(store.balance(account_id).await.unwrap(), 10);
        assert_eq!(store.transactions(account_id, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn every_mutation_appends_exactly_one_row() {
        let store = InMemoryLedgerStore::new();
        let account_id = AccountId::new();

        store
            .apply_credit(account_id, 50, TransactionKind::Purchase, "top-up", JsonValue::Null)
            .await
            .unwrap();
        store
            .apply_debit(account_id, 20, "analysis", JsonValue::Null)
            .await
            .unwrap();

        let log = store.transactions(account_id, 10).await.unwrap();
        assert_eq!(log.len(), 2);
        // Newest first.
        assert_eq!(log[0].amount, -20);
        assert_eq!(log[1].amount, 50);
    }

    #[tokio::test]
    async fn concurrent_debits_never_overdraw() {
        let store = InMemoryLedgerStore::arc();
        let account_id = AccountId::new();
        store
            .apply_credit(account_id, 100, TransactionKind::Purchase, "top-up", JsonValue::Null)
            .await
            .unwrap();

        // 10 tasks racing to debit 30 each: at most 3 can win.
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .apply_debit(account_id, 30, "analysis", JsonValue::Null)
                    .await
                    .is_ok()
            }));
        }

        let mut wins = 0;
        for handle in handles {
            if handle.await.unwrap() {
                wins += 1;
            }
        }

        assert_eq!(wins, 3);
        let balance = store.balance(account_id).await.unwrap();
        assert_eq!(balance, 10);
        assert!(balance >= 0);
    }
}
