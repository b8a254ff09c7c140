//! Postgres-backed ledger store.
//!
//! Schema (conceptual):
//!
//! ```sql
//! CREATE TABLE accounts (
//!     id         UUID PRIMARY KEY,
//!     balance    BIGINT NOT NULL DEFAULT 0 CHECK (balance >= 0),
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
//!     updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE transactions (
//!     id          UUID PRIMARY KEY,
//!     account_id  UUID NOT NULL,
//!     kind        TEXT NOT NULL,
//!     amount      BIGINT NOT NULL,
//!     description TEXT NOT NULL,
//!     metadata    JSONB NOT NULL DEFAULT 'null'::jsonb,
//!     created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//! ```
//!
//! ## Concurrency
//!
//! `apply_debit` takes a `SELECT … FOR UPDATE` row lock on the account
//! inside its transaction, so two debits racing on one account serialize and
//! the insufficient-funds check always runs against a committed balance.
//! The `CHECK (balance >= 0)` constraint is a second line of defense at the
//! schema level.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Postgres, Row, Transaction as PgTransaction};
use tracing::instrument;

use repogauge_billing::{Transaction, TransactionKind};
use repogauge_core::{AccountId, TransactionId};

use super::store::{LedgerStore, LedgerStoreError};

/// Postgres-backed account balances + append-only transaction log.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: Arc<PgPool>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> LedgerStoreError {
    LedgerStoreError::Storage(format!("{operation}: {err}"))
}

async fn insert_transaction(
    tx: &mut PgTransaction<'_, Postgres>,
    record: &Transaction,
) -> Result<(), LedgerStoreError> {
    sqlx::query(
        r#"
        INSERT INTO transactions (id, account_id, kind, amount, description, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.account_id.as_uuid())
    .bind(record.kind.as_str())
    .bind(record.amount)
    .bind(&record.description)
    .bind(&record.metadata)
    .bind(record.created_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_transaction", e))?;
    Ok(())
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn balance(&self, account_id: AccountId) -> Result<i64, LedgerStoreError> {
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = $1")
            .bind(account_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("balance", e))?;

        row.map(|r| r.try_get::<i64, _>("balance"))
            .transpose()
            .map(|b| b.unwrap_or(0))
            .map_err(|e| map_sqlx_error("balance", e))
    }

    #[instrument(skip(self, metadata), fields(account_id = %account_id, amount), err)]
    async fn apply_debit(
        &self,
        account_id: AccountId,
        amount: i64,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Row lock: racing debits on this account queue up here.
        let row = sqlx::query("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(account_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_account", e))?;

        let balance = match row {
            Some(row) => row
                .try_get::<i64, _>("balance")
                .map_err(|e| map_sqlx_error("lock_account", e))?,
            None => 0,
        };

        if balance < amount {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(LedgerStoreError::InsufficientCredits { balance });
        }

        let row = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = balance - $2, updated_at = now()
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("debit_account", e))?;

        let new_balance: i64 = row
            .try_get("balance")
            .map_err(|e| map_sqlx_error("debit_account", e))?;

        let record = Transaction::record(
            account_id,
            TransactionKind::Deduction,
            amount,
            description,
            metadata,
        );
        insert_transaction(&mut tx, &record).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(new_balance)
    }

    #[instrument(skip(self, metadata), fields(account_id = %account_id, amount, kind = %kind), err)]
    async fn apply_credit(
        &self,
        account_id: AccountId,
        amount: i64,
        kind: TransactionKind,
        description: &str,
        metadata: JsonValue,
    ) -> Result<i64, LedgerStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO accounts (id, balance)
            VALUES ($1, $2)
            ON CONFLICT (id)
            DO UPDATE SET balance = accounts.balance + EXCLUDED.balance, updated_at = now()
            RETURNING balance
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("credit_account", e))?;

        let new_balance: i64 = row
            .try_get("balance")
            .map_err(|e| map_sqlx_error("credit_account", e))?;

        let record = Transaction::record(account_id, kind, amount, description, metadata);
        insert_transaction(&mut tx, &record).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;
        Ok(new_balance)
    }

    async fn transactions(
        &self,
        account_id: AccountId,
        limit: usize,
    ) -> Result<Vec<Transaction>, LedgerStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, kind, amount, description, metadata, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(limit as i64)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("transactions", e))?;

        let decode = |e: sqlx::Error| map_sqlx_error("transactions", e);
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let kind: String = row.try_get("kind").map_err(decode)?;
            result.push(Transaction {
                id: TransactionId::from_uuid(row.try_get("id").map_err(decode)?),
                account_id: AccountId::from_uuid(row.try_get("account_id").map_err(decode)?),
                kind: kind
                    .parse()
                    .map_err(|e| LedgerStoreError::Storage(format!("transactions: {e}")))?,
                amount: row.try_get("amount").map_err(decode)?,
                description: row.try_get("description").map_err(decode)?,
                metadata: row.try_get("metadata").map_err(decode)?,
                created_at: row.try_get("created_at").map_err(decode)?,
            });
        }
        Ok(result)
    }
}
