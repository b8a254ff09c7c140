//! Billing module (credit costing, accounts, transaction audit trail).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod calculator;
pub mod outcome;
pub mod transaction;

pub use account::Account;
pub use calculator::{cost, RepoMetrics};
pub use outcome::LedgerOutcome;
pub use transaction::{Transaction, TransactionKind};
