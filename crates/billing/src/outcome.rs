use serde::Serialize;

/// Result shape of a ledger mutation.
///
/// The ledger boundary never panics or propagates store errors to callers;
/// failures travel in-band and callers must check `success` before trusting
/// the mutation happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerOutcome {
    pub success: bool,
    /// Balance after the mutation, or the best-effort current balance when
    /// the mutation was rejected.
    pub new_balance: i64,
    pub error: Option<String>,
}

impl LedgerOutcome {
    pub fn ok(new_balance: i64) -> Self {
        Self {
            success: true,
            new_balance,
            error: None,
        }
    }

    pub fn rejected(balance: i64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            new_balance: balance,
            error: Some(error.into()),
        }
    }
}
