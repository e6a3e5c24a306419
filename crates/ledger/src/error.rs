use thiserror::Error;

/// Ledger port errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Value transfer would overdraw the source account
    #[error("insufficient funds on ledger")]
    InsufficientFunds,

    /// Transient transport failure; safe to retry
    #[error("ledger network error: {0}")]
    NetworkError(String),
}

impl LedgerError {
    /// Only network failures are retried by the outbox.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }
}
