use thiserror::Error;

/// Engine errors, one variant per kind in the error taxonomy.
///
/// `code()` is the stable machine-readable tag the transport layer maps
/// to HTTP status codes.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed input; reported, never retried
    #[error("{0}")]
    Validation(String),

    /// Operation inconsistent with current lifecycle status
    #[error("{0}")]
    StateConflict(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("insufficient margin")]
    InsufficientMargin,

    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// Slippage guard triggered
    #[error("post-trade price {price:.4} exceeds limit {limit:.4}")]
    PriceExceeded { price: f64, limit: f64 },

    /// Deadline elapsed before the market section could be acquired
    #[error("operation timed out")]
    Timeout,

    /// Invariant violation; the affected market is quarantined
    #[error("internal error: {0}")]
    Internal(String),

    #[error("state error: {0}")]
    State(#[from] hashmark_state::StateError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::StateConflict(msg.into())
    }

    /// Stable error code for the transport mapping table.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::StateConflict(_) => "STATE_CONFLICT",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::InsufficientMargin => "INSUFFICIENT_MARGIN",
            Self::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            Self::NotFound(_) => "NOT_FOUND",
            Self::PriceExceeded { .. } => "PRICE_EXCEEDED",
            Self::Timeout => "TIMEOUT",
            Self::Internal(_) | Self::State(_) => "INTERNAL",
        }
    }
}
