use serde::{Deserialize, Serialize};

/// Order side in the central limit order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Bid,
    Ask,
}

impl OrderSide {
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Bid => Self::Ask,
            Self::Ask => Self::Bid,
        }
    }
}

/// Direction of a perpetual position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }

    /// PnL sign: +1 for longs, -1 for shorts.
    pub const fn direction(&self) -> i8 {
        match self {
            Self::Long => 1,
            Self::Short => -1,
        }
    }
}

/// Market lifecycle status
///
/// Transitions move strictly forward:
/// `Open -> Closed -> (Resolved | Disputed) -> Settled`.
/// `Quarantined` is an operator-action trap door entered only when an
/// invariant check fails inside a liquidation cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketStatus {
    Open,
    Closed,
    Resolved,
    Disputed,
    Settled,
    Quarantined,
}

impl MarketStatus {
    /// Whether `next` is a legal forward transition from `self`.
    pub const fn can_transition_to(&self, next: MarketStatus) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Closed)
                | (Self::Closed, Self::Resolved)
                | (Self::Closed, Self::Disputed)
                | (Self::Disputed, Self::Resolved)
                | (Self::Resolved, Self::Settled)
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled)
    }
}

/// Matching regime for a market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiquidityRegime {
    /// Central limit order book
    HighLiquidity,
    /// LMSR scoring-rule AMM
    LowLiquidity,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Resting and matchable
    Open,
    /// Fully filled
    Filled,
    /// Cancelled by the owner
    Cancelled,
}

/// Perpetual position status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    Closing,
    Closed,
    Liquidated,
}

impl PositionStatus {
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Liquidated)
    }
}

/// Margin mode for a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginMode {
    /// Position carries its own margin; liquidation is contained
    Isolated,
    /// Margin check runs against whole-account equity
    Cross,
}

/// Where a mark price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarkSource {
    LmsrCurve,
    ClobMid,
    ClobLastFill,
    Initial,
}

/// Liquidation cascade tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LiquidationTier {
    /// Market close at mark price
    MarketClose = 1,
    /// Insurance fund backstop
    InsuranceFund = 2,
    /// Auto-deleveraging of opposing winners
    AutoDeleverage = 3,
}
