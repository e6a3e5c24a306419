use hashmark_types::{
    AccountId, LiquidationId, LiquidationTier, LiquidityRegime, MarginMode, MarketId,
    MarketStatus, MarkSource, OrderId, OrderSide, OrderStatus, PositionId, PositionSide,
    PositionStatus, Tinybars,
};
use serde::{Deserialize, Serialize};

/// Prediction market record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    /// The question being predicted
    pub question: String,
    pub creator: AccountId,
    /// Ledger account holding trade collateral for this market
    pub escrow_account: AccountId,
    /// Trading stops at this time
    pub close_at_ms: i64,
    pub status: MarketStatus,
    /// Ordered outcome labels; at least two
    pub outcomes: Vec<String>,
    pub regime: LiquidityRegime,
    /// Present only for LOW_LIQUIDITY markets
    pub curve: Option<CurveState>,
    /// Creator's funding, escrowed at creation
    pub initial_funding: Tinybars,
    /// Collateral currently escrowed by this market, funding included
    pub escrow: Tinybars,
    /// Creation-time odds per outcome; the mark of last resort
    pub initial_odds: Vec<f64>,
    pub resolved_outcome: Option<u16>,
    /// Outcome claimed by the resolver when a dispute was opened
    pub self_attested_outcome: Option<u16>,
    /// End of the challenge window while DISPUTED
    pub dispute_deadline_ms: Option<i64>,
    pub created_at_ms: i64,
}

impl Market {
    pub fn outcome_count(&self) -> u16 {
        self.outcomes.len() as u16
    }

    pub fn has_outcome(&self, outcome: u16) -> bool {
        (outcome as usize) < self.outcomes.len()
    }

    pub fn is_trading(&self) -> bool {
        self.status == MarketStatus::Open
    }
}

/// LMSR curve state for a LOW_LIQUIDITY market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveState {
    /// Liquidity parameter; strictly positive
    pub b: f64,
    /// Shares held per outcome, indexed like `Market::outcomes`
    pub shares: Vec<f64>,
}

/// Resting or historical order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub market_id: MarketId,
    pub outcome: u16,
    pub account: AccountId,
    pub side: OrderSide,
    /// Number of contracts; each pays 1 HBAR on the chosen outcome
    pub quantity: Tinybars,
    /// Limit price in cents, 1..=99
    pub price_cents: u8,
    pub filled_quantity: Tinybars,
    pub status: OrderStatus,
    pub created_at_ms: i64,
}

impl Order {
    pub fn remaining(&self) -> Tinybars {
        self.quantity - self.filled_quantity
    }

    /// Collateral escrowed while the order rests: bids lock price x qty,
    /// asks lock the payout they may owe, (1 - price) x qty.
    pub fn collateral_per_unit_cents(&self) -> u8 {
        match self.side {
            OrderSide::Bid => self.price_cents,
            OrderSide::Ask => 100 - self.price_cents,
        }
    }
}

/// Append-only fill record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillRecord {
    pub market_id: MarketId,
    pub outcome: u16,
    pub bid_order_id: OrderId,
    pub ask_order_id: OrderId,
    pub bid_account: AccountId,
    pub ask_account: AccountId,
    /// Always the resting order's price
    pub price_cents: u8,
    pub quantity: Tinybars,
    pub at_ms: i64,
}

/// Mark price record per (market, outcome)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkRecord {
    pub price: f64,
    pub source: MarkSource,
    pub at_ms: i64,
    /// Per-market monotone sequence number
    pub sequence: u64,
}

/// Margin ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarginAccount {
    pub balance: Tinybars,
    pub locked: Tinybars,
}

impl MarginAccount {
    pub fn available(&self) -> Tinybars {
        self.balance - self.locked
    }
}

/// Perpetual position record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub market_id: MarketId,
    pub outcome: u16,
    pub account: AccountId,
    pub side: PositionSide,
    /// Notional size in tinybars
    pub size: Tinybars,
    pub leverage: u32,
    pub entry_price: f64,
    pub mark_price: f64,
    pub margin: Tinybars,
    pub margin_mode: MarginMode,
    pub unrealized_pnl: Tinybars,
    pub realized_pnl: Tinybars,
    /// Net funding this position has paid (negative = received)
    pub cumulative_funding_paid: Tinybars,
    pub funding_index_at_open: f64,
    pub status: PositionStatus,
    pub opened_at_ms: i64,
    pub closed_at_ms: Option<i64>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Equity backing this position at the current mark.
    pub fn equity(&self) -> Tinybars {
        self.margin + self.unrealized_pnl
    }
}

/// Cumulative funding index per (market, outcome)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FundingIndex {
    /// Cumulative funding per unit of notional
    pub cumulative: f64,
    pub last_updated_at_ms: i64,
}

/// Shared loss-absorption reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InsuranceFund {
    pub balance: Tinybars,
    pub total_deposits: Tinybars,
    pub total_payouts: Tinybars,
}

/// Append-only liquidation log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub id: LiquidationId,
    pub position_id: PositionId,
    pub tier: LiquidationTier,
    pub size_closed: Tinybars,
    pub loss: Tinybars,
    /// Negative when the fund absorbed part of the loss
    pub insurance_fund_delta: Tinybars,
    pub at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_collateral_sides() {
        let order = Order {
            id: OrderId::generate(),
            market_id: MarketId::generate(),
            outcome: 0,
            account: AccountId::from("0.0.1001"),
            side: OrderSide::Bid,
            quantity: 10 * 100_000_000,
            price_cents: 59,
            filled_quantity: 0,
            status: OrderStatus::Open,
            created_at_ms: 0,
        };
        assert_eq!(order.collateral_per_unit_cents(), 59);

        let ask = Order {
            side: OrderSide::Ask,
            ..order
        };
        assert_eq!(ask.collateral_per_unit_cents(), 41);
    }

    #[test]
    fn test_margin_account_available() {
        let account = MarginAccount {
            balance: 1_000,
            locked: 400,
        };
        assert_eq!(account.available(), 600);
    }
}
