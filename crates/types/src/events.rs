use crate::{
    AccountId, EventId, LiquidationId, LiquidationTier, MarketId, MarkSource, OrderId, OrderSide,
    PositionId, PositionSide, Tinybars,
};
use serde::{Deserialize, Serialize};

/// Envelope published on the in-process event bus and mirrored to the
/// ledger-effect outbox.
///
/// The `id` doubles as the idempotency key at the ledger port: a retried
/// submission with the same id must be a no-op on the receiving side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: EventId,
    /// Milliseconds since the Unix epoch
    pub at_ms: i64,
    #[serde(flatten)]
    pub event: Event,
}

impl DomainEvent {
    pub fn new(at_ms: i64, event: Event) -> Self {
        Self {
            id: EventId::generate(),
            at_ms,
            event,
        }
    }

    pub fn topic(&self) -> &'static str {
        self.event.topic()
    }
}

/// All events the engine publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Market lifecycle
    MarketCreated {
        market_id: MarketId,
        question: String,
    },
    MarketTransitioned {
        market_id: MarketId,
        from: crate::MarketStatus,
        to: crate::MarketStatus,
    },

    // Matching
    OrderPlaced {
        order_id: OrderId,
        market_id: MarketId,
        outcome: u16,
        account: AccountId,
        side: OrderSide,
        price_cents: u8,
        quantity: Tinybars,
    },
    OrderCancelled {
        order_id: OrderId,
        market_id: MarketId,
        account: AccountId,
        remaining: Tinybars,
    },
    FillRecorded {
        market_id: MarketId,
        outcome: u16,
        bid_order_id: OrderId,
        ask_order_id: OrderId,
        price_cents: u8,
        quantity: Tinybars,
    },
    BetPlaced {
        market_id: MarketId,
        outcome: u16,
        account: AccountId,
        shares: f64,
        cost: Tinybars,
    },

    // Pricing
    MarkUpdated {
        market_id: MarketId,
        outcome: u16,
        price: f64,
        source: MarkSource,
        sequence: u64,
    },

    // Margin & positions
    BalanceChanged {
        account: AccountId,
        delta: Tinybars,
        balance: Tinybars,
        reason: BalanceChangeReason,
    },
    PositionOpened {
        position_id: PositionId,
        market_id: MarketId,
        outcome: u16,
        account: AccountId,
        side: PositionSide,
        size: Tinybars,
        leverage: u32,
        entry_price: f64,
        margin: Tinybars,
    },
    PositionClosed {
        position_id: PositionId,
        account: AccountId,
        fraction: f64,
        realized_pnl: Tinybars,
    },
    PositionLiquidated {
        liquidation_id: LiquidationId,
        position_id: PositionId,
        tier: LiquidationTier,
        size_closed: Tinybars,
        loss: Tinybars,
        insurance_fund_delta: Tinybars,
    },

    // Funding
    FundingSettled {
        market_id: MarketId,
        outcome: u16,
        rate: f64,
        index: f64,
    },
    FundingError {
        market_id: MarketId,
        outcome: u16,
        detail: String,
    },

    // Stress & reconciliation
    SocializedLossShortfall {
        market_id: MarketId,
        outcome: u16,
        remaining: Tinybars,
    },
    LedgerError {
        event_id: EventId,
        detail: String,
    },
    InsuranceFundUpdated {
        old_balance: Tinybars,
        new_balance: Tinybars,
    },
}

/// Reason attached to every margin-ledger balance change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceChangeReason {
    Deposit,
    Withdraw,
    BetCost,
    OrderEscrow,
    EscrowRefund,
    PnlSettlement,
    FundingPayment,
    FundingReceipt,
    Liquidation,
    Deleverage,
}

impl Event {
    /// Bus topic this event is published under.
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::MarketCreated { .. } => "market.created",
            Self::MarketTransitioned { .. } => "market.transitioned",
            Self::OrderPlaced { .. } => "order.placed",
            Self::OrderCancelled { .. } => "order.cancelled",
            Self::FillRecorded { .. } => "fill.recorded",
            Self::BetPlaced { .. } => "bet.placed",
            Self::MarkUpdated { .. } => "mark.updated",
            Self::BalanceChanged { .. } => "balance.changed",
            Self::PositionOpened { .. } => "position.opened",
            Self::PositionClosed { .. } => "position.closed",
            Self::PositionLiquidated { .. } => "position.liquidated",
            Self::FundingSettled { .. } => "funding.settled",
            Self::FundingError { .. } => "funding_error",
            Self::SocializedLossShortfall { .. } => "socialized_loss_shortfall",
            Self::LedgerError { .. } => "ledger_error",
            Self::InsuranceFundUpdated { .. } => "insurance.updated",
        }
    }

    pub const fn is_market_event(&self) -> bool {
        matches!(
            self,
            Self::MarketCreated { .. } | Self::MarketTransitioned { .. }
        )
    }

    pub const fn is_trade_event(&self) -> bool {
        matches!(
            self,
            Self::OrderPlaced { .. }
                | Self::OrderCancelled { .. }
                | Self::FillRecorded { .. }
                | Self::BetPlaced { .. }
        )
    }

    pub const fn is_position_event(&self) -> bool {
        matches!(
            self,
            Self::PositionOpened { .. }
                | Self::PositionClosed { .. }
                | Self::PositionLiquidated { .. }
        )
    }

    pub const fn is_error_event(&self) -> bool {
        matches!(
            self,
            Self::FundingError { .. }
                | Self::SocializedLossShortfall { .. }
                | Self::LedgerError { .. }
        )
    }
}
