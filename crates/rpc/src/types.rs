use hashmark_engine::{BetReceipt, CloseReceipt, EngineError, OrderReceipt, SeedOrder};
use hashmark_state::{
    FillRecord, InsuranceFund, LiquidationEvent, MarginAccount, Market, Order, Position,
};
use hashmark_types::{
    AccountId, LiquidationTier, LiquidityRegime, MarginMode, MarketStatus, OrderSide, OrderStatus,
    PositionSide, PositionStatus, Tinybars, to_hbar, to_tinybars,
};
use serde::{Deserialize, Serialize};

/// Parse a decimal HBAR amount arriving over the wire into tinybars.
pub fn hbar_amount(value: f64) -> Result<Tinybars, EngineError> {
    to_tinybars(value).map_err(|e| EngineError::validation(e.to_string()))
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SeedOrderRequest {
    pub outcome: u16,
    pub side: OrderSide,
    pub price_cents: u8,
    pub quantity_hbar: f64,
}

impl SeedOrderRequest {
    pub fn into_seed(self) -> Result<SeedOrder, EngineError> {
        Ok(SeedOrder {
            outcome: self.outcome,
            side: self.side,
            price_cents: self.price_cents,
            quantity: hbar_amount(self.quantity_hbar)?,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateMarketRequest {
    pub question: String,
    pub creator: String,
    pub close_at_ms: i64,
    pub outcomes: Vec<String>,
    pub regime: LiquidityRegime,
    pub initial_funding_hbar: f64,
    #[serde(default)]
    pub initial_odds: Option<Vec<f64>>,
    #[serde(default)]
    pub seed_orders: Vec<SeedOrderRequest>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: MarketStatus,
    #[serde(default)]
    pub outcome: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub account_id: String,
    pub outcome: u16,
    pub max_cost_hbar: f64,
    pub max_price_percent: u8,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub account_id: String,
    pub outcome: u16,
    pub side: OrderSide,
    pub price_cents: u8,
    pub quantity_hbar: f64,
}

#[derive(Debug, Deserialize)]
pub struct OpenPositionRequest {
    pub account_id: String,
    pub market_id: String,
    pub outcome: u16,
    pub side: PositionSide,
    pub size_hbar: f64,
    pub leverage: u32,
    pub margin_mode: MarginMode,
}

#[derive(Debug, Deserialize)]
pub struct ClosePositionRequest {
    pub account_id: String,
    /// Defaults to a full close
    #[serde(default = "full_close")]
    pub fraction: f64,
}

fn full_close() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount_hbar: f64,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account_id: String,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Deserialize)]
pub struct DepthQuery {
    pub outcome: u16,
    #[serde(default = "default_depth")]
    pub levels: usize,
}

fn default_depth() -> usize {
    10
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct MarketView {
    pub id: String,
    pub question: String,
    pub creator: String,
    pub status: MarketStatus,
    pub outcomes: Vec<String>,
    pub regime: LiquidityRegime,
    pub close_at_ms: i64,
    pub initial_funding_hbar: f64,
    pub escrow_hbar: f64,
    pub resolved_outcome: Option<u16>,
    pub created_at_ms: i64,
}

impl From<Market> for MarketView {
    fn from(market: Market) -> Self {
        Self {
            id: market.id.to_string(),
            question: market.question,
            creator: market.creator.to_string(),
            status: market.status,
            outcomes: market.outcomes,
            regime: market.regime,
            close_at_ms: market.close_at_ms,
            initial_funding_hbar: to_hbar(market.initial_funding),
            escrow_hbar: to_hbar(market.escrow),
            resolved_outcome: market.resolved_outcome,
            created_at_ms: market.created_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BetView {
    pub market_id: String,
    pub outcome: u16,
    pub shares: f64,
    pub cost_hbar: f64,
    pub effective_price: f64,
    pub post_trade_price: f64,
}

impl From<BetReceipt> for BetView {
    fn from(receipt: BetReceipt) -> Self {
        Self {
            market_id: receipt.market_id.to_string(),
            outcome: receipt.outcome,
            shares: receipt.shares,
            cost_hbar: to_hbar(receipt.cost),
            effective_price: receipt.effective_price,
            post_trade_price: receipt.post_trade_price,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FillView {
    pub price_cents: u8,
    pub quantity_hbar: f64,
    pub bid_order_id: String,
    pub ask_order_id: String,
    pub at_ms: i64,
}

impl From<FillRecord> for FillView {
    fn from(fill: FillRecord) -> Self {
        Self {
            price_cents: fill.price_cents,
            quantity_hbar: to_hbar(fill.quantity),
            bid_order_id: fill.bid_order_id.to_string(),
            ask_order_id: fill.ask_order_id.to_string(),
            at_ms: fill.at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: String,
    pub market_id: String,
    pub outcome: u16,
    pub account_id: String,
    pub side: OrderSide,
    pub price_cents: u8,
    pub quantity_hbar: f64,
    pub filled_hbar: f64,
    pub status: OrderStatus,
    pub created_at_ms: i64,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            market_id: order.market_id.to_string(),
            outcome: order.outcome,
            account_id: order.account.to_string(),
            side: order.side,
            price_cents: order.price_cents,
            quantity_hbar: to_hbar(order.quantity),
            filled_hbar: to_hbar(order.filled_quantity),
            status: order.status,
            created_at_ms: order.created_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderSubmitView {
    pub order: OrderView,
    pub fills: Vec<FillView>,
}

impl From<OrderReceipt> for OrderSubmitView {
    fn from(receipt: OrderReceipt) -> Self {
        Self {
            order: receipt.order.into(),
            fills: receipt.fills.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PositionView {
    pub id: String,
    pub market_id: String,
    pub outcome: u16,
    pub account_id: String,
    pub side: PositionSide,
    pub size_hbar: f64,
    pub leverage: u32,
    pub entry_price: f64,
    pub mark_price: f64,
    pub margin_hbar: f64,
    pub margin_mode: MarginMode,
    pub unrealized_pnl_hbar: f64,
    pub realized_pnl_hbar: f64,
    pub cumulative_funding_paid_hbar: f64,
    pub status: PositionStatus,
    pub opened_at_ms: i64,
    pub closed_at_ms: Option<i64>,
}

impl From<Position> for PositionView {
    fn from(position: Position) -> Self {
        Self {
            id: position.id.to_string(),
            market_id: position.market_id.to_string(),
            outcome: position.outcome,
            account_id: position.account.to_string(),
            side: position.side,
            size_hbar: to_hbar(position.size),
            leverage: position.leverage,
            entry_price: position.entry_price,
            mark_price: position.mark_price,
            margin_hbar: to_hbar(position.margin),
            margin_mode: position.margin_mode,
            unrealized_pnl_hbar: to_hbar(position.unrealized_pnl),
            realized_pnl_hbar: to_hbar(position.realized_pnl),
            cumulative_funding_paid_hbar: to_hbar(position.cumulative_funding_paid),
            status: position.status,
            opened_at_ms: position.opened_at_ms,
            closed_at_ms: position.closed_at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CloseView {
    pub position: PositionView,
    pub realized_pnl_hbar: f64,
    pub margin_released_hbar: f64,
}

impl From<CloseReceipt> for CloseView {
    fn from(receipt: CloseReceipt) -> Self {
        Self {
            position: receipt.position.into(),
            realized_pnl_hbar: to_hbar(receipt.realized_pnl),
            margin_released_hbar: to_hbar(receipt.margin_released),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub account_id: String,
    pub balance_hbar: f64,
    pub locked_hbar: f64,
    pub effective_equity_hbar: f64,
}

impl AccountView {
    pub fn new(account: &AccountId, margin: MarginAccount, equity: Tinybars) -> Self {
        Self {
            account_id: account.to_string(),
            balance_hbar: to_hbar(margin.balance),
            locked_hbar: to_hbar(margin.locked),
            effective_equity_hbar: to_hbar(equity),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LiquidationView {
    pub id: String,
    pub position_id: String,
    pub tier: LiquidationTier,
    pub size_closed_hbar: f64,
    pub loss_hbar: f64,
    pub insurance_fund_delta_hbar: f64,
    pub at_ms: i64,
}

impl From<LiquidationEvent> for LiquidationView {
    fn from(event: LiquidationEvent) -> Self {
        Self {
            id: event.id.to_string(),
            position_id: event.position_id.to_string(),
            tier: event.tier,
            size_closed_hbar: to_hbar(event.size_closed),
            loss_hbar: to_hbar(event.loss),
            insurance_fund_delta_hbar: to_hbar(event.insurance_fund_delta),
            at_ms: event.at_ms,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InsuranceView {
    pub balance_hbar: f64,
    pub total_deposits_hbar: f64,
    pub total_payouts_hbar: f64,
}

impl From<InsuranceFund> for InsuranceView {
    fn from(fund: InsuranceFund) -> Self {
        Self {
            balance_hbar: to_hbar(fund.balance),
            total_deposits_hbar: to_hbar(fund.total_deposits),
            total_payouts_hbar: to_hbar(fund.total_payouts),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DepthView {
    pub bids: Vec<DepthLevelView>,
    pub asks: Vec<DepthLevelView>,
}

#[derive(Debug, Serialize)]
pub struct DepthLevelView {
    pub price_cents: u8,
    pub quantity_hbar: f64,
}
