mod bus;
pub mod constants;
mod error;
mod funding;
mod insurance;
mod liquidation;
pub mod lmsr;
mod margin;
mod mark_price;
mod orderbook;
mod position;
mod registry;

pub use bus::*;
pub use error::*;
pub use funding::{FundingBook, funding_rate};
pub use insurance::*;
pub use liquidation::{LiquidationEngine, is_underwater, maintenance_margin};
pub use margin::*;
pub use mark_price::*;
pub use orderbook::*;
pub use position::{PositionBook, pending_funding, refresh, unrealized_pnl};
pub use registry::*;

use constants::{
    DEFAULT_DISPUTE_WINDOW_MS, DEFAULT_FUNDING_INTERVAL_MS, DEFAULT_MAX_LEVERAGE,
    MAX_CASCADE_PASSES, PRICE_SUM_TOLERANCE,
};
use hashmark_ledger::{DispatchOutcome, Effect, LedgerPort, Outbox};
use hashmark_state::{
    CoordinationDomain, DerivativesDomain, EngineSnapshot, FillRecord, FundingEntry,
    InsuranceDomain, InsuranceFund, LiquidationEvent, MarginAccount, MarginEntry, Market,
    MarkEntry, MarkRecord, MarketsDomain, Order, Position, SNAPSHOT_VERSION, SequenceEntry,
};
use hashmark_types::{
    AccountId, BalanceChangeReason, Clock, DomainEvent, Event, EventId, LiquidityRegime,
    MarginMode, MarketId, MarketStatus, OrderId, OrderSide, OrderStatus, PositionId, PositionSide,
    PositionStatus, Tinybars, round_price, scale, to_hbar,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Engine-wide configuration, sourced from the environment by the app.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_leverage: u32,
    pub funding_interval_ms: i64,
    pub dispute_window_ms: i64,
    /// Whether one account may match its own resting orders. Defaults on
    /// so market makers can quote both sides.
    pub allow_self_cross: bool,
    /// Consensus topic that mirrors domain events
    pub event_topic_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_leverage: DEFAULT_MAX_LEVERAGE,
            funding_interval_ms: DEFAULT_FUNDING_INTERVAL_MS,
            dispute_window_ms: DEFAULT_DISPUTE_WINDOW_MS,
            allow_self_cross: true,
            event_topic_id: "0.0.5005".to_string(),
        }
    }
}

/// Seed order placed by the creator at market creation. HIGH_LIQUIDITY
/// markets must seed at least one of each side.
#[derive(Debug, Clone)]
pub struct SeedOrder {
    pub outcome: u16,
    pub side: OrderSide,
    pub price_cents: u8,
    pub quantity: Tinybars,
}

/// Result of an LMSR buy.
#[derive(Debug, Clone)]
pub struct BetReceipt {
    pub market_id: MarketId,
    pub outcome: u16,
    pub account: AccountId,
    pub shares: f64,
    pub cost: Tinybars,
    pub effective_price: f64,
    pub post_trade_price: f64,
}

/// Result of an order submission.
#[derive(Debug, Clone)]
pub struct OrderReceipt {
    pub order: Order,
    pub fills: Vec<FillRecord>,
}

/// Result of a position close.
#[derive(Debug, Clone)]
pub struct CloseReceipt {
    pub position: Position,
    pub realized_pnl: Tinybars,
    pub margin_released: Tinybars,
}

/// The trading and risk engine.
///
/// Logically single-writer: the composition root serializes mutating
/// calls, so a method owns every subsystem for its whole critical
/// section. Ledger effects are recorded in the outbox inside the section
/// and dispatched outside it via [`Engine::dispatch_outbox`].
pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    registry: MarketRegistry,
    books: OrderBookManager,
    fills: Vec<FillRecord>,
    oracle: MarkOracle,
    margin: MarginLedger,
    positions: PositionBook,
    funding: FundingBook,
    insurance: InsuranceFundManager,
    liquidation: LiquidationEngine,
    bus: EventBus,
    outbox: Outbox,
}

/// quantity x cents / 100, the tinybar value of a cent-priced contract
/// leg. Both sides of every movement use this same helper so rounding
/// can never break conservation.
fn cents_value(quantity: Tinybars, cents: u8) -> Tinybars {
    quantity * cents as i128 / 100
}

impl Engine {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let dispute_window_ms = config.dispute_window_ms;
        Self {
            config,
            clock,
            registry: MarketRegistry::new(dispute_window_ms),
            books: OrderBookManager::new(),
            fills: Vec::new(),
            oracle: MarkOracle::new(),
            margin: MarginLedger::new(),
            positions: PositionBook::new(),
            funding: FundingBook::new(),
            insurance: InsuranceFundManager::new(),
            liquidation: LiquidationEngine::new(),
            bus: EventBus::new(),
            outbox: Outbox::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Subscribe to engine events; see the topic constants on `Event`.
    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    // ========================================================================
    // Market registry (lifecycle)
    // ========================================================================

    pub fn create_market(
        &mut self,
        input: CreateMarketInput,
        seeds: Vec<SeedOrder>,
    ) -> Result<Market, EngineError> {
        let now = self.clock.now_ms();
        let market = self.registry.build(&input, now)?;

        match market.regime {
            LiquidityRegime::HighLiquidity => {
                let has_bid = seeds.iter().any(|s| s.side == OrderSide::Bid);
                let has_ask = seeds.iter().any(|s| s.side == OrderSide::Ask);
                if !has_bid || !has_ask {
                    return Err(EngineError::validation(
                        "a liquid market needs at least one bid-side and one ask-side seed order",
                    ));
                }
            }
            LiquidityRegime::LowLiquidity => {
                if !seeds.is_empty() {
                    return Err(EngineError::validation(
                        "seed orders only apply to order-book markets",
                    ));
                }
            }
        }

        let mut seed_collateral: Tinybars = 0;
        for seed in &seeds {
            if !market.has_outcome(seed.outcome) {
                return Err(EngineError::validation("seed order names an unknown outcome"));
            }
            if !(1..=99).contains(&seed.price_cents) {
                return Err(EngineError::validation(
                    "price must be an integer in [1, 99] cents",
                ));
            }
            if seed.quantity <= 0 {
                return Err(EngineError::validation("seed quantity must be positive"));
            }
            let collateral_cents = match seed.side {
                OrderSide::Bid => seed.price_cents,
                OrderSide::Ask => 100 - seed.price_cents,
            };
            seed_collateral += cents_value(seed.quantity, collateral_cents);
        }

        // The whole creation either funds or fails before any effect
        if self.margin.get(&input.creator).available() < market.initial_funding + seed_collateral {
            return Err(EngineError::InsufficientFunds);
        }

        self.margin.withdraw(&input.creator, market.initial_funding)?;
        let market_id = market.id;
        let escrow_account = market.escrow_account.clone();
        let outcome_count = market.outcome_count();
        self.registry.insert(market);

        self.record_transfer(&input.creator, &escrow_account, input.initial_funding);
        self.emit(Event::MarketCreated {
            market_id,
            question: input.question.clone(),
        });

        for outcome in 0..outcome_count {
            self.touch_mark(market_id, outcome)?;
        }

        for seed in seeds {
            self.submit_order(
                market_id,
                seed.outcome,
                input.creator.clone(),
                seed.side,
                seed.price_cents,
                seed.quantity,
            )?;
        }

        Ok(self.registry.get(market_id)?.clone())
    }

    pub fn get_market(&self, id: MarketId) -> Result<Market, EngineError> {
        Ok(self.registry.get(id)?.clone())
    }

    pub fn list_markets(&self, filter: &MarketFilter) -> Vec<Market> {
        self.registry.list(filter).into_iter().cloned().collect()
    }

    pub fn transition_market(
        &mut self,
        id: MarketId,
        to: MarketStatus,
        outcome: Option<u16>,
    ) -> Result<Market, EngineError> {
        let now = self.clock.now_ms();
        let (from, to) = self.registry.transition(id, to, outcome, now)?;
        self.emit(Event::MarketTransitioned {
            market_id: id,
            from,
            to,
        });
        Ok(self.registry.get(id)?.clone())
    }

    /// Auto-advance disputes whose challenge window has lapsed.
    pub fn expire_disputes(&mut self) {
        let now = self.clock.now_ms();
        for market_id in self.registry.expire_disputes(now) {
            self.emit(Event::MarketTransitioned {
                market_id,
                from: MarketStatus::Disputed,
                to: MarketStatus::Resolved,
            });
        }
    }

    // ========================================================================
    // LMSR engine
    // ========================================================================

    /// Cost of buying `delta_shares` without trading.
    pub fn quote(
        &self,
        market_id: MarketId,
        outcome: u16,
        delta_shares: f64,
    ) -> Result<f64, EngineError> {
        let market = self.registry.get(market_id)?;
        if !market.has_outcome(outcome) {
            return Err(EngineError::validation("unknown outcome"));
        }
        let curve = market
            .curve
            .as_ref()
            .ok_or_else(|| EngineError::conflict("market does not use curve pricing"))?;
        lmsr::quote_cost(curve, outcome, delta_shares)
    }

    /// Spend up to `max_cost` buying outcome shares on the curve.
    pub fn buy_shares(
        &mut self,
        market_id: MarketId,
        outcome: u16,
        account: AccountId,
        max_cost: Tinybars,
        max_price_percent: u8,
    ) -> Result<BetReceipt, EngineError> {
        let market = self.registry.get(market_id)?.clone();
        if !market.is_trading() {
            return Err(EngineError::conflict("market is not open for trading"));
        }
        let Some(curve) = market.curve.clone() else {
            return Err(EngineError::conflict("market does not use curve pricing"));
        };
        if !market.has_outcome(outcome) {
            return Err(EngineError::validation("unknown outcome"));
        }
        if max_cost <= 0 {
            return Err(EngineError::validation("bet cost must be positive"));
        }
        if !(1..=100).contains(&max_price_percent) {
            return Err(EngineError::validation("max price percent must be in [1, 100]"));
        }

        let stake = to_hbar(max_cost);
        let shares = lmsr::shares_for_stake(&curve, outcome, stake)?;

        let mut next = curve;
        next.shares[outcome as usize] += shares;
        let post_prices = lmsr::prices(&next);
        let post_price = post_prices[outcome as usize];
        let limit = max_price_percent as f64 / 100.0;
        if post_price > limit {
            return Err(EngineError::PriceExceeded {
                price: post_price,
                limit,
            });
        }
        let price_sum: f64 = post_prices.iter().sum();
        if (price_sum - 1.0).abs() > PRICE_SUM_TOLERANCE {
            return Err(EngineError::Internal(format!(
                "curve prices sum to {price_sum} after trade"
            )));
        }

        if self.margin.get(&account).available() < max_cost {
            return Err(EngineError::InsufficientFunds);
        }

        // Commit
        self.margin.withdraw(&account, max_cost)?;
        {
            let market = self.registry.get_mut(market_id)?;
            market.curve = Some(next);
            market.escrow += max_cost;
        }

        let effective_price = stake / shares;
        self.record_transfer(&account, &market.escrow_account, max_cost);
        self.emit(Event::BetPlaced {
            market_id,
            outcome,
            account: account.clone(),
            shares,
            cost: max_cost,
        });
        self.touch_mark(market_id, outcome)?;

        Ok(BetReceipt {
            market_id,
            outcome,
            account,
            shares,
            cost: max_cost,
            effective_price: round_price(effective_price),
            post_trade_price: round_price(post_price),
        })
    }

    // ========================================================================
    // Order-book engine
    // ========================================================================

    pub fn submit_order(
        &mut self,
        market_id: MarketId,
        outcome: u16,
        account: AccountId,
        side: OrderSide,
        price_cents: u8,
        quantity: Tinybars,
    ) -> Result<OrderReceipt, EngineError> {
        let now = self.clock.now_ms();
        let market = self.registry.get(market_id)?.clone();
        if !market.is_trading() {
            return Err(EngineError::conflict("market is not open for trading"));
        }
        if market.regime != LiquidityRegime::HighLiquidity {
            return Err(EngineError::conflict("market uses curve pricing, place a bet instead"));
        }
        if !market.has_outcome(outcome) {
            return Err(EngineError::validation("unknown outcome"));
        }
        if !(1..=99).contains(&price_cents) {
            return Err(EngineError::validation(
                "price must be an integer in [1, 99] cents",
            ));
        }
        if quantity <= 0 {
            return Err(EngineError::validation("quantity must be positive"));
        }

        let order = Order {
            id: OrderId::generate(),
            market_id,
            outcome,
            account: account.clone(),
            side,
            quantity,
            price_cents,
            filled_quantity: 0,
            status: OrderStatus::Open,
            created_at_ms: now,
        };

        // Escrow the order's worst-case obligation up front
        let collateral = cents_value(quantity, order.collateral_per_unit_cents());
        self.margin.lock(&account, collateral).map_err(|e| match e {
            EngineError::InsufficientMargin => EngineError::InsufficientFunds,
            other => other,
        })?;

        self.emit(Event::OrderPlaced {
            order_id: order.id,
            market_id,
            outcome,
            account: account.clone(),
            side,
            price_cents,
            quantity,
        });

        let matches = self.books.match_incoming(&order, self.config.allow_self_cross);
        let mut fills = Vec::new();
        let mut filled_total: Tinybars = 0;

        for m in &matches {
            filled_total += m.quantity;

            // Taker pays at the resting price, releasing the lien taken
            // at its own limit; the difference stays in its balance.
            let taker_pay_cents = match side {
                OrderSide::Bid => m.price_cents,
                OrderSide::Ask => 100 - m.price_cents,
            };
            let taker_release = cents_value(m.quantity, order.collateral_per_unit_cents());
            let taker_pay = cents_value(m.quantity, taker_pay_cents);
            self.margin.settle_fill(&account, taker_release, taker_pay)?;

            // Maker fills at its own price, so lien and payment coincide
            let maker_cents = match m.maker_side {
                OrderSide::Bid => m.price_cents,
                OrderSide::Ask => 100 - m.price_cents,
            };
            let maker_pay = cents_value(m.quantity, maker_cents);
            self.margin.settle_fill(&m.maker_account, maker_pay, maker_pay)?;

            self.registry.escrow_add(market_id, taker_pay + maker_pay);

            let (bid_order_id, ask_order_id, bid_account, ask_account) = match side {
                OrderSide::Bid => (
                    order.id,
                    m.maker_order_id,
                    account.clone(),
                    m.maker_account.clone(),
                ),
                OrderSide::Ask => (
                    m.maker_order_id,
                    order.id,
                    m.maker_account.clone(),
                    account.clone(),
                ),
            };

            self.record_transfer(
                &bid_account,
                &market.escrow_account,
                cents_value(m.quantity, m.price_cents),
            );
            self.record_transfer(
                &ask_account,
                &market.escrow_account,
                cents_value(m.quantity, 100 - m.price_cents),
            );

            let fill = FillRecord {
                market_id,
                outcome,
                bid_order_id,
                ask_order_id,
                bid_account,
                ask_account,
                price_cents: m.price_cents,
                quantity: m.quantity,
                at_ms: now,
            };
            self.oracle.note_fill(market_id, outcome, m.price_cents);
            self.emit(Event::FillRecorded {
                market_id,
                outcome,
                bid_order_id: fill.bid_order_id,
                ask_order_id: fill.ask_order_id,
                price_cents: fill.price_cents,
                quantity: fill.quantity,
            });
            self.fills.push(fill.clone());
            fills.push(fill);
        }

        let mut order = order;
        order.filled_quantity = filled_total;
        if order.remaining() == 0 {
            order.status = OrderStatus::Filled;
        }
        self.books.insert(order.clone());

        self.touch_mark(market_id, outcome)?;

        Ok(OrderReceipt { order, fills })
    }

    pub fn cancel_order(
        &mut self,
        order_id: OrderId,
        account: &AccountId,
    ) -> Result<Order, EngineError> {
        let order = self
            .books
            .get(order_id)
            .ok_or(EngineError::NotFound("order"))?
            .clone();
        if &order.account != account {
            return Err(EngineError::conflict("order belongs to a different account"));
        }
        if order.status != OrderStatus::Open {
            return Err(EngineError::conflict("order is not open"));
        }

        self.books.remove_resting(order_id);
        let refund = cents_value(order.remaining(), order.collateral_per_unit_cents());
        self.margin.release(account, refund)?;

        let order = {
            let order = self
                .books
                .get_mut(order_id)
                .ok_or(EngineError::NotFound("order"))?;
            order.status = OrderStatus::Cancelled;
            order.clone()
        };

        self.emit(Event::OrderCancelled {
            order_id,
            market_id: order.market_id,
            account: account.clone(),
            remaining: order.remaining(),
        });
        self.touch_mark(order.market_id, order.outcome)?;
        Ok(order)
    }

    pub fn book_depth(&self, market_id: MarketId, outcome: u16, levels: usize) -> BookDepth {
        self.books.depth(market_id, outcome, levels)
    }

    pub fn orders_for_account(&self, account: &AccountId) -> Vec<Order> {
        self.books
            .orders_for_account(account)
            .into_iter()
            .cloned()
            .collect()
    }

    // ========================================================================
    // Mark-price oracle
    // ========================================================================

    pub fn mark(&self, market_id: MarketId, outcome: u16) -> Option<MarkRecord> {
        self.oracle.get(market_id, outcome).cloned()
    }

    /// Recompute the mark for a pair, publish `mark.updated`, refresh the
    /// pair's positions, and run the liquidation trigger.
    fn touch_mark(&mut self, market_id: MarketId, outcome: u16) -> Result<(), EngineError> {
        let now = self.clock.now_ms();
        let market = self.registry.get(market_id)?.clone();
        let record = self.oracle.recompute(&market, &self.books, outcome, now);
        self.emit_local(Event::MarkUpdated {
            market_id,
            outcome,
            price: record.price,
            source: record.source,
            sequence: record.sequence,
        });

        self.refresh_pair(market_id, outcome)?;
        self.sweep_pair(market_id, outcome)
    }

    // ========================================================================
    // Margin ledger
    // ========================================================================

    pub fn deposit(&mut self, account: &AccountId, amount: Tinybars) -> Result<Tinybars, EngineError> {
        let balance = self.margin.deposit(account, amount)?;
        self.emit_local(Event::BalanceChanged {
            account: account.clone(),
            delta: amount,
            balance,
            reason: BalanceChangeReason::Deposit,
        });
        Ok(balance)
    }

    pub fn withdraw(
        &mut self,
        account: &AccountId,
        amount: Tinybars,
    ) -> Result<Tinybars, EngineError> {
        let balance = self.margin.withdraw(account, amount)?;
        self.emit_local(Event::BalanceChanged {
            account: account.clone(),
            delta: -amount,
            balance,
            reason: BalanceChangeReason::Withdraw,
        });
        Ok(balance)
    }

    pub fn margin_account(&self, account: &AccountId) -> MarginAccount {
        self.margin.get(account)
    }

    /// Whole-account equity: balance plus unrealized PnL of open CROSS
    /// positions. Isolated positions stand apart.
    pub fn effective_equity(&self, account: &AccountId) -> Tinybars {
        self.margin.get(account).balance + self.positions.cross_unrealized_pnl(account)
    }

    // ========================================================================
    // Perpetual positions
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    pub fn open_position(
        &mut self,
        account: AccountId,
        market_id: MarketId,
        outcome: u16,
        side: PositionSide,
        size: Tinybars,
        leverage: u32,
        margin_mode: MarginMode,
    ) -> Result<Position, EngineError> {
        let now = self.clock.now_ms();
        let market = self.registry.get(market_id)?.clone();
        if !market.is_trading() {
            return Err(EngineError::conflict("market is not open for trading"));
        }
        if !market.has_outcome(outcome) {
            return Err(EngineError::validation("unknown outcome"));
        }
        if size <= 0 {
            return Err(EngineError::validation("position size must be positive"));
        }
        if leverage < 1 || leverage > self.config.max_leverage {
            return Err(EngineError::validation(format!(
                "leverage must be in [1, {}]",
                self.config.max_leverage
            )));
        }

        let required_margin = size / leverage as i128;
        self.margin.lock(&account, required_margin)?;

        let entry_price = self.oracle.price_or_initial(&market, outcome);
        let position = Position {
            id: PositionId::generate(),
            market_id,
            outcome,
            account: account.clone(),
            side,
            size,
            leverage,
            entry_price,
            mark_price: entry_price,
            margin: required_margin,
            margin_mode,
            unrealized_pnl: 0,
            realized_pnl: 0,
            cumulative_funding_paid: 0,
            funding_index_at_open: self.funding.cumulative(market_id, outcome),
            status: PositionStatus::Open,
            opened_at_ms: now,
            closed_at_ms: None,
        };
        self.positions.insert(position.clone());

        self.emit(Event::PositionOpened {
            position_id: position.id,
            market_id,
            outcome,
            account,
            side,
            size,
            leverage,
            entry_price,
            margin: required_margin,
        });
        Ok(position)
    }

    pub fn close_position(
        &mut self,
        position_id: PositionId,
        account: &AccountId,
        fraction: f64,
    ) -> Result<CloseReceipt, EngineError> {
        let now = self.clock.now_ms();
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(EngineError::validation("close fraction must be in (0, 1]"));
        }

        let snapshot = self.positions.get(position_id)?.clone();
        if &snapshot.account != account {
            return Err(EngineError::conflict("position belongs to a different account"));
        }
        if !snapshot.is_open() {
            return Err(EngineError::conflict("position is not open"));
        }

        // Settle against the freshest mark and funding index
        let market = self.registry.get(snapshot.market_id)?.clone();
        let mark = self.oracle.price_or_initial(&market, snapshot.outcome);
        let index = self.funding.cumulative(snapshot.market_id, snapshot.outcome);
        {
            let position = self.positions.get_mut(position_id)?;
            position::refresh(position, mark, index);
        }
        let snapshot = self.positions.get(position_id)?.clone();

        let full = fraction >= 1.0;
        let size_closed = if full { snapshot.size } else { scale(snapshot.size, fraction) };
        let margin_released = if full {
            snapshot.margin
        } else {
            scale(snapshot.margin, fraction)
        };
        let realized = if full {
            snapshot.unrealized_pnl
        } else {
            scale(snapshot.unrealized_pnl, fraction)
        };

        self.margin.release(account, margin_released)?;
        if realized >= 0 {
            self.margin.credit(account, realized);
            self.registry.escrow_add(snapshot.market_id, -realized);
            self.record_transfer(&market.escrow_account, account, realized);
        } else {
            // Losses debit the balance, clamped at zero; the shortfall is
            // absorbed downstream as a liquidation loss
            let debited = self.margin.debit_available(account, -realized);
            self.registry.escrow_add(snapshot.market_id, debited);
            self.record_transfer(account, &market.escrow_account, debited);
        }

        let position = {
            let position = self.positions.get_mut(position_id)?;
            position.size -= size_closed;
            position.margin -= margin_released;
            position.unrealized_pnl -= realized;
            position.realized_pnl += realized;
            if full {
                position.status = PositionStatus::Closed;
                position.closed_at_ms = Some(now);
            }
            position.clone()
        };

        self.emit(Event::PositionClosed {
            position_id,
            account: account.clone(),
            fraction,
            realized_pnl: realized,
        });

        Ok(CloseReceipt {
            position,
            realized_pnl: realized,
            margin_released,
        })
    }

    pub fn position(&self, id: PositionId) -> Result<Position, EngineError> {
        Ok(self.positions.get(id)?.clone())
    }

    pub fn positions_for_account(&self, account: &AccountId) -> Vec<Position> {
        self.positions
            .for_account(account)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Re-mark every open position on a pair.
    fn refresh_pair(&mut self, market_id: MarketId, outcome: u16) -> Result<(), EngineError> {
        let market = self.registry.get(market_id)?.clone();
        let mark = self.oracle.price_or_initial(&market, outcome);
        let index = self.funding.cumulative(market_id, outcome);
        for id in self.positions.open_pair_ids(market_id, outcome) {
            let position = self.positions.get_mut(id)?;
            position::refresh(position, mark, index);
        }
        Ok(())
    }

    // ========================================================================
    // Funding settlement
    // ========================================================================

    /// Settle funding across every pair with open interest. A failing
    /// pair is reported and skipped; the sweep continues.
    pub fn settle_funding(&mut self) {
        let now = self.clock.now_ms();
        for (market_id, outcome) in self.positions.active_pairs() {
            if let Err(error) = self.settle_funding_pair(market_id, outcome, now) {
                tracing::warn!(
                    market_id = %market_id,
                    outcome,
                    "funding settlement failed: {error}"
                );
                self.emit(Event::FundingError {
                    market_id,
                    outcome,
                    detail: error.to_string(),
                });
            }
        }
    }

    fn settle_funding_pair(
        &mut self,
        market_id: MarketId,
        outcome: u16,
        now_ms: i64,
    ) -> Result<(), EngineError> {
        let market = self.registry.get(market_id)?.clone();
        let open = self.positions.open_on_pair(market_id, outcome);
        if open.is_empty() {
            return Ok(());
        }

        let long_oi: Tinybars = open
            .iter()
            .filter(|p| p.side == PositionSide::Long)
            .map(|p| p.size)
            .sum();
        let short_oi: Tinybars = open
            .iter()
            .filter(|p| p.side == PositionSide::Short)
            .map(|p| p.size)
            .sum();

        let rate = funding_rate(long_oi, short_oi);
        let mark = self.oracle.price_or_initial(&market, outcome);
        if !rate.is_finite() || !mark.is_finite() {
            return Err(EngineError::Internal("non-finite funding inputs".to_string()));
        }
        if rate == 0.0 {
            return Ok(());
        }

        let index = self.funding.advance(market_id, outcome, rate, mark, now_ms);

        let mut collected: Tinybars = 0;
        let mut distributed: Tinybars = 0;
        for id in self.positions.open_pair_ids(market_id, outcome) {
            let (account, side, size) = {
                let position = self.positions.get(id)?;
                (position.account.clone(), position.side, position.size)
            };

            let magnitude = scale(size, rate.abs());
            if magnitude == 0 {
                continue;
            }
            // Positive rate: longs pay shorts. Negative: shorts pay longs.
            let pays = (rate > 0.0) == (side == PositionSide::Long);

            let signed_payment = if pays {
                let debited = self.margin.debit_available(&account, magnitude);
                if debited < magnitude {
                    tracing::warn!(%account, due = magnitude, debited, "funding payment shortfall");
                }
                collected += debited;
                let balance = self.margin.get(&account).balance;
                self.emit_local(Event::BalanceChanged {
                    account: account.clone(),
                    delta: -debited,
                    balance,
                    reason: BalanceChangeReason::FundingPayment,
                });
                magnitude
            } else {
                let balance = self.margin.credit(&account, magnitude);
                distributed += magnitude;
                self.emit_local(Event::BalanceChanged {
                    account: account.clone(),
                    delta: magnitude,
                    balance,
                    reason: BalanceChangeReason::FundingReceipt,
                });
                -magnitude
            };

            let position = self.positions.get_mut(id)?;
            position.cumulative_funding_paid += signed_payment;
            position.funding_index_at_open = index.cumulative;
        }

        // Skewed open interest never balances exactly; the market escrow
        // carries the difference so tinybars are conserved.
        self.registry.escrow_add(market_id, collected - distributed);

        self.emit(Event::FundingSettled {
            market_id,
            outcome,
            rate,
            index: index.cumulative,
        });
        Ok(())
    }

    // ========================================================================
    // Liquidation engine
    // ========================================================================

    /// Background sweep over every pair with open interest, ascending
    /// market id. A quarantined pair stops locally, not globally.
    pub fn sweep_liquidations(&mut self) {
        for (market_id, outcome) in self.positions.active_pairs() {
            let result = self
                .refresh_pair(market_id, outcome)
                .and_then(|_| self.sweep_pair(market_id, outcome));
            if let Err(error) = result {
                tracing::error!(%market_id, outcome, "liquidation sweep failed: {error}");
            }
        }
    }

    fn sweep_pair(&mut self, market_id: MarketId, outcome: u16) -> Result<(), EngineError> {
        let now = self.clock.now_ms();
        for _ in 0..MAX_CASCADE_PASSES {
            let Some(position_id) = self.find_underwater(market_id, outcome) else {
                return Ok(());
            };
            let events = self.liquidation.liquidate(
                &mut self.positions,
                &mut self.margin,
                &mut self.insurance,
                &mut self.registry,
                position_id,
                now,
            )?;
            for event in events {
                self.emit(event);
            }
            self.refresh_pair(market_id, outcome)?;
        }
        Ok(())
    }

    fn find_underwater(&self, market_id: MarketId, outcome: u16) -> Option<PositionId> {
        for position in self.positions.open_on_pair(market_id, outcome) {
            let cross_equity = match position.margin_mode {
                MarginMode::Isolated => 0,
                MarginMode::Cross => self.effective_equity(&position.account),
            };
            if is_underwater(position, cross_equity) {
                return Some(position.id);
            }
        }
        None
    }

    pub fn liquidations(&self, limit: usize) -> Vec<LiquidationEvent> {
        self.liquidation.recent(limit)
    }

    pub fn liquidation_log(&self) -> &[LiquidationEvent] {
        self.liquidation.log()
    }

    // ========================================================================
    // Insurance fund
    // ========================================================================

    pub fn insurance_fund(&self) -> InsuranceFund {
        self.insurance.fund()
    }

    pub fn insurance_deposit(&mut self, amount: Tinybars) -> Result<InsuranceFund, EngineError> {
        let (old_balance, new_balance) = self.insurance.deposit(amount)?;
        self.emit(Event::InsuranceFundUpdated {
            old_balance,
            new_balance,
        });
        Ok(self.insurance.fund())
    }

    // ========================================================================
    // Snapshot / restore
    // ========================================================================

    pub fn to_snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            version: SNAPSHOT_VERSION,
            markets: MarketsDomain {
                markets: self.registry.all().cloned().collect(),
                orders: self.books.all_orders(),
                fills: self.fills.clone(),
                marks: self
                    .oracle
                    .entries()
                    .into_iter()
                    .map(|((market_id, outcome), record)| MarkEntry {
                        market_id,
                        outcome,
                        record,
                    })
                    .collect(),
            },
            derivatives: DerivativesDomain {
                accounts: self
                    .margin
                    .entries()
                    .map(|(account, margin)| MarginEntry {
                        account: account.clone(),
                        margin: *margin,
                    })
                    .collect(),
                positions: self.positions.all(),
                funding: self
                    .funding
                    .entries()
                    .into_iter()
                    .map(|((market_id, outcome), index)| FundingEntry {
                        market_id,
                        outcome,
                        index,
                    })
                    .collect(),
                liquidations: self.liquidation.log().to_vec(),
            },
            insurance: InsuranceDomain {
                fund: self.insurance.fund(),
            },
            coordination: CoordinationDomain {
                outbox: self.outbox.clone(),
                mark_sequences: self
                    .oracle
                    .sequence_entries()
                    .into_iter()
                    .map(|(market_id, sequence)| SequenceEntry {
                        market_id,
                        sequence,
                    })
                    .collect(),
            },
        }
    }

    /// One consistent serialization of the whole engine.
    pub fn snapshot(&self) -> Result<Vec<u8>, EngineError> {
        Ok(self.to_snapshot().to_bytes()?)
    }

    /// Total replacement of live state. Marks are recomputed from the
    /// books and curves afterwards so they can never be stale.
    pub fn restore_snapshot(&mut self, snapshot: EngineSnapshot) {
        let dispute_window_ms = self.config.dispute_window_ms;
        self.registry = MarketRegistry::restore(snapshot.markets.markets, dispute_window_ms);
        self.books = OrderBookManager::restore(snapshot.markets.orders);

        let mut last_fills: HashMap<(MarketId, u16), u8> = HashMap::new();
        for fill in &snapshot.markets.fills {
            last_fills.insert((fill.market_id, fill.outcome), fill.price_cents);
        }
        self.fills = snapshot.markets.fills;

        self.oracle = MarkOracle::restore_with_marks(
            snapshot
                .markets
                .marks
                .into_iter()
                .map(|e| ((e.market_id, e.outcome), e.record)),
            last_fills,
            snapshot
                .coordination
                .mark_sequences
                .into_iter()
                .map(|e| (e.market_id, e.sequence)),
        );

        self.margin = MarginLedger::restore(
            snapshot
                .derivatives
                .accounts
                .into_iter()
                .map(|e| (e.account, e.margin)),
        );
        self.positions = PositionBook::restore(snapshot.derivatives.positions);
        self.funding = FundingBook::restore(
            snapshot
                .derivatives
                .funding
                .into_iter()
                .map(|e| ((e.market_id, e.outcome), e.index)),
        );
        self.insurance = InsuranceFundManager::restore(snapshot.insurance.fund);
        self.liquidation = LiquidationEngine::restore(snapshot.derivatives.liquidations);
        self.outbox = snapshot.coordination.outbox;

        let now = self.clock.now_ms();
        let markets: Vec<Market> = self.registry.all().cloned().collect();
        for market in markets {
            for outcome in 0..market.outcome_count() {
                self.oracle.resync(&market, &self.books, outcome, now);
            }
        }
    }

    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let snapshot = EngineSnapshot::from_bytes(bytes)?;
        self.restore_snapshot(snapshot);
        Ok(())
    }

    // ========================================================================
    // Ledger outbox
    // ========================================================================

    /// Dispatch pending ledger effects. Called by the composition root
    /// outside the market critical sections; exhausted rows surface as
    /// `ledger_error` events but stay recorded for reconciliation.
    pub fn dispatch_outbox(&mut self, port: &dyn LedgerPort) -> usize {
        let now = self.clock.now_ms();
        let mut delivered = 0;
        for outcome in self.outbox.dispatch(port, now) {
            match outcome {
                DispatchOutcome::Delivered { .. } => delivered += 1,
                DispatchOutcome::Exhausted { event_id, error } => {
                    self.emit_local(Event::LedgerError {
                        event_id,
                        detail: error.to_string(),
                    });
                }
            }
        }
        delivered
    }

    pub fn outbox_pending(&self) -> usize {
        self.outbox.pending_len()
    }

    /// Conserved quantity: every margin balance, every market escrow,
    /// and the insurance fund. Constant under non-liquidation flows.
    pub fn conserved_total(&self) -> Tinybars {
        self.margin.total_balance() + self.registry.total_escrow() + self.insurance.balance()
    }

    // ========================================================================
    // Event plumbing
    // ========================================================================

    /// Publish on the bus and mirror to the consensus topic.
    fn emit(&mut self, event: Event) {
        let domain_event = DomainEvent::new(self.clock.now_ms(), event);
        self.bus.publish(&domain_event);
        if let Ok(payload) = serde_json::to_value(&domain_event) {
            self.outbox.record(
                domain_event.id,
                Effect::SubmitMessage {
                    topic_id: self.config.event_topic_id.clone(),
                    payload,
                },
            );
        }
    }

    /// Publish on the bus only (high-frequency internal events).
    fn emit_local(&mut self, event: Event) {
        let domain_event = DomainEvent::new(self.clock.now_ms(), event);
        self.bus.publish(&domain_event);
    }

    fn record_transfer(&mut self, from: &AccountId, to: &AccountId, amount: Tinybars) {
        if amount <= 0 {
            return;
        }
        self.outbox.record(
            EventId::generate(),
            Effect::Transfer {
                from: from.clone(),
                to: to.clone(),
                amount,
            },
        );
    }
}
