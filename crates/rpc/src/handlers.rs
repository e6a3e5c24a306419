use crate::{RpcError, RpcState, require_admin, types::*};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use hashmark_engine::{CreateMarketInput, EngineError, MarketFilter};
use hashmark_types::{AccountId, MarketId, MarketStatus, OrderId, PositionId};
use serde::Deserialize;

/// Health check handler
pub async fn health() -> &'static str {
    "OK"
}

/// Prometheus metrics export
pub async fn metrics(State(state): State<RpcState>) -> Result<String, RpcError> {
    state
        .metrics
        .export()
        .map_err(|e| RpcError::Engine(EngineError::Internal(e.to_string())))
}

fn parse_market_id(raw: &str) -> Result<MarketId, RpcError> {
    MarketId::parse(raw).ok_or(RpcError::Engine(EngineError::NotFound("market")))
}

fn parse_order_id(raw: &str) -> Result<OrderId, RpcError> {
    OrderId::parse(raw).ok_or(RpcError::Engine(EngineError::NotFound("order")))
}

fn parse_position_id(raw: &str) -> Result<PositionId, RpcError> {
    PositionId::parse(raw).ok_or(RpcError::Engine(EngineError::NotFound("position")))
}

// ---------------------------------------------------------------------------
// Markets
// ---------------------------------------------------------------------------

pub async fn create_market(
    State(state): State<RpcState>,
    Json(req): Json<CreateMarketRequest>,
) -> Result<Json<MarketView>, RpcError> {
    let seeds = req
        .seed_orders
        .into_iter()
        .map(SeedOrderRequest::into_seed)
        .collect::<Result<Vec<_>, _>>()?;

    let input = CreateMarketInput {
        question: req.question,
        creator: AccountId::from(req.creator),
        close_at_ms: req.close_at_ms,
        outcomes: req.outcomes,
        regime: req.regime,
        initial_funding: hbar_amount(req.initial_funding_hbar)?,
        initial_odds: req.initial_odds,
        escrow_account: None,
    };

    let mut engine = state.write_engine().await?;
    let market = engine.create_market(input, seeds)?;
    state.commit(&mut engine);
    Ok(Json(market.into()))
}

#[derive(Debug, Deserialize)]
pub struct ListMarketsQuery {
    #[serde(default)]
    pub status: Option<MarketStatus>,
    #[serde(default)]
    pub creator: Option<String>,
}

pub async fn list_markets(
    State(state): State<RpcState>,
    Query(query): Query<ListMarketsQuery>,
) -> Result<Json<Vec<MarketView>>, RpcError> {
    let filter = MarketFilter {
        status: query.status,
        creator: query.creator.map(AccountId::from),
    };
    let engine = state.read_engine().await?;
    Ok(Json(
        engine
            .list_markets(&filter)
            .into_iter()
            .map(Into::into)
            .collect(),
    ))
}

pub async fn get_market(
    State(state): State<RpcState>,
    Path(id): Path<String>,
) -> Result<Json<MarketView>, RpcError> {
    let market_id = parse_market_id(&id)?;
    let engine = state.read_engine().await?;
    Ok(Json(engine.get_market(market_id)?.into()))
}

pub async fn transition_market(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<MarketView>, RpcError> {
    require_admin(&state, &headers)?;
    let market_id = parse_market_id(&id)?;

    let mut engine = state.write_engine().await?;
    let market = engine.transition_market(market_id, req.status, req.outcome)?;
    state.commit(&mut engine);
    Ok(Json(market.into()))
}

pub async fn book_depth(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<DepthView>, RpcError> {
    let market_id = parse_market_id(&id)?;
    let engine = state.read_engine().await?;
    engine.get_market(market_id)?;

    let (bids, asks) = engine.book_depth(market_id, query.outcome, query.levels);
    let level = |(price_cents, quantity): (u8, i128)| DepthLevelView {
        price_cents,
        quantity_hbar: hashmark_types::to_hbar(quantity),
    };
    Ok(Json(DepthView {
        bids: bids.into_iter().map(level).collect(),
        asks: asks.into_iter().map(level).collect(),
    }))
}

// ---------------------------------------------------------------------------
// Trading
// ---------------------------------------------------------------------------

pub async fn place_bet(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    Json(req): Json<PlaceBetRequest>,
) -> Result<Json<BetView>, RpcError> {
    let market_id = parse_market_id(&id)?;
    let max_cost = hbar_amount(req.max_cost_hbar)?;

    let mut engine = state.write_engine().await?;
    let receipt = engine.buy_shares(
        market_id,
        req.outcome,
        AccountId::from(req.account_id),
        max_cost,
        req.max_price_percent,
    )?;
    state.commit(&mut engine);
    state.metrics.bets_placed.with_label_values::<&str>(&[]).inc();
    Ok(Json(receipt.into()))
}

pub async fn place_order(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<Json<OrderSubmitView>, RpcError> {
    let market_id = parse_market_id(&id)?;
    let quantity = hbar_amount(req.quantity_hbar)?;

    let mut engine = state.write_engine().await?;
    let receipt = engine.submit_order(
        market_id,
        req.outcome,
        AccountId::from(req.account_id),
        req.side,
        req.price_cents,
        quantity,
    )?;
    state.commit(&mut engine);

    let side = format!("{:?}", receipt.order.side).to_uppercase();
    state
        .metrics
        .orders_placed
        .with_label_values(&[side.as_str()])
        .inc();
    state
        .metrics
        .fills
        .with_label_values::<&str>(&[])
        .inc_by(receipt.fills.len() as f64);
    Ok(Json(receipt.into()))
}

pub async fn cancel_order(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<OrderView>, RpcError> {
    let order_id = parse_order_id(&id)?;
    let account = AccountId::from(query.account_id);

    let mut engine = state.write_engine().await?;
    let order = engine.cancel_order(order_id, &account)?;
    state.commit(&mut engine);
    state.metrics.orders_cancelled.with_label_values::<&str>(&[]).inc();
    Ok(Json(order.into()))
}

// ---------------------------------------------------------------------------
// Derivatives
// ---------------------------------------------------------------------------

pub async fn open_position(
    State(state): State<RpcState>,
    Json(req): Json<OpenPositionRequest>,
) -> Result<Json<PositionView>, RpcError> {
    let market_id = parse_market_id(&req.market_id)?;
    let size = hbar_amount(req.size_hbar)?;

    let mut engine = state.write_engine().await?;
    let position = engine.open_position(
        AccountId::from(req.account_id),
        market_id,
        req.outcome,
        req.side,
        size,
        req.leverage,
        req.margin_mode,
    )?;
    state.commit(&mut engine);

    let side = format!("{:?}", position.side).to_uppercase();
    state
        .metrics
        .positions_opened
        .with_label_values(&[side.as_str()])
        .inc();
    Ok(Json(position.into()))
}

pub async fn close_position(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    Json(req): Json<ClosePositionRequest>,
) -> Result<Json<CloseView>, RpcError> {
    let position_id = parse_position_id(&id)?;
    let account = AccountId::from(req.account_id);

    let mut engine = state.write_engine().await?;
    let receipt = engine.close_position(position_id, &account, req.fraction)?;
    state.commit(&mut engine);
    state.metrics.positions_closed.with_label_values::<&str>(&[]).inc();
    Ok(Json(receipt.into()))
}

pub async fn list_positions(
    State(state): State<RpcState>,
    Query(query): Query<AccountQuery>,
) -> Result<Json<Vec<PositionView>>, RpcError> {
    let account = AccountId::from(query.account_id);
    let engine = state.read_engine().await?;
    Ok(Json(
        engine
            .positions_for_account(&account)
            .into_iter()
            .map(Into::into)
            .collect(),
    ))
}

pub async fn list_liquidations(
    State(state): State<RpcState>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<LiquidationView>>, RpcError> {
    let engine = state.read_engine().await?;
    Ok(Json(
        engine
            .liquidations(query.limit)
            .into_iter()
            .map(Into::into)
            .collect(),
    ))
}

// ---------------------------------------------------------------------------
// Accounts & insurance
// ---------------------------------------------------------------------------

pub async fn get_account(
    State(state): State<RpcState>,
    Path(id): Path<String>,
) -> Result<Json<AccountView>, RpcError> {
    let account = AccountId::from(id);
    let engine = state.read_engine().await?;
    let margin = engine.margin_account(&account);
    let equity = engine.effective_equity(&account);
    Ok(Json(AccountView::new(&account, margin, equity)))
}

pub async fn deposit(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<AccountView>, RpcError> {
    let account = AccountId::from(id);
    let amount = hbar_amount(req.amount_hbar)?;

    let mut engine = state.write_engine().await?;
    engine.deposit(&account, amount)?;
    state.commit(&mut engine);

    let margin = engine.margin_account(&account);
    let equity = engine.effective_equity(&account);
    Ok(Json(AccountView::new(&account, margin, equity)))
}

pub async fn withdraw(
    State(state): State<RpcState>,
    Path(id): Path<String>,
    Json(req): Json<DepositRequest>,
) -> Result<Json<AccountView>, RpcError> {
    let account = AccountId::from(id);
    let amount = hbar_amount(req.amount_hbar)?;

    let mut engine = state.write_engine().await?;
    engine.withdraw(&account, amount)?;
    state.commit(&mut engine);

    let margin = engine.margin_account(&account);
    let equity = engine.effective_equity(&account);
    Ok(Json(AccountView::new(&account, margin, equity)))
}

pub async fn get_insurance(State(state): State<RpcState>) -> Result<Json<InsuranceView>, RpcError> {
    let engine = state.read_engine().await?;
    Ok(Json(engine.insurance_fund().into()))
}

pub async fn insurance_deposit(
    State(state): State<RpcState>,
    headers: HeaderMap,
    Json(req): Json<DepositRequest>,
) -> Result<Json<InsuranceView>, RpcError> {
    require_admin(&state, &headers)?;
    let amount = hbar_amount(req.amount_hbar)?;

    let mut engine = state.write_engine().await?;
    let fund = engine.insurance_deposit(amount)?;
    state.commit(&mut engine);
    Ok(Json(fund.into()))
}
