use crate::EngineError;
use hashmark_state::Position;
use hashmark_types::{
    AccountId, MarginMode, MarketId, PositionId, PositionSide, PositionStatus, Tinybars, scale,
};
use std::collections::BTreeMap;

/// Exclusive owner of every perpetual position record.
///
/// Other subsystems (notably the liquidation cascade) operate on
/// positions through this book's API and never mutate a record they have
/// merely been handed; that exclusivity is what makes the cascade's
/// plan-then-apply commit atomic.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: BTreeMap<PositionId, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, position: Position) {
        self.positions.insert(position.id, position);
    }

    pub fn get(&self, id: PositionId) -> Result<&Position, EngineError> {
        self.positions.get(&id).ok_or(EngineError::NotFound("position"))
    }

    pub fn get_mut(&mut self, id: PositionId) -> Result<&mut Position, EngineError> {
        self.positions
            .get_mut(&id)
            .ok_or(EngineError::NotFound("position"))
    }

    /// Open positions on one (market, outcome), id order.
    pub fn open_on_pair(&self, market_id: MarketId, outcome: u16) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| p.is_open() && p.market_id == market_id && p.outcome == outcome)
            .collect()
    }

    pub fn open_pair_ids(&self, market_id: MarketId, outcome: u16) -> Vec<PositionId> {
        self.open_on_pair(market_id, outcome)
            .into_iter()
            .map(|p| p.id)
            .collect()
    }

    /// Every (market, outcome) pair with at least one open position.
    pub fn active_pairs(&self) -> Vec<(MarketId, u16)> {
        let mut pairs: Vec<_> = self
            .positions
            .values()
            .filter(|p| p.is_open())
            .map(|p| (p.market_id, p.outcome))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    pub fn for_account(&self, account: &AccountId) -> Vec<&Position> {
        self.positions
            .values()
            .filter(|p| &p.account == account)
            .collect()
    }

    /// Unrealized PnL contributed to whole-account equity: open CROSS
    /// positions only; isolated positions keep their PnL to themselves.
    pub fn cross_unrealized_pnl(&self, account: &AccountId) -> Tinybars {
        self.positions
            .values()
            .filter(|p| p.is_open() && &p.account == account && p.margin_mode == MarginMode::Cross)
            .map(|p| p.unrealized_pnl)
            .sum()
    }

    pub fn all(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    pub fn restore(positions: impl IntoIterator<Item = Position>) -> Self {
        Self {
            positions: positions.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

/// size x (mark - entry) / entry, signed by position direction.
pub fn unrealized_pnl(size: Tinybars, entry: f64, mark: f64, side: PositionSide) -> Tinybars {
    if entry <= 0.0 {
        return 0;
    }
    scale(size, (mark - entry) / entry * side.direction() as f64)
}

/// Refresh a position against the current mark and funding index. Never
/// mutates status; pending funding reduces the displayed PnL until the
/// settlement sweep commits it.
pub fn refresh(position: &mut Position, mark: f64, funding_index: f64) {
    position.mark_price = mark;
    let raw = unrealized_pnl(position.size, position.entry_price, mark, position.side);
    let pending = pending_funding(position, funding_index);
    position.unrealized_pnl = raw - pending;
}

/// Funding accrued since the last commit: positive when this position
/// would pay. Longs pay while the index rises, shorts while it falls.
pub fn pending_funding(position: &Position, funding_index: f64) -> Tinybars {
    let delta = funding_index - position.funding_index_at_open;
    let pay_direction = match position.side {
        PositionSide::Long => 1.0,
        PositionSide::Short => -1.0,
    };
    scale(position.size, delta * pay_direction)
}
