use crate::constants::{
    ADL_MIN_SLICE_FRACTION, PARTIAL_LIQUIDATION_FRACTION, PARTIAL_LIQUIDATION_THRESHOLD,
    POSITION_DUST, maintenance_margin_ratio,
};
use crate::{EngineError, InsuranceFundManager, MarginLedger, MarketRegistry, PositionBook};
use hashmark_state::{LiquidationEvent, Position};
use hashmark_types::{
    AccountId, Event, LiquidationId, LiquidationTier, MarketId, PositionId, PositionStatus,
    Tinybars, scale,
};

/// Maintenance margin for a position: size x ratio(leverage).
pub fn maintenance_margin(size: Tinybars, leverage: u32) -> Tinybars {
    scale(size, maintenance_margin_ratio(leverage))
}

/// Underwater test. Isolated positions stand on their own margin; cross
/// positions are judged by whole-account equity, which the caller
/// computes (the ledger plus open cross PnL).
pub fn is_underwater(position: &Position, cross_equity: Tinybars) -> bool {
    let maintenance = maintenance_margin(position.size, position.leverage);
    match position.margin_mode {
        hashmark_types::MarginMode::Isolated => {
            position.margin + position.unrealized_pnl < maintenance
        }
        hashmark_types::MarginMode::Cross => cross_equity < maintenance,
    }
}

/// Tier-1 close of the underwater position itself.
#[derive(Debug, Clone)]
struct Tier1Plan {
    position_id: PositionId,
    account: AccountId,
    market_id: MarketId,
    outcome: u16,
    size_closed: Tinybars,
    margin_slice: Tinybars,
    pnl_slice: Tinybars,
    /// max(0, margin + pnl), handed back to the account
    returned: Tinybars,
    loss: Tinybars,
    closes: bool,
}

/// One auto-deleveraging slice of an opposing winner.
#[derive(Debug, Clone)]
struct AdlSlice {
    position_id: PositionId,
    account: AccountId,
    size_slice: Tinybars,
    margin_slice: Tinybars,
    /// PnL the slice would have realized
    realized_slice: Tinybars,
    /// Part confiscated to cover the deficit
    take: Tinybars,
    closes: bool,
}

/// A fully staged cascade. Built from reads only, validated, then
/// applied as one mutation; a validation failure quarantines the market
/// and nothing commits.
#[derive(Debug, Clone)]
struct CascadePlan {
    tier1: Tier1Plan,
    fund_absorbed: Tinybars,
    adl: Vec<AdlSlice>,
    shortfall: Tinybars,
}

/// Three-tier cascading liquidation engine with an append-only log.
#[derive(Debug, Clone, Default)]
pub struct LiquidationEngine {
    log: Vec<LiquidationEvent>,
}

impl LiquidationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> &[LiquidationEvent] {
        &self.log
    }

    pub fn recent(&self, limit: usize) -> Vec<LiquidationEvent> {
        self.log.iter().rev().take(limit).cloned().collect()
    }

    /// Liquidate one underwater position. The whole cascade either
    /// commits or, if the staged plan fails validation, the market is
    /// quarantined and no state changes.
    pub fn liquidate(
        &mut self,
        positions: &mut PositionBook,
        margin: &mut MarginLedger,
        insurance: &mut InsuranceFundManager,
        registry: &mut MarketRegistry,
        position_id: PositionId,
        now_ms: i64,
    ) -> Result<Vec<Event>, EngineError> {
        let plan = Self::stage(positions, insurance, position_id)?;

        if let Err(violation) = Self::validate(&plan, positions, margin, insurance) {
            registry.quarantine(plan.tier1.market_id);
            return Err(EngineError::Internal(format!(
                "liquidation cascade aborted: {violation}"
            )));
        }

        Ok(self.apply(plan, positions, margin, registry, insurance, now_ms))
    }

    /// Stage the cascade from reads only.
    fn stage(
        positions: &PositionBook,
        insurance: &InsuranceFundManager,
        position_id: PositionId,
    ) -> Result<CascadePlan, EngineError> {
        let position = positions.get(position_id)?;
        if !position.is_open() {
            return Err(EngineError::conflict("position is not open"));
        }

        // Partial-first rule: large positions lose a slice, small ones
        // close outright. Exactly at the threshold counts as small.
        let fraction = if position.size > PARTIAL_LIQUIDATION_THRESHOLD {
            PARTIAL_LIQUIDATION_FRACTION
        } else {
            1.0
        };

        let size_closed = scale(position.size, fraction);
        let margin_slice = scale(position.margin, fraction);
        let pnl_slice = scale(position.unrealized_pnl, fraction);
        let loss = (-pnl_slice).max(0);
        let returned = (margin_slice + pnl_slice).max(0);

        let tier1 = Tier1Plan {
            position_id,
            account: position.account.clone(),
            market_id: position.market_id,
            outcome: position.outcome,
            size_closed,
            margin_slice,
            pnl_slice,
            returned,
            loss,
            closes: fraction >= 1.0,
        };

        // Tier 2: the insurance fund absorbs the deficit beyond margin.
        let deficit = (loss - margin_slice).max(0);
        let fund_absorbed = deficit.min(insurance.balance()).max(0);
        let mut remaining = deficit - fund_absorbed;

        // Tier 3: deleverage opposing winners, best score first.
        let mut adl = Vec::new();
        if remaining > 0 {
            for candidate in
                Self::rank_candidates(positions, position.market_id, position.outcome, position)
            {
                if remaining <= 0 {
                    break;
                }

                let take = remaining.min(candidate.unrealized_pnl);
                let slice = (take as f64 / candidate.unrealized_pnl as f64)
                    .clamp(ADL_MIN_SLICE_FRACTION, 1.0);
                let mut size_slice = scale(candidate.size, slice);
                let mut margin_slice = scale(candidate.margin, slice);
                let mut realized_slice = scale(candidate.unrealized_pnl, slice);

                // A slice that leaves only dust closes the candidate
                // outright and realizes everything it still carries.
                let closes = candidate.size - size_slice <= POSITION_DUST;
                if closes {
                    size_slice = candidate.size;
                    margin_slice = candidate.margin;
                    realized_slice = candidate.unrealized_pnl;
                }
                // Rounding must never confiscate more than is realized
                let take = take.min(realized_slice);

                adl.push(AdlSlice {
                    position_id: candidate.id,
                    account: candidate.account.clone(),
                    size_slice,
                    margin_slice,
                    realized_slice,
                    take,
                    closes,
                });
                remaining -= take;
            }
        }

        Ok(CascadePlan {
            tier1,
            fund_absorbed,
            adl,
            shortfall: remaining.max(0),
        })
    }

    /// Opposing open positions with positive unrealized PnL, ranked
    /// descending by PnL x leverage, ties broken by earliest open.
    fn rank_candidates<'a>(
        positions: &'a PositionBook,
        market_id: MarketId,
        outcome: u16,
        target: &Position,
    ) -> Vec<&'a Position> {
        let mut candidates: Vec<&Position> = positions
            .open_on_pair(market_id, outcome)
            .into_iter()
            .filter(|p| p.id != target.id)
            .filter(|p| p.side == target.side.opposite())
            .filter(|p| p.unrealized_pnl > 0)
            .collect();

        candidates.sort_by(|a, b| {
            let score_a = a.unrealized_pnl * a.leverage as i128;
            let score_b = b.unrealized_pnl * b.leverage as i128;
            score_b
                .cmp(&score_a)
                .then(a.opened_at_ms.cmp(&b.opened_at_ms))
                .then(a.id.cmp(&b.id))
        });
        candidates
    }

    /// Invariant checks over the staged plan. Any failure here means the
    /// cascade must not commit.
    fn validate(
        plan: &CascadePlan,
        positions: &PositionBook,
        margin: &MarginLedger,
        insurance: &InsuranceFundManager,
    ) -> Result<(), String> {
        let t = &plan.tier1;
        let position = positions
            .get(t.position_id)
            .map_err(|_| "target position vanished".to_string())?;

        if t.size_closed < 0 || t.size_closed > position.size {
            return Err(format!("tier-1 close size {} out of range", t.size_closed));
        }
        if t.margin_slice < 0 || t.margin_slice > position.margin {
            return Err(format!("tier-1 margin slice {} out of range", t.margin_slice));
        }
        if margin.get(&t.account).locked < t.margin_slice {
            return Err("account lien smaller than position margin".to_string());
        }
        if plan.fund_absorbed < 0 || plan.fund_absorbed > insurance.balance() {
            return Err("insurance fund would go negative".to_string());
        }

        for slice in &plan.adl {
            let candidate = positions
                .get(slice.position_id)
                .map_err(|_| "candidate position vanished".to_string())?;
            if slice.size_slice < 0 || slice.size_slice > candidate.size {
                return Err("candidate slice exceeds candidate size".to_string());
            }
            if slice.margin_slice < 0 || slice.margin_slice > candidate.margin {
                return Err("candidate margin slice exceeds margin".to_string());
            }
            if margin.get(&slice.account).locked < slice.margin_slice {
                return Err("candidate lien smaller than margin slice".to_string());
            }
            if slice.take < 0 || slice.take > slice.realized_slice {
                return Err("confiscated amount exceeds realized slice".to_string());
            }
        }

        Ok(())
    }

    /// Commit the staged plan. Infallible by construction: everything
    /// here was validated against current state.
    fn apply(
        &mut self,
        plan: CascadePlan,
        positions: &mut PositionBook,
        margin: &mut MarginLedger,
        registry: &mut MarketRegistry,
        insurance: &mut InsuranceFundManager,
        now_ms: i64,
    ) -> Vec<Event> {
        let mut events = Vec::new();
        let t = plan.tier1;

        // Tier 1: close the slice at mark, return what margin survives.
        {
            let position = positions.get_mut(t.position_id).expect("validated");
            position.size -= t.size_closed;
            position.margin -= t.margin_slice;
            position.unrealized_pnl -= t.pnl_slice;
            position.realized_pnl += t.pnl_slice;
            if t.closes {
                position.status = PositionStatus::Liquidated;
                position.closed_at_ms = Some(now_ms);
            }
        }

        margin.release(&t.account, t.margin_slice).expect("validated");
        // The lien is gone; the forfeited part of the margin leaves the
        // balance for the market escrow, any excess comes back from it.
        let balance_delta = t.returned - t.margin_slice;
        if balance_delta >= 0 {
            margin.credit(&t.account, balance_delta);
            registry.escrow_add(t.market_id, -balance_delta);
        } else {
            let forfeited = margin.debit_available(&t.account, -balance_delta);
            registry.escrow_add(t.market_id, forfeited);
        }

        // Tier 2: fund backstop upgrades the same log entry.
        let old_fund_balance = insurance.balance();
        let absorbed = insurance.debit_up_to(plan.fund_absorbed);
        if absorbed > 0 {
            registry.escrow_add(t.market_id, absorbed);
            events.push(Event::InsuranceFundUpdated {
                old_balance: old_fund_balance,
                new_balance: insurance.balance(),
            });
        }

        let tier = if absorbed > 0 {
            LiquidationTier::InsuranceFund
        } else {
            LiquidationTier::MarketClose
        };
        let entry = LiquidationEvent {
            id: LiquidationId::generate(),
            position_id: t.position_id,
            tier,
            size_closed: t.size_closed,
            loss: t.loss,
            insurance_fund_delta: -absorbed,
            at_ms: now_ms,
        };
        events.push(Event::PositionLiquidated {
            liquidation_id: entry.id,
            position_id: entry.position_id,
            tier: entry.tier,
            size_closed: entry.size_closed,
            loss: entry.loss,
            insurance_fund_delta: entry.insurance_fund_delta,
        });
        self.log.push(entry);

        // Tier 3: realize opposing winners' PnL slices, minus the take.
        for slice in plan.adl {
            {
                let candidate = positions.get_mut(slice.position_id).expect("validated");
                candidate.size -= slice.size_slice;
                candidate.margin -= slice.margin_slice;
                candidate.unrealized_pnl -= slice.realized_slice;
                candidate.realized_pnl += slice.realized_slice - slice.take;
                if slice.closes {
                    candidate.status = PositionStatus::Closed;
                    candidate.closed_at_ms = Some(now_ms);
                }
            }

            margin
                .release(&slice.account, slice.margin_slice)
                .expect("validated");
            let surplus = (slice.realized_slice - slice.take).max(0);
            if surplus > 0 {
                margin.credit(&slice.account, surplus);
                registry.escrow_add(t.market_id, -surplus);
            }

            let entry = LiquidationEvent {
                id: LiquidationId::generate(),
                position_id: slice.position_id,
                tier: LiquidationTier::AutoDeleverage,
                size_closed: slice.size_slice,
                loss: slice.take,
                insurance_fund_delta: 0,
                at_ms: now_ms,
            };
            events.push(Event::PositionLiquidated {
                liquidation_id: entry.id,
                position_id: entry.position_id,
                tier: entry.tier,
                size_closed: entry.size_closed,
                loss: entry.loss,
                insurance_fund_delta: 0,
            });
            self.log.push(entry);
        }

        if plan.shortfall > 0 {
            tracing::warn!(
                market_id = %t.market_id,
                outcome = t.outcome,
                shortfall = plan.shortfall,
                "socialized loss shortfall accepted"
            );
            events.push(Event::SocializedLossShortfall {
                market_id: t.market_id,
                outcome: t.outcome,
                remaining: plan.shortfall,
            });
        }

        events
    }

    pub fn restore(log: Vec<LiquidationEvent>) -> Self {
        Self { log }
    }
}
