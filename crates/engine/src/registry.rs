use crate::EngineError;
use hashmark_state::{CurveState, Market};
use hashmark_types::{AccountId, LiquidityRegime, MarketId, MarketStatus, Tinybars};
use std::collections::BTreeMap;

/// Inputs for market creation. Seed orders for HIGH_LIQUIDITY markets
/// are validated here and placed by the engine after insertion.
#[derive(Debug, Clone)]
pub struct CreateMarketInput {
    pub question: String,
    pub creator: AccountId,
    pub close_at_ms: i64,
    pub outcomes: Vec<String>,
    pub regime: LiquidityRegime,
    pub initial_funding: Tinybars,
    /// Creation-time odds per outcome; defaults to uniform
    pub initial_odds: Option<Vec<f64>>,
    /// Defaults to a synthetic escrow id derived from the market id
    pub escrow_account: Option<AccountId>,
}

/// Filter for market listings.
#[derive(Debug, Clone, Default)]
pub struct MarketFilter {
    pub status: Option<MarketStatus>,
    pub creator: Option<AccountId>,
}

/// Market metadata and lifecycle.
///
/// Markets are created once, mutated only through lifecycle transitions,
/// and never destroyed; SETTLED is terminal.
#[derive(Debug, Clone, Default)]
pub struct MarketRegistry {
    markets: BTreeMap<MarketId, Market>,
    dispute_window_ms: i64,
}

impl MarketRegistry {
    pub fn new(dispute_window_ms: i64) -> Self {
        Self {
            markets: BTreeMap::new(),
            dispute_window_ms,
        }
    }

    /// Validate a creation input and build the market record.
    pub fn build(&self, input: &CreateMarketInput, now_ms: i64) -> Result<Market, EngineError> {
        if input.question.trim().is_empty() {
            return Err(EngineError::validation("question must not be empty"));
        }
        if input.outcomes.len() < 2 {
            return Err(EngineError::validation("a market needs at least two outcomes"));
        }
        if input.outcomes.iter().any(|o| o.trim().is_empty()) {
            return Err(EngineError::validation("outcome labels must not be empty"));
        }
        if input.initial_funding <= 0 {
            return Err(EngineError::validation("initial funding must be positive"));
        }
        if input.close_at_ms <= now_ms {
            return Err(EngineError::validation("close time must be in the future"));
        }

        let n = input.outcomes.len();
        let initial_odds = match &input.initial_odds {
            Some(odds) => {
                if odds.len() != n {
                    return Err(EngineError::validation("one initial odd per outcome required"));
                }
                if odds.iter().any(|p| !p.is_finite() || *p <= 0.0 || *p >= 1.0) {
                    return Err(EngineError::validation("initial odds must lie in (0, 1)"));
                }
                let total: f64 = odds.iter().sum();
                odds.iter().map(|p| p / total).collect()
            }
            None => vec![1.0 / n as f64; n],
        };

        let id = MarketId::generate();
        let curve = match input.regime {
            LiquidityRegime::LowLiquidity => Some(CurveState {
                // Bounds the AMM's worst-case loss by the creator's funding
                b: hashmark_types::to_hbar(input.initial_funding) / (n as f64).ln(),
                shares: vec![0.0; n],
            }),
            LiquidityRegime::HighLiquidity => None,
        };

        Ok(Market {
            id,
            question: input.question.trim().to_string(),
            creator: input.creator.clone(),
            escrow_account: input
                .escrow_account
                .clone()
                .unwrap_or_else(|| AccountId::new(format!("escrow.{id}"))),
            close_at_ms: input.close_at_ms,
            status: MarketStatus::Open,
            outcomes: input.outcomes.clone(),
            regime: input.regime,
            curve,
            initial_funding: input.initial_funding,
            escrow: input.initial_funding,
            initial_odds,
            resolved_outcome: None,
            self_attested_outcome: None,
            dispute_deadline_ms: None,
            created_at_ms: now_ms,
        })
    }

    pub fn insert(&mut self, market: Market) {
        self.markets.insert(market.id, market);
    }

    pub fn get(&self, id: MarketId) -> Result<&Market, EngineError> {
        self.markets.get(&id).ok_or(EngineError::NotFound("market"))
    }

    pub fn get_mut(&mut self, id: MarketId) -> Result<&mut Market, EngineError> {
        self.markets
            .get_mut(&id)
            .ok_or(EngineError::NotFound("market"))
    }

    pub fn list(&self, filter: &MarketFilter) -> Vec<&Market> {
        self.markets
            .values()
            .filter(|m| filter.status.is_none_or(|s| m.status == s))
            .filter(|m| {
                filter
                    .creator
                    .as_ref()
                    .is_none_or(|c| &m.creator == c)
            })
            .collect()
    }

    /// Market ids in ascending order; the lock-acquisition and sweep
    /// order for cross-market passes.
    pub fn ids(&self) -> Vec<MarketId> {
        self.markets.keys().copied().collect()
    }

    /// Escrowed collateral held by a market.
    pub fn escrow(&self, id: MarketId) -> Tinybars {
        self.markets.get(&id).map(|m| m.escrow).unwrap_or(0)
    }

    pub fn escrow_add(&mut self, id: MarketId, delta: Tinybars) {
        if let Some(market) = self.markets.get_mut(&id) {
            market.escrow += delta;
        }
    }

    pub fn total_escrow(&self) -> Tinybars {
        self.markets.values().map(|m| m.escrow).sum()
    }

    /// Drive the lifecycle state machine. Returns (from, to).
    ///
    /// RESOLVED requires an outcome, either supplied here or previously
    /// self-attested. DISPUTED records the challenged outcome and opens
    /// the challenge window.
    pub fn transition(
        &mut self,
        id: MarketId,
        to: MarketStatus,
        outcome: Option<u16>,
        now_ms: i64,
    ) -> Result<(MarketStatus, MarketStatus), EngineError> {
        let dispute_window_ms = self.dispute_window_ms;
        let market = self.get_mut(id)?;
        let from = market.status;

        if !from.can_transition_to(to) {
            return Err(EngineError::conflict(format!(
                "cannot transition market from {from:?} to {to:?}"
            )));
        }

        match to {
            MarketStatus::Resolved => {
                let resolved = outcome
                    .or(market.self_attested_outcome)
                    .ok_or_else(|| EngineError::validation("resolution requires an outcome"))?;
                if !market.has_outcome(resolved) {
                    return Err(EngineError::validation(format!(
                        "outcome {resolved} is not one of the market's outcomes"
                    )));
                }
                market.resolved_outcome = Some(resolved);
                market.dispute_deadline_ms = None;
            }
            MarketStatus::Disputed => {
                let attested = outcome
                    .ok_or_else(|| EngineError::validation("dispute requires the attested outcome"))?;
                if !market.has_outcome(attested) {
                    return Err(EngineError::validation(format!(
                        "outcome {attested} is not one of the market's outcomes"
                    )));
                }
                market.self_attested_outcome = Some(attested);
                market.dispute_deadline_ms = Some(now_ms + dispute_window_ms);
            }
            _ => {}
        }

        market.status = to;
        Ok((from, to))
    }

    /// Auto-advance disputes whose challenge window expired without a
    /// challenge: DISPUTED -> RESOLVED with the self-attested outcome.
    pub fn expire_disputes(&mut self, now_ms: i64) -> Vec<MarketId> {
        let mut advanced = Vec::new();
        for market in self.markets.values_mut() {
            if market.status != MarketStatus::Disputed {
                continue;
            }
            let Some(deadline) = market.dispute_deadline_ms else {
                continue;
            };
            if deadline > now_ms {
                continue;
            }
            market.resolved_outcome = market.self_attested_outcome;
            market.status = MarketStatus::Resolved;
            market.dispute_deadline_ms = None;
            advanced.push(market.id);
        }
        advanced
    }

    /// Operator trap door used when a liquidation cascade trips an
    /// invariant check. No trading operation is accepted afterwards.
    pub fn quarantine(&mut self, id: MarketId) {
        if let Some(market) = self.markets.get_mut(&id) {
            tracing::error!(market_id = %id, "market quarantined pending operator action");
            market.status = MarketStatus::Quarantined;
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &Market> {
        self.markets.values()
    }

    pub fn restore(
        markets: impl IntoIterator<Item = Market>,
        dispute_window_ms: i64,
    ) -> Self {
        let mut registry = Self::new(dispute_window_ms);
        for market in markets {
            registry.insert(market);
        }
        registry
    }
}

impl Default for CreateMarketInput {
    fn default() -> Self {
        Self {
            question: String::new(),
            creator: AccountId::new("0.0.0"),
            close_at_ms: 0,
            outcomes: Vec::new(),
            regime: LiquidityRegime::HighLiquidity,
            initial_funding: 0,
            initial_odds: None,
            escrow_account: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_DISPUTE_WINDOW_MS;
    use hashmark_types::TINYBARS_PER_HBAR;

    fn input(regime: LiquidityRegime) -> CreateMarketInput {
        CreateMarketInput {
            question: "Will it rain tomorrow?".to_string(),
            creator: AccountId::from("0.0.1001"),
            close_at_ms: 1_000_000,
            outcomes: vec!["YES".to_string(), "NO".to_string()],
            regime,
            initial_funding: 100 * TINYBARS_PER_HBAR,
            initial_odds: None,
            escrow_account: None,
        }
    }

    #[test]
    fn test_build_low_liquidity_derives_curve() {
        let registry = MarketRegistry::new(DEFAULT_DISPUTE_WINDOW_MS);
        let market = registry
            .build(&input(LiquidityRegime::LowLiquidity), 0)
            .unwrap();
        let curve = market.curve.unwrap();
        assert!((curve.b - 100.0 / 2f64.ln()).abs() < 1e-9);
        assert_eq!(curve.shares, vec![0.0, 0.0]);
    }

    #[test]
    fn test_build_rejects_bad_input() {
        let registry = MarketRegistry::new(DEFAULT_DISPUTE_WINDOW_MS);
        let mut bad = input(LiquidityRegime::HighLiquidity);
        bad.outcomes = vec!["YES".to_string()];
        assert!(registry.build(&bad, 0).is_err());

        let mut bad = input(LiquidityRegime::HighLiquidity);
        bad.initial_funding = 0;
        assert!(registry.build(&bad, 0).is_err());
    }

    #[test]
    fn test_lifecycle_and_dispute_expiry() {
        let mut registry = MarketRegistry::new(1_000);
        let market = registry
            .build(&input(LiquidityRegime::HighLiquidity), 0)
            .unwrap();
        let id = market.id;
        registry.insert(market);

        registry
            .transition(id, MarketStatus::Closed, None, 10)
            .unwrap();
        registry
            .transition(id, MarketStatus::Disputed, Some(1), 20)
            .unwrap();

        // Window still open
        assert!(registry.expire_disputes(500).is_empty());

        let advanced = registry.expire_disputes(2_000);
        assert_eq!(advanced, vec![id]);
        let market = registry.get(id).unwrap();
        assert_eq!(market.status, MarketStatus::Resolved);
        assert_eq!(market.resolved_outcome, Some(1));
    }

    #[test]
    fn test_no_backward_transitions() {
        let mut registry = MarketRegistry::new(1_000);
        let market = registry
            .build(&input(LiquidityRegime::HighLiquidity), 0)
            .unwrap();
        let id = market.id;
        registry.insert(market);

        registry
            .transition(id, MarketStatus::Closed, None, 0)
            .unwrap();
        assert!(matches!(
            registry.transition(id, MarketStatus::Open, None, 0),
            Err(EngineError::StateConflict(_))
        ));
    }

    #[test]
    fn test_resolution_requires_known_outcome() {
        let mut registry = MarketRegistry::new(1_000);
        let market = registry
            .build(&input(LiquidityRegime::HighLiquidity), 0)
            .unwrap();
        let id = market.id;
        registry.insert(market);
        registry
            .transition(id, MarketStatus::Closed, None, 0)
            .unwrap();

        assert!(registry
            .transition(id, MarketStatus::Resolved, Some(7), 0)
            .is_err());
        assert!(registry
            .transition(id, MarketStatus::Resolved, None, 0)
            .is_err());
        registry
            .transition(id, MarketStatus::Resolved, Some(0), 0)
            .unwrap();
    }
}
