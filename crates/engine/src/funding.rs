use crate::constants::MAX_FUNDING_RATE;
use hashmark_state::FundingIndex;
use hashmark_types::{MarketId, Tinybars};
use std::collections::HashMap;

/// Cumulative funding indexes per (market, outcome).
///
/// The index advances by rate x mark each settlement; positions record
/// the index at open (and at every commit) so accrued funding is a
/// single subtraction.
#[derive(Debug, Clone, Default)]
pub struct FundingBook {
    indexes: HashMap<(MarketId, u16), FundingIndex>,
}

impl FundingBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self, market_id: MarketId, outcome: u16) -> FundingIndex {
        self.indexes
            .get(&(market_id, outcome))
            .copied()
            .unwrap_or_default()
    }

    pub fn cumulative(&self, market_id: MarketId, outcome: u16) -> f64 {
        self.index(market_id, outcome).cumulative
    }

    /// Advance one pair's index by rate x mark.
    pub fn advance(
        &mut self,
        market_id: MarketId,
        outcome: u16,
        rate: f64,
        mark: f64,
        now_ms: i64,
    ) -> FundingIndex {
        let entry = self.indexes.entry((market_id, outcome)).or_default();
        entry.cumulative += rate * mark;
        entry.last_updated_at_ms = now_ms;
        *entry
    }

    pub fn entries(&self) -> Vec<((MarketId, u16), FundingIndex)> {
        let mut entries: Vec<_> = self.indexes.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|((m, o), _)| (*m, *o));
        entries
    }

    pub fn restore(entries: impl IntoIterator<Item = ((MarketId, u16), FundingIndex)>) -> Self {
        Self {
            indexes: entries.into_iter().collect(),
        }
    }
}

/// Instantaneous funding rate from open-interest skew, clamped to
/// +/- 1% per interval. Positive when longs dominate (longs pay).
pub fn funding_rate(long_oi: Tinybars, short_oi: Tinybars) -> f64 {
    let total = long_oi + short_oi;
    if total <= 0 {
        return 0.0;
    }
    let skew = (long_oi - short_oi) as f64 / total as f64;
    (skew * MAX_FUNDING_RATE).clamp(-MAX_FUNDING_RATE, MAX_FUNDING_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_sign_follows_skew() {
        assert!(funding_rate(300, 100) > 0.0);
        assert!(funding_rate(100, 300) < 0.0);
        assert_eq!(funding_rate(100, 100), 0.0);
        assert_eq!(funding_rate(0, 0), 0.0);
    }

    #[test]
    fn test_rate_clamped_at_one_sided_interest() {
        assert_eq!(funding_rate(1_000, 0), MAX_FUNDING_RATE);
        assert_eq!(funding_rate(0, 1_000), -MAX_FUNDING_RATE);
    }

    #[test]
    fn test_index_advances_by_rate_times_mark() {
        let mut book = FundingBook::new();
        let market_id = MarketId::generate();
        book.advance(market_id, 0, 0.01, 0.5, 1_000);
        book.advance(market_id, 0, -0.002, 0.5, 2_000);

        let index = book.index(market_id, 0);
        assert!((index.cumulative - (0.005 - 0.001)).abs() < 1e-12);
        assert_eq!(index.last_updated_at_ms, 2_000);
    }
}
