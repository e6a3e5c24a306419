use crate::{OrderBookManager, lmsr};
use hashmark_state::{Market, MarkRecord};
use hashmark_types::{LiquidityRegime, MarketId, MarkSource, round_price};
use std::collections::HashMap;

/// Canonical per-(market, outcome) reference price.
///
/// Recomputed after every matcher or curve state change with a fixed
/// precedence: LMSR curve for thin markets, then book mid, then the most
/// recent fill, then the market's creation odds. Every update gets a
/// per-market monotone sequence number.
#[derive(Debug, Clone, Default)]
pub struct MarkOracle {
    marks: HashMap<(MarketId, u16), MarkRecord>,
    sequences: HashMap<MarketId, u64>,
    last_fill: HashMap<(MarketId, u16), u8>,
}

impl MarkOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the most recent fill price for the CLOB_LAST_FILL tier.
    pub fn note_fill(&mut self, market_id: MarketId, outcome: u16, price_cents: u8) {
        self.last_fill.insert((market_id, outcome), price_cents);
    }

    /// Recompute the mark for one (market, outcome). The caller publishes
    /// the returned record on the bus before yielding control.
    pub fn recompute(
        &mut self,
        market: &Market,
        books: &OrderBookManager,
        outcome: u16,
        now_ms: i64,
    ) -> MarkRecord {
        let (price, source) = self.resolve(market, books, outcome);

        let sequence = self.sequences.entry(market.id).or_insert(0);
        *sequence += 1;

        let record = MarkRecord {
            price: round_price(price),
            source,
            at_ms: now_ms,
            sequence: *sequence,
        };
        self.marks.insert((market.id, outcome), record.clone());
        record
    }

    fn resolve(
        &self,
        market: &Market,
        books: &OrderBookManager,
        outcome: u16,
    ) -> (f64, MarkSource) {
        if market.regime == LiquidityRegime::LowLiquidity {
            if let Some(curve) = &market.curve {
                return (lmsr::price_of(curve, outcome), MarkSource::LmsrCurve);
            }
        }

        let best_bid = books.best_bid(market.id, outcome);
        let best_ask = books.best_ask(market.id, outcome);
        if let (Some(bid), Some(ask)) = (best_bid, best_ask) {
            return ((bid as f64 + ask as f64) / 200.0, MarkSource::ClobMid);
        }

        if let Some(last) = self.last_fill.get(&(market.id, outcome)) {
            return (*last as f64 / 100.0, MarkSource::ClobLastFill);
        }

        (self.initial_price(market, outcome), MarkSource::Initial)
    }

    fn initial_price(&self, market: &Market, outcome: u16) -> f64 {
        market
            .initial_odds
            .get(outcome as usize)
            .copied()
            .unwrap_or(1.0 / market.outcomes.len().max(1) as f64)
    }

    /// Latest recorded mark, if any.
    pub fn get(&self, market_id: MarketId, outcome: u16) -> Option<&MarkRecord> {
        self.marks.get(&(market_id, outcome))
    }

    /// Latest mark price, falling back to the creation odds when the
    /// pair has never been marked.
    pub fn price_or_initial(&self, market: &Market, outcome: u16) -> f64 {
        self.marks
            .get(&(market.id, outcome))
            .map(|m| m.price)
            .unwrap_or_else(|| self.initial_price(market, outcome))
    }

    pub fn sequence(&self, market_id: MarketId) -> u64 {
        self.sequences.get(&market_id).copied().unwrap_or(0)
    }

    pub fn entries(&self) -> Vec<((MarketId, u16), MarkRecord)> {
        let mut entries: Vec<_> = self
            .marks
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        entries.sort_by_key(|((m, o), _)| (*m, *o));
        entries
    }

    pub fn sequence_entries(&self) -> Vec<(MarketId, u64)> {
        let mut entries: Vec<_> = self.sequences.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort();
        entries
    }

    /// Rebuild from snapshot parts. The engine calls [`Self::resync`]
    /// for every pair afterwards so no restored mark can be stale.
    pub fn restore_with_marks(
        marks: impl IntoIterator<Item = ((MarketId, u16), MarkRecord)>,
        last_fills: impl IntoIterator<Item = ((MarketId, u16), u8)>,
        sequences: impl IntoIterator<Item = (MarketId, u64)>,
    ) -> Self {
        Self {
            marks: marks.into_iter().collect(),
            last_fill: last_fills.into_iter().collect(),
            sequences: sequences.into_iter().collect(),
        }
    }

    /// Recompute a pair's mark only if the restored record no longer
    /// matches what the books and curves imply; an unchanged mark keeps
    /// its sequence number so a snapshot round-trip is an identity.
    pub fn resync(
        &mut self,
        market: &Market,
        books: &OrderBookManager,
        outcome: u16,
        now_ms: i64,
    ) {
        let (price, source) = self.resolve(market, books, outcome);
        let price = round_price(price);
        let fresh = self
            .marks
            .get(&(market.id, outcome))
            .is_some_and(|m| m.price == price && m.source == source);
        if !fresh {
            self.recompute(market, books, outcome, now_ms);
        }
    }
}
