use crate::{
    FillRecord, FundingIndex, InsuranceFund, LiquidationEvent, MarginAccount, Market, MarkRecord,
    Order, Position, StateError,
};
use hashmark_ledger::Outbox;
use hashmark_types::{AccountId, MarketId};
use serde::{Deserialize, Serialize};

/// Current snapshot schema version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Mark record keyed by its (market, outcome) pair.
///
/// JSON object keys must be strings, so composite-keyed collections
/// serialize as entry lists and are re-indexed on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkEntry {
    pub market_id: MarketId,
    pub outcome: u16,
    #[serde(flatten)]
    pub record: MarkRecord,
}

/// Funding index keyed by its (market, outcome) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingEntry {
    pub market_id: MarketId,
    pub outcome: u16,
    #[serde(flatten)]
    pub index: FundingIndex,
}

/// Margin ledger entry for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginEntry {
    pub account: AccountId,
    pub margin: MarginAccount,
}

/// Per-market mark sequence counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub market_id: MarketId,
    pub sequence: u64,
}

/// Everything the matcher side owns: registry, books, fills, marks.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketsDomain {
    pub markets: Vec<Market>,
    pub orders: Vec<Order>,
    pub fills: Vec<FillRecord>,
    pub marks: Vec<MarkEntry>,
}

/// Everything the perpetuals side owns: balances, positions, funding,
/// the liquidation log.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivativesDomain {
    pub accounts: Vec<MarginEntry>,
    pub positions: Vec<Position>,
    pub funding: Vec<FundingEntry>,
    pub liquidations: Vec<LiquidationEvent>,
}

/// Insurance fund reserves.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InsuranceDomain {
    pub fund: InsuranceFund,
}

/// Cross-cutting coordination state: the pending ledger outbox and the
/// per-market mark sequence counters.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CoordinationDomain {
    pub outbox: Outbox,
    pub mark_sequences: Vec<SequenceEntry>,
}

/// One consistent serialization of the whole engine.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub markets: MarketsDomain,
    pub derivatives: DerivativesDomain,
    pub insurance: InsuranceDomain,
    pub coordination: CoordinationDomain,
}

impl EngineSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>, StateError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StateError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
