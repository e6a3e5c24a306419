use crate::LedgerError;
use hashmark_types::{AccountId, EventId, Tinybars};
use serde::{Deserialize, Serialize};

/// Acknowledgement returned by the ledger for an accepted effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    /// Idempotency key the effect was submitted under
    pub event_id: EventId,
    /// Ledger-assigned consensus sequence
    pub sequence: u64,
    /// Consensus timestamp, milliseconds since the Unix epoch
    pub consensus_at_ms: i64,
}

/// A side effect destined for the distributed ledger.
///
/// Rows are written inside the engine's critical section and dispatched
/// outside it, so the engine never blocks on the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Effect {
    /// Publish an opaque JSON payload to a consensus topic
    SubmitMessage {
        topic_id: String,
        payload: serde_json::Value,
    },
    /// Move value between ledger accounts
    Transfer {
        from: AccountId,
        to: AccountId,
        amount: Tinybars,
    },
}

/// Outbound dependency on the Hedera-like ledger.
///
/// Implementations must be idempotent on retry: a second call with an
/// already-seen `event_id` acknowledges without re-applying the effect.
pub trait LedgerPort: Send + Sync {
    /// Persist and acknowledge an opaque message on a consensus topic.
    fn submit_message(
        &self,
        event_id: EventId,
        topic_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Receipt, LedgerError>;

    /// Move value between accounts.
    fn transfer(
        &self,
        event_id: EventId,
        from: &AccountId,
        to: &AccountId,
        amount: Tinybars,
    ) -> Result<Receipt, LedgerError>;

    /// Dispatch a recorded effect row.
    fn apply(&self, event_id: EventId, effect: &Effect) -> Result<Receipt, LedgerError> {
        match effect {
            Effect::SubmitMessage { topic_id, payload } => {
                self.submit_message(event_id, topic_id, payload)
            }
            Effect::Transfer { from, to, amount } => self.transfer(event_id, from, to, *amount),
        }
    }
}
