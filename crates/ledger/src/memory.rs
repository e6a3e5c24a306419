use crate::{LedgerError, LedgerPort, Receipt};
use hashmark_types::{AccountId, EventId, Tinybars};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// A message accepted by the in-memory ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedMessage {
    pub event_id: EventId,
    pub topic_id: String,
    pub payload: serde_json::Value,
}

/// An accepted value transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedTransfer {
    pub event_id: EventId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Tinybars,
}

#[derive(Default)]
struct Inner {
    messages: Vec<SubmittedMessage>,
    transfers: Vec<AppliedTransfer>,
    balances: HashMap<AccountId, Tinybars>,
    receipts: HashMap<EventId, Receipt>,
    sequence: u64,
}

/// Deterministic in-memory ledger for tests and local runs.
///
/// Idempotent by event id: a retried submission returns the original
/// receipt without recording the effect twice. Transient failures can be
/// injected with [`fail_next`](Self::fail_next) to exercise outbox retry.
#[derive(Default)]
pub struct InMemoryLedger {
    inner: Mutex<Inner>,
    fail_next: AtomicU32,
    /// When set, transfers that would overdraw a tracked account are
    /// rejected instead of driving the balance negative.
    strict_balances: bool,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strict() -> Self {
        Self {
            strict_balances: true,
            ..Self::default()
        }
    }

    /// Fail the next `n` calls with a network error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Seed a ledger account balance (strict mode bookkeeping).
    pub fn credit(&self, account: &AccountId, amount: Tinybars) {
        let mut inner = self.inner.lock().unwrap();
        *inner.balances.entry(account.clone()).or_insert(0) += amount;
    }

    pub fn balance(&self, account: &AccountId) -> Tinybars {
        let inner = self.inner.lock().unwrap();
        inner.balances.get(account).copied().unwrap_or(0)
    }

    pub fn messages(&self) -> Vec<SubmittedMessage> {
        self.inner.lock().unwrap().messages.clone()
    }

    pub fn transfers(&self) -> Vec<AppliedTransfer> {
        self.inner.lock().unwrap().transfers.clone()
    }

    fn take_injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn next_receipt(inner: &mut Inner, event_id: EventId) -> Receipt {
        inner.sequence += 1;
        let receipt = Receipt {
            event_id,
            sequence: inner.sequence,
            // Deterministic: the sequence doubles as consensus time
            consensus_at_ms: inner.sequence as i64,
        };
        inner.receipts.insert(event_id, receipt.clone());
        receipt
    }
}

impl LedgerPort for InMemoryLedger {
    fn submit_message(
        &self,
        event_id: EventId,
        topic_id: &str,
        payload: &serde_json::Value,
    ) -> Result<Receipt, LedgerError> {
        if self.take_injected_failure() {
            return Err(LedgerError::NetworkError("injected failure".into()));
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(receipt) = inner.receipts.get(&event_id) {
            return Ok(receipt.clone());
        }

        inner.messages.push(SubmittedMessage {
            event_id,
            topic_id: topic_id.to_string(),
            payload: payload.clone(),
        });
        Ok(Self::next_receipt(&mut inner, event_id))
    }

    fn transfer(
        &self,
        event_id: EventId,
        from: &AccountId,
        to: &AccountId,
        amount: Tinybars,
    ) -> Result<Receipt, LedgerError> {
        if self.take_injected_failure() {
            return Err(LedgerError::NetworkError("injected failure".into()));
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(receipt) = inner.receipts.get(&event_id) {
            return Ok(receipt.clone());
        }

        let from_balance = inner.balances.get(from).copied().unwrap_or(0);
        if self.strict_balances && from_balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }

        *inner.balances.entry(from.clone()).or_insert(0) -= amount;
        *inner.balances.entry(to.clone()).or_insert(0) += amount;
        inner.transfers.push(AppliedTransfer {
            event_id,
            from: from.clone(),
            to: to.clone(),
            amount,
        });
        Ok(Self::next_receipt(&mut inner, event_id))
    }
}
