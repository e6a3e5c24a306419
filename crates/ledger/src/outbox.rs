use crate::{Effect, LedgerError, LedgerPort, Receipt};
use hashmark_types::EventId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BASE_BACKOFF_MS: i64 = 250;
const MAX_BACKOFF_MS: i64 = 60_000;

/// One recorded side effect awaiting delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRow {
    pub event_id: EventId,
    pub effect: Effect,
    pub attempts: u32,
    /// Earliest time the next attempt may run
    pub next_attempt_at_ms: i64,
}

/// Result of attempting one row during a dispatch pass.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Delivered { event_id: EventId, receipt: Receipt },
    /// Retries exhausted; the row is parked for reconciliation
    Exhausted { event_id: EventId, error: LedgerError },
}

/// Transactional outbox for ledger effects.
///
/// Rows are recorded inside the engine's critical section and dispatched
/// outside it. Delivery is at-least-once: the port deduplicates by event
/// id. Transient failures back off exponentially with jitter; exhausted
/// rows move to the parked list and stay in the snapshot so retries
/// survive a restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Outbox {
    pending: VecDeque<EffectRow>,
    parked: Vec<EffectRow>,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            parked: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Record an effect row. Called inside the critical section; never
    /// touches the network.
    pub fn record(&mut self, event_id: EventId, effect: Effect) {
        self.pending.push_back(EffectRow {
            event_id,
            effect,
            attempts: 0,
            next_attempt_at_ms: 0,
        });
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn parked_len(&self) -> usize {
        self.parked.len()
    }

    /// Attempt delivery of every due row. Called outside the critical
    /// section; rows that fail transiently are re-queued with backoff.
    pub fn dispatch(&mut self, port: &dyn LedgerPort, now_ms: i64) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::new();
        let mut retry = VecDeque::new();

        while let Some(mut row) = self.pending.pop_front() {
            if row.next_attempt_at_ms > now_ms {
                retry.push_back(row);
                continue;
            }

            match port.apply(row.event_id, &row.effect) {
                Ok(receipt) => {
                    outcomes.push(DispatchOutcome::Delivered {
                        event_id: row.event_id,
                        receipt,
                    });
                }
                Err(error) if error.is_retryable() && row.attempts + 1 < self.max_attempts => {
                    row.attempts += 1;
                    row.next_attempt_at_ms = now_ms + backoff_ms(row.attempts);
                    tracing::debug!(
                        event_id = %row.event_id,
                        attempts = row.attempts,
                        "ledger effect deferred: {error}"
                    );
                    retry.push_back(row);
                }
                Err(error) => {
                    tracing::error!(
                        event_id = %row.event_id,
                        attempts = row.attempts + 1,
                        "ledger effect exhausted retries: {error}"
                    );
                    let event_id = row.event_id;
                    self.parked.push(row);
                    outcomes.push(DispatchOutcome::Exhausted { event_id, error });
                }
            }
        }

        self.pending = retry;
        outcomes
    }

    /// Move parked rows back into the pending queue (operator-driven
    /// reconciliation, also run once after a restore).
    pub fn requeue_parked(&mut self) {
        for mut row in self.parked.drain(..) {
            row.attempts = 0;
            row.next_attempt_at_ms = 0;
            self.pending.push_back(row);
        }
    }
}

/// Exponential backoff with up to 25% decorrelating jitter.
fn backoff_ms(attempts: u32) -> i64 {
    let exp = DEFAULT_BASE_BACKOFF_MS.saturating_mul(1i64 << attempts.min(16)) / 2;
    let capped = exp.min(MAX_BACKOFF_MS);
    capped + fastrand::i64(0..=capped / 4)
}
