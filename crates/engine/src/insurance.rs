use crate::EngineError;
use hashmark_state::InsuranceFund;
use hashmark_types::Tinybars;

/// Shared loss-absorption reserve.
///
/// Externally deposit/query only; debits happen exclusively inside the
/// liquidation cascade, which the crate-private `debit_up_to` enforces.
#[derive(Debug, Clone, Default)]
pub struct InsuranceFundManager {
    fund: InsuranceFund,
}

impl InsuranceFundManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self) -> Tinybars {
        self.fund.balance
    }

    pub fn fund(&self) -> InsuranceFund {
        self.fund
    }

    /// Returns (old balance, new balance).
    pub fn deposit(&mut self, amount: Tinybars) -> Result<(Tinybars, Tinybars), EngineError> {
        if amount <= 0 {
            return Err(EngineError::validation("insurance deposit must be positive"));
        }
        let old = self.fund.balance;
        self.fund.balance += amount;
        self.fund.total_deposits += amount;
        Ok((old, self.fund.balance))
    }

    /// Absorb up to `amount` of a liquidation deficit. The balance never
    /// goes negative; returns the part actually absorbed.
    pub(crate) fn debit_up_to(&mut self, amount: Tinybars) -> Tinybars {
        let absorbed = amount.clamp(0, self.fund.balance);
        self.fund.balance -= absorbed;
        self.fund.total_payouts += absorbed;
        absorbed
    }

    pub fn restore(fund: InsuranceFund) -> Self {
        Self { fund }
    }
}
