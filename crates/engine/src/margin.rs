use crate::EngineError;
use hashmark_state::MarginAccount;
use hashmark_types::{AccountId, Tinybars};
use std::collections::BTreeMap;

/// Per-account balance/locked ledger.
///
/// Operations are total over the account set: an unknown account
/// auto-creates at zero. `locked` is a lien on `balance`, never a
/// separate pool; withdrawal must leave `balance >= locked`.
#[derive(Debug, Clone, Default)]
pub struct MarginLedger {
    accounts: BTreeMap<AccountId, MarginAccount>,
}

impl MarginLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_mut(&mut self, account: &AccountId) -> &mut MarginAccount {
        self.accounts.entry(account.clone()).or_default()
    }

    pub fn get(&self, account: &AccountId) -> MarginAccount {
        self.accounts.get(account).copied().unwrap_or_default()
    }

    pub fn deposit(&mut self, account: &AccountId, amount: Tinybars) -> Result<Tinybars, EngineError> {
        if amount <= 0 {
            return Err(EngineError::validation("deposit amount must be positive"));
        }
        let entry = self.account_mut(account);
        entry.balance += amount;
        Ok(entry.balance)
    }

    pub fn withdraw(
        &mut self,
        account: &AccountId,
        amount: Tinybars,
    ) -> Result<Tinybars, EngineError> {
        if amount <= 0 {
            return Err(EngineError::validation("withdrawal amount must be positive"));
        }
        let entry = self.account_mut(account);
        if entry.balance - amount < entry.locked {
            return Err(EngineError::InsufficientFunds);
        }
        entry.balance -= amount;
        Ok(entry.balance)
    }

    /// Place a lien on part of the balance.
    pub fn lock(&mut self, account: &AccountId, amount: Tinybars) -> Result<(), EngineError> {
        if amount < 0 {
            return Err(EngineError::validation("lock amount must be non-negative"));
        }
        let entry = self.account_mut(account);
        if entry.available() < amount {
            return Err(EngineError::InsufficientMargin);
        }
        entry.locked += amount;
        Ok(())
    }

    /// Remove a lien. Releasing more than is locked is an invariant
    /// violation, never a caller error.
    pub fn release(&mut self, account: &AccountId, amount: Tinybars) -> Result<(), EngineError> {
        let entry = self.account_mut(account);
        if amount < 0 || entry.locked < amount {
            return Err(EngineError::Internal(format!(
                "release of {amount} exceeds locked {}",
                entry.locked
            )));
        }
        entry.locked -= amount;
        Ok(())
    }

    /// Unchecked credit (realized profit, funding receipt).
    pub fn credit(&mut self, account: &AccountId, amount: Tinybars) -> Tinybars {
        let entry = self.account_mut(account);
        entry.balance += amount;
        entry.balance
    }

    /// Settle one side of a fill: drop the lien taken at order placement
    /// and pay the (possibly smaller) fill-price amount out of balance.
    pub fn settle_fill(
        &mut self,
        account: &AccountId,
        release_amount: Tinybars,
        pay_amount: Tinybars,
    ) -> Result<(), EngineError> {
        let entry = self.account_mut(account);
        if release_amount < 0
            || pay_amount < 0
            || pay_amount > release_amount
            || entry.locked < release_amount
            || entry.balance < pay_amount
        {
            return Err(EngineError::Internal(format!(
                "fill settlement out of range: release {release_amount}, pay {pay_amount}"
            )));
        }
        entry.locked -= release_amount;
        entry.balance -= pay_amount;
        Ok(())
    }

    /// Debit up to `amount` from the unencumbered part of the balance.
    /// Liens held by other positions are never touched; returns the part
    /// actually debited, leaving the shortfall for the caller to absorb.
    pub fn debit_available(&mut self, account: &AccountId, amount: Tinybars) -> Tinybars {
        let entry = self.account_mut(account);
        let debited = amount.clamp(0, entry.available().max(0));
        entry.balance -= debited;
        debited
    }

    /// All accounts in id order (deterministic iteration for snapshots,
    /// conservation checks, and ADL's id-sorted account walk).
    pub fn entries(&self) -> impl Iterator<Item = (&AccountId, &MarginAccount)> {
        self.accounts.iter()
    }

    /// Total balance plus nothing double-counted: locked is a lien.
    pub fn total_balance(&self) -> Tinybars {
        self.accounts.values().map(|a| a.balance).sum()
    }

    pub fn restore(entries: impl IntoIterator<Item = (AccountId, MarginAccount)>) -> Self {
        Self {
            accounts: entries.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acct(id: &str) -> AccountId {
        AccountId::from(id)
    }

    #[test]
    fn test_unknown_account_is_zero() {
        let ledger = MarginLedger::new();
        assert_eq!(ledger.get(&acct("0.0.9999")), MarginAccount::default());
    }

    #[test]
    fn test_withdraw_respects_lock() {
        let mut ledger = MarginLedger::new();
        let account = acct("0.0.1001");
        ledger.deposit(&account, 1_000).unwrap();
        ledger.lock(&account, 600).unwrap();

        assert!(matches!(
            ledger.withdraw(&account, 500),
            Err(EngineError::InsufficientFunds)
        ));
        ledger.withdraw(&account, 400).unwrap();
        assert_eq!(ledger.get(&account).balance, 600);
    }

    #[test]
    fn test_lock_requires_available() {
        let mut ledger = MarginLedger::new();
        let account = acct("0.0.1001");
        ledger.deposit(&account, 100).unwrap();
        assert!(matches!(
            ledger.lock(&account, 101),
            Err(EngineError::InsufficientMargin)
        ));
    }

    #[test]
    fn test_debit_available_reports_shortfall() {
        let mut ledger = MarginLedger::new();
        let account = acct("0.0.1001");
        ledger.deposit(&account, 300).unwrap();

        let debited = ledger.debit_available(&account, 500);
        assert_eq!(debited, 300);
        assert_eq!(ledger.get(&account).balance, 0);
    }

    #[test]
    fn test_debit_available_never_touches_liens() {
        let mut ledger = MarginLedger::new();
        let account = acct("0.0.1001");
        ledger.deposit(&account, 300).unwrap();
        ledger.lock(&account, 200).unwrap();

        let debited = ledger.debit_available(&account, 500);
        assert_eq!(debited, 100);
        assert_eq!(ledger.get(&account).balance, 200);
        assert_eq!(ledger.get(&account).locked, 200);
    }

    #[test]
    fn test_release_beyond_locked_is_internal() {
        let mut ledger = MarginLedger::new();
        let account = acct("0.0.1001");
        ledger.deposit(&account, 100).unwrap();
        ledger.lock(&account, 50).unwrap();
        assert!(matches!(
            ledger.release(&account, 60),
            Err(EngineError::Internal(_))
        ));
    }
}
