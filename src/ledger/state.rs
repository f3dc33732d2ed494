use std::collections::BTreeMap;

use crate::access::RoleRegistry;
use crate::address::Address;
use crate::error::{LedgerError, LedgerResult};
use crate::fee::FeeConfig;
use crate::logging::digest_hex;

/// Everything the ledger owns. Custody balance is deliberately absent: it is
/// always read from the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerState {
    pub(crate) allocations: BTreeMap<Address, u128>,
    pub(crate) total_allocated: u128,
    pub(crate) fee: FeeConfig,
    pub(crate) roles: RoleRegistry,
    /// Count of committed mutating calls.
    pub(crate) seq: u64,
}

impl LedgerState {
    pub fn new(admin: Address, fee: FeeConfig) -> Self {
        Self {
            allocations: BTreeMap::new(),
            total_allocated: 0,
            fee,
            roles: RoleRegistry::bootstrap(admin),
            seq: 0,
        }
    }

    pub fn allocation(&self, account: Address) -> u128 {
        self.allocations.get(&account).copied().unwrap_or(0)
    }

    pub fn allocations(&self) -> &BTreeMap<Address, u128> {
        &self.allocations
    }

    pub fn total_allocated(&self) -> u128 {
        self.total_allocated
    }

    pub fn fee(&self) -> &FeeConfig {
        &self.fee
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Computes every post-credit value first and only then writes, so an
    /// overflow anywhere leaves the state untouched.
    pub(crate) fn apply_credits(&mut self, credits: &[(Address, u128)]) -> LedgerResult<()> {
        let mut staged: BTreeMap<Address, u128> = BTreeMap::new();
        let mut total = self.total_allocated;
        for (account, amount) in credits {
            let current = match staged.get(account) {
                Some(v) => *v,
                None => self.allocation(*account),
            };
            let next = current.checked_add(*amount).ok_or(LedgerError::ArithmeticOverflow)?;
            total = total.checked_add(*amount).ok_or(LedgerError::ArithmeticOverflow)?;
            staged.insert(*account, next);
        }
        self.allocations.extend(staged);
        self.total_allocated = total;
        Ok(())
    }

    /// Zeroes the entry and returns what it held. The entry is kept.
    pub(crate) fn settle(&mut self, account: Address) -> LedgerResult<u128> {
        let amount = self.allocation(account);
        if amount == 0 {
            return Err(LedgerError::NothingToClaim);
        }
        let total = self
            .total_allocated
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InvariantViolation("allocation exceeds total".to_string()))?;
        self.allocations.insert(account, 0);
        self.total_allocated = total;
        Ok(amount)
    }

    /// Inverse of [`settle`](Self::settle), used when the payout fails.
    pub(crate) fn restore(&mut self, account: Address, amount: u128) {
        self.allocations.insert(account, amount);
        self.total_allocated += amount;
    }

    /// SHA-256 over the canonical rendering: allocations in address order,
    /// total and fee policy.
    pub fn hash(&self) -> String {
        let mut canonical = String::new();
        for (account, amount) in &self.allocations {
            canonical.push_str(&format!("{}={};", account, amount));
        }
        canonical.push_str(&format!(
            "total={};fee={}/{}->{}",
            self.total_allocated,
            self.fee.numerator(),
            self.fee.denominator(),
            self.fee.recipient()
        ));
        digest_hex(canonical.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> LedgerState {
        let admin = Address::from_low_u64(1);
        LedgerState::new(admin, FeeConfig::default_for(admin).unwrap())
    }

    #[test]
    fn test_credits_accumulate_per_account() {
        let mut s = state();
        let a = Address::from_low_u64(5);
        s.apply_credits(&[(a, 10), (a, 5)]).unwrap();
        assert_eq!(s.allocation(a), 15);
        assert_eq!(s.total_allocated(), 15);
    }

    #[test]
    fn test_overflowing_credit_changes_nothing() {
        let mut s = state();
        let a = Address::from_low_u64(5);
        let b = Address::from_low_u64(6);
        s.apply_credits(&[(a, 10)]).unwrap();
        let before = s.clone();
        assert_eq!(
            s.apply_credits(&[(b, 1), (a, u128::MAX)]),
            Err(LedgerError::ArithmeticOverflow)
        );
        assert_eq!(s, before);
    }

    #[test]
    fn test_settle_keeps_zero_entry() {
        let mut s = state();
        let a = Address::from_low_u64(5);
        s.apply_credits(&[(a, 10)]).unwrap();
        assert_eq!(s.settle(a), Ok(10));
        assert_eq!(s.allocations().get(&a), Some(&0));
        assert_eq!(s.total_allocated(), 0);
        assert_eq!(s.settle(a), Err(LedgerError::NothingToClaim));
    }

    #[test]
    fn test_hash_tracks_state() {
        let mut s = state();
        let h0 = s.hash();
        assert_eq!(h0, state().hash());
        s.seq += 1;
        assert_eq!(s.hash(), h0);
        s.apply_credits(&[(Address::from_low_u64(5), 1)]).unwrap();
        assert_ne!(s.hash(), h0);
    }
}
