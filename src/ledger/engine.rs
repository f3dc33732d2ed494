//! Authoritative ledger: custody-backed allocations with a fee skim on batch
//! credits.
//!
//! Every mutating method takes the calling account explicitly and either
//! commits fully (state updated, notifications appended) or returns an error
//! with nothing changed. The engine itself is single-threaded; concurrent
//! callers go through [`crate::ledger::actor::LedgerHandle`].

use crate::access::Role;
use crate::address::Address;
use crate::custody::TokenCustody;
use crate::error::{LedgerError, LedgerResult};
use crate::fee::FeeConfig;
use crate::ledger::events::{log_event, LedgerEvent};
use crate::ledger::invariants::{assert_custody_covers, assert_ledger_invariants};
use crate::ledger::state::LedgerState;
use crate::logging::{log_audit, log_rejected, ts_epoch_secs, Domain};
use crate::status::LedgerStatus;

/// Amounts the ledger computed for a committed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReceipt {
    pub hut_total: u128,
    pub fee: u128,
    pub total_required: u128,
}

pub struct LedgerEngine<C> {
    holder: Address,
    custody: C,
    state: LedgerState,
    events: Vec<LedgerEvent>,
}

impl<C: TokenCustody> LedgerEngine<C> {
    /// `admin` receives ADMIN, OPERATOR and CONFIG. `holder` is the token
    /// account whose balance is the custody balance.
    pub fn new(admin: Address, holder: Address, custody: C, fee: FeeConfig) -> Self {
        Self {
            holder,
            custody,
            state: LedgerState::new(admin, fee),
            events: Vec::new(),
        }
    }

    /// Bootstrap with the default 1/18 fee routed to `admin`.
    pub fn with_default_fee(admin: Address, holder: Address, custody: C) -> LedgerResult<Self> {
        Ok(Self::new(admin, holder, custody, FeeConfig::default_for(admin)?))
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    pub fn deposit(&mut self, caller: Address, amount: u128) -> LedgerResult<()> {
        let result = self.try_deposit(caller, amount);
        self.finish("deposit", caller, Domain::Ledger, result)
    }

    fn try_deposit(&mut self, caller: Address, amount: u128) -> LedgerResult<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        if caller == self.holder {
            return Err(LedgerError::HolderDeposit);
        }
        self.custody.transfer_from(self.holder, caller, self.holder, amount)?;
        self.commit(vec![LedgerEvent::Deposited { from: caller, amount, ts: ts_epoch_secs() }]);
        Ok(())
    }

    /// Single credit. Never skims a fee.
    pub fn allocate(&mut self, caller: Address, recipient: Address, amount: u128) -> LedgerResult<()> {
        let result = self.try_allocate(caller, recipient, amount);
        self.finish("allocate", caller, Domain::Ledger, result)
    }

    fn try_allocate(&mut self, caller: Address, recipient: Address, amount: u128) -> LedgerResult<()> {
        self.state.roles.require(Role::Operator, caller)?;
        let available = self.unallocated()?;
        if amount > available {
            return Err(LedgerError::InsufficientUnallocated { required: amount, available });
        }
        self.state.apply_credits(&[(recipient, amount)])?;
        self.commit(vec![LedgerEvent::Allocated { recipient, amount, ts: ts_epoch_secs() }]);
        Ok(())
    }

    /// Credits every pair, then credits `fee(sum)` to the fee recipient. All
    /// or nothing.
    pub fn batch_allocate(
        &mut self,
        caller: Address,
        recipients: &[Address],
        amounts: &[u128],
    ) -> LedgerResult<BatchReceipt> {
        let result = self.try_batch_allocate(caller, recipients, amounts);
        self.finish("batch_allocate", caller, Domain::Ledger, result)
    }

    fn try_batch_allocate(
        &mut self,
        caller: Address,
        recipients: &[Address],
        amounts: &[u128],
    ) -> LedgerResult<BatchReceipt> {
        self.state.roles.require(Role::Operator, caller)?;
        let receipt = batch_requirement(self.state.fee(), recipients, amounts)?;
        let available = self.unallocated()?;
        if receipt.total_required > available {
            return Err(LedgerError::InsufficientUnallocated {
                required: receipt.total_required,
                available,
            });
        }

        let fee_recipient = self.state.fee().recipient();
        let mut credits: Vec<(Address, u128)> =
            recipients.iter().copied().zip(amounts.iter().copied()).collect();
        if receipt.fee > 0 {
            credits.push((fee_recipient, receipt.fee));
        }
        self.state.apply_credits(&credits)?;

        let ts = ts_epoch_secs();
        let mut events: Vec<LedgerEvent> = recipients
            .iter()
            .zip(amounts)
            .map(|(recipient, amount)| LedgerEvent::Allocated {
                recipient: *recipient,
                amount: *amount,
                ts,
            })
            .collect();
        if receipt.fee > 0 {
            events.push(LedgerEvent::FeeCollected { recipient: fee_recipient, amount: receipt.fee, ts });
        }
        self.commit(events);
        Ok(receipt)
    }

    /// Pays the caller's whole allocation. The entry is zeroed before the
    /// payout is issued; a failed payout restores it.
    pub fn withdraw(&mut self, caller: Address) -> LedgerResult<u128> {
        let result = self.try_withdraw(caller);
        self.finish("withdraw", caller, Domain::Ledger, result)
    }

    fn try_withdraw(&mut self, caller: Address) -> LedgerResult<u128> {
        let amount = self.state.settle(caller)?;
        if self.state.allocation(caller) != 0 {
            self.state.restore(caller, amount);
            return Err(LedgerError::InvariantViolation(
                "allocation not zeroed before payout".to_string(),
            ));
        }
        if let Err(err) = self.custody.transfer(self.holder, caller, amount) {
            self.state.restore(caller, amount);
            return Err(err.into());
        }
        self.commit(vec![LedgerEvent::Claimed { recipient: caller, amount, ts: ts_epoch_secs() }]);
        Ok(amount)
    }

    pub fn set_fee_config(
        &mut self,
        caller: Address,
        numerator: u128,
        denominator: u128,
        recipient: Address,
    ) -> LedgerResult<()> {
        let result = self.try_set_fee_config(caller, numerator, denominator, recipient);
        self.finish("set_fee_config", caller, Domain::Fee, result)
    }

    fn try_set_fee_config(
        &mut self,
        caller: Address,
        numerator: u128,
        denominator: u128,
        recipient: Address,
    ) -> LedgerResult<()> {
        self.state.roles.require(Role::Config, caller)?;
        self.state.fee = FeeConfig::new(numerator, denominator, recipient)?;
        self.commit(vec![LedgerEvent::FeeConfigUpdated { numerator, denominator, recipient }]);
        Ok(())
    }

    pub fn grant_role(&mut self, caller: Address, role: Role, account: Address) -> LedgerResult<()> {
        let result = self
            .state
            .roles
            .grant_role(caller, role, account)
            .map(|changed| {
                let events = if changed {
                    vec![LedgerEvent::RoleGranted { role, account, sender: caller }]
                } else {
                    Vec::new()
                };
                self.commit(events);
            });
        self.finish("grant_role", caller, Domain::Access, result)
    }

    pub fn revoke_role(&mut self, caller: Address, role: Role, account: Address) -> LedgerResult<()> {
        let result = self
            .state
            .roles
            .revoke_role(caller, role, account)
            .map(|changed| {
                let events = if changed {
                    vec![LedgerEvent::RoleRevoked { role, account, sender: caller }]
                } else {
                    Vec::new()
                };
                self.commit(events);
            });
        self.finish("revoke_role", caller, Domain::Access, result)
    }

    /// Drops one of the caller's own roles. Never fails.
    pub fn renounce_role(&mut self, caller: Address, role: Role) {
        if self.state.roles.renounce_role(caller, role) {
            self.commit(vec![LedgerEvent::RoleRevoked { role, account: caller, sender: caller }]);
        }
        let _ = self.finish("renounce_role", caller, Domain::Access, Ok(()));
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn custody_balance(&self) -> u128 {
        self.custody.balance_of(self.holder)
    }

    /// CustodyBalance − TotalAllocated, read now.
    pub fn unallocated(&self) -> LedgerResult<u128> {
        assert_custody_covers(self.custody_balance(), self.state.total_allocated())
    }

    pub fn allocations(&self, account: Address) -> u128 {
        self.state.allocation(account)
    }

    pub fn total_allocated(&self) -> u128 {
        self.state.total_allocated()
    }

    pub fn fee_config(&self) -> &FeeConfig {
        self.state.fee()
    }

    pub fn fee_numerator(&self) -> u128 {
        self.state.fee().numerator()
    }

    pub fn fee_denominator(&self) -> u128 {
        self.state.fee().denominator()
    }

    pub fn fee_recipient(&self) -> Address {
        self.state.fee().recipient()
    }

    pub fn has_role(&self, role: Role, account: Address) -> bool {
        self.state.roles.has_role(role, account)
    }

    pub fn state(&self) -> &LedgerState {
        &self.state
    }

    pub fn state_hash(&self) -> String {
        self.state.hash()
    }

    /// Every notification committed so far, in commit order.
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn check_invariants(&self) -> LedgerResult<()> {
        assert_ledger_invariants(&self.state, self.custody_balance())
    }

    pub fn status(&self) -> LedgerResult<LedgerStatus> {
        let fee = self.state.fee();
        Ok(LedgerStatus {
            custody_balance: self.custody_balance(),
            total_allocated: self.state.total_allocated(),
            unallocated: self.unallocated()?,
            fee_numerator: fee.numerator(),
            fee_denominator: fee.denominator(),
            fee_recipient: fee.recipient(),
            fee_allocation: self.state.allocation(fee.recipient()),
        })
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// A call with nothing to report leaves `seq` alone.
    fn commit(&mut self, events: Vec<LedgerEvent>) {
        if events.is_empty() {
            return;
        }
        self.state.seq += 1;
        for event in &events {
            log_event(self.state.seq, event);
        }
        self.events.extend(events);
    }

    fn finish<T>(
        &self,
        op: &str,
        caller: Address,
        domain: Domain,
        result: LedgerResult<T>,
    ) -> LedgerResult<T> {
        match &result {
            Ok(_) => log_audit(op, self.state.seq(), &self.state.hash()),
            Err(err) => log_rejected(domain, op, &caller.to_string(), err.code(), &err.to_string()),
        }
        result
    }
}

/// Validates a batch and computes `sum`, `fee(sum)` and `sum + fee`.
///
/// Shared with the replica mirror so both apply identical arithmetic.
pub fn batch_requirement(
    fee: &FeeConfig,
    recipients: &[Address],
    amounts: &[u128],
) -> LedgerResult<BatchReceipt> {
    if recipients.len() != amounts.len() {
        return Err(LedgerError::LengthMismatch {
            recipients: recipients.len(),
            amounts: amounts.len(),
        });
    }
    credit_requirement(fee, amounts)
}

/// `sum + fee(sum)` for a list of credit amounts.
pub fn credit_requirement(fee: &FeeConfig, amounts: &[u128]) -> LedgerResult<BatchReceipt> {
    let mut hut_total: u128 = 0;
    for amount in amounts {
        hut_total = hut_total.checked_add(*amount).ok_or(LedgerError::ArithmeticOverflow)?;
    }
    let fee = fee.fee(hut_total)?;
    let total_required = hut_total.checked_add(fee).ok_or(LedgerError::ArithmeticOverflow)?;
    Ok(BatchReceipt { hut_total, fee, total_required })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::InMemoryToken;

    const ADMIN: u64 = 1;
    const HOLDER: u64 = 100;

    fn a(n: u64) -> Address {
        Address::from_low_u64(n)
    }

    fn engine() -> LedgerEngine<InMemoryToken> {
        LedgerEngine::with_default_fee(a(ADMIN), a(HOLDER), InMemoryToken::new()).unwrap()
    }

    fn funded(amount: u128) -> LedgerEngine<InMemoryToken> {
        let mut e = engine();
        e.custody.mint(a(ADMIN), amount).unwrap();
        e.custody.approve(a(ADMIN), a(HOLDER), amount);
        e.deposit(a(ADMIN), amount).unwrap();
        e
    }

    #[test]
    fn test_deposit_rejects_zero() {
        let mut e = engine();
        assert_eq!(e.deposit(a(2), 0), Err(LedgerError::InvalidAmount));
        assert!(e.events().is_empty());
    }

    #[test]
    fn test_deposit_without_allowance_fails() {
        let mut e = engine();
        e.custody.mint(a(2), 50).unwrap();
        let err = e.deposit(a(2), 50).unwrap_err();
        assert!(matches!(err, LedgerError::TransferFailed(_)));
        assert_eq!(e.custody_balance(), 0);
        assert!(e.events().is_empty());
    }

    #[test]
    fn test_holder_cannot_deposit_into_itself() {
        let mut e = funded(50);
        e.custody.approve(a(HOLDER), a(HOLDER), 50);
        assert_eq!(e.deposit(a(HOLDER), 50), Err(LedgerError::HolderDeposit));
        assert_eq!(e.custody_balance(), 50);
        assert_eq!(e.events().len(), 1);
    }

    #[test]
    fn test_deposit_emits_notification() {
        let e = funded(10_000);
        assert_eq!(e.custody_balance(), 10_000);
        assert!(matches!(
            e.events()[0],
            LedgerEvent::Deposited { amount: 10_000, .. }
        ));
    }

    #[test]
    fn test_allocate_checks_unallocated() {
        let mut e = funded(100);
        e.allocate(a(ADMIN), a(5), 60).unwrap();
        assert_eq!(
            e.allocate(a(ADMIN), a(6), 41),
            Err(LedgerError::InsufficientUnallocated { required: 41, available: 40 })
        );
        e.allocate(a(ADMIN), a(6), 40).unwrap();
        assert_eq!(e.unallocated(), Ok(0));
    }

    #[test]
    fn test_allocate_requires_operator() {
        let mut e = funded(100);
        assert_eq!(
            e.allocate(a(2), a(5), 1),
            Err(LedgerError::Unauthorized { account: a(2), role: Role::Operator })
        );
    }

    #[test]
    fn test_batch_length_mismatch() {
        let mut e = funded(100);
        assert_eq!(
            e.batch_allocate(a(ADMIN), &[a(5)], &[1, 2]),
            Err(LedgerError::LengthMismatch { recipients: 1, amounts: 2 })
        );
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut e = funded(100);
        let hash = e.state_hash();
        let seq = e.state().seq();
        let receipt = e.batch_allocate(a(ADMIN), &[], &[]).unwrap();
        assert_eq!(receipt, BatchReceipt { hut_total: 0, fee: 0, total_required: 0 });
        assert_eq!(e.total_allocated(), 0);
        assert_eq!(e.events().len(), 1);
        assert_eq!(e.state_hash(), hash);
        assert_eq!(e.state().seq(), seq);
    }

    #[test]
    fn test_fee_rounding_in_batch() {
        let mut e = funded(1000);
        e.set_fee_config(a(ADMIN), 1, 10, a(9)).unwrap();
        e.batch_allocate(a(ADMIN), &[a(5)], &[9]).unwrap();
        assert_eq!(e.allocations(a(5)), 9);
        assert_eq!(e.allocations(a(9)), 0);
        assert_eq!(e.total_allocated(), 9);
        e.batch_allocate(a(ADMIN), &[a(6)], &[10]).unwrap();
        assert_eq!(e.allocations(a(9)), 1);
        assert_eq!(e.total_allocated(), 20);
    }

    #[test]
    fn test_duplicate_recipients_accumulate() {
        let mut e = funded(1000);
        e.batch_allocate(a(ADMIN), &[a(5), a(5)], &[100, 200]).unwrap();
        assert_eq!(e.allocations(a(5)), 300);
        assert_eq!(e.allocations(a(ADMIN)), 16);
        e.check_invariants().unwrap();
    }

    #[test]
    fn test_withdraw_zeroes_then_pays() {
        let mut e = funded(5000);
        e.allocate(a(ADMIN), a(7), 5000).unwrap();
        assert_eq!(e.withdraw(a(7)), Ok(5000));
        assert_eq!(e.custody.balance_of(a(7)), 5000);
        assert_eq!(e.allocations(a(7)), 0);
        assert_eq!(e.total_allocated(), 0);
        assert_eq!(e.withdraw(a(7)), Err(LedgerError::NothingToClaim));
    }

    #[test]
    fn test_failed_payout_restores_allocation() {
        let mut e = funded(100);
        e.allocate(a(ADMIN), a(7), 100).unwrap();
        // Drain custody behind the ledger's back so the push fails.
        e.custody.transfer(a(HOLDER), a(99), 100).unwrap();
        let err = e.withdraw(a(7)).unwrap_err();
        assert!(matches!(err, LedgerError::TransferFailed(_)));
        assert_eq!(e.allocations(a(7)), 100);
        assert_eq!(e.total_allocated(), 100);
    }

    #[test]
    fn test_fee_config_gated_and_validated() {
        let mut e = engine();
        assert_eq!(
            e.set_fee_config(a(2), 1, 20, a(2)),
            Err(LedgerError::Unauthorized { account: a(2), role: Role::Config })
        );
        assert!(matches!(e.set_fee_config(a(ADMIN), 1, 8, a(2)), Err(LedgerError::FeeTooHigh { .. })));
        e.set_fee_config(a(ADMIN), 1, 20, a(2)).unwrap();
        assert_eq!(e.fee_numerator(), 1);
        assert_eq!(e.fee_denominator(), 20);
        assert_eq!(e.fee_recipient(), a(2));
        assert_eq!(
            e.events().last(),
            Some(&LedgerEvent::FeeConfigUpdated { numerator: 1, denominator: 20, recipient: a(2) })
        );
    }

    #[test]
    fn test_role_events_only_on_change() {
        let mut e = engine();
        e.grant_role(a(ADMIN), Role::Operator, a(3)).unwrap();
        let seq = e.state().seq();
        let hash = e.state_hash();
        e.grant_role(a(ADMIN), Role::Operator, a(3)).unwrap();
        assert_eq!(e.events().len(), 1);
        assert_eq!(e.state().seq(), seq);
        assert_eq!(e.state_hash(), hash);
        e.renounce_role(a(3), Role::Operator);
        assert!(!e.has_role(Role::Operator, a(3)));
        assert_eq!(e.events().len(), 2);
        let seq = e.state().seq();
        e.renounce_role(a(3), Role::Operator);
        assert_eq!(e.events().len(), 2);
        assert_eq!(e.state().seq(), seq);
    }

    #[test]
    fn test_failed_calls_leave_hash_unchanged() {
        let mut e = funded(1000);
        let before = e.state_hash();
        let _ = e.batch_allocate(a(ADMIN), &[a(5)], &[1000]);
        let _ = e.withdraw(a(5));
        let _ = e.allocate(a(2), a(5), 1);
        assert_eq!(e.state_hash(), before);
    }

    #[test]
    fn test_status_reading() {
        let mut e = funded(10_000);
        e.batch_allocate(a(ADMIN), &[a(5), a(6)], &[5000, 3000]).unwrap();
        let s = e.status().unwrap();
        assert_eq!(s.custody_balance, 10_000);
        assert_eq!(s.total_allocated, 8444);
        assert_eq!(s.unallocated, 1556);
        assert_eq!(s.fee_allocation, 444);
    }
}
