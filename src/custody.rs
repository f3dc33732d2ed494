//! Token custody boundary.
//!
//! The ledger never stores its own balance. It asks the custody
//! implementation for the holding account's balance, pulls deposits with
//! [`TokenCustody::transfer_from`] and pays claims with
//! [`TokenCustody::transfer`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::address::Address;
use crate::error::TransferError;
use crate::logging::{log, obj, v_amount, v_str, Domain, Level};

pub trait TokenCustody: Send {
    fn balance_of(&self, holder: Address) -> u128;

    /// Pull `amount` from `from` to `to`, spending `spender`'s allowance.
    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), TransferError>;

    /// Push `amount` from `from` to `to`.
    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<(), TransferError>;
}

/// Fungible token kept in memory. Used for tests, the demo binary and
/// non-production deposit simulation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToken {
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
    total_supply: u128,
}

impl InMemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, to: Address, amount: u128) -> Result<(), TransferError> {
        let supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(TransferError::Overflow(to))?;
        self.credit(to, amount)?;
        self.total_supply = supply;
        Ok(())
    }

    pub fn approve(&mut self, owner: Address, spender: Address, amount: u128) {
        self.allowances.insert((owner, spender), amount);
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> u128 {
        self.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    fn credit(&mut self, to: Address, amount: u128) -> Result<(), TransferError> {
        let bal = self.balances.entry(to).or_insert(0);
        *bal = bal.checked_add(amount).ok_or(TransferError::Overflow(to))?;
        Ok(())
    }

    fn move_balance(&mut self, from: Address, to: Address, amount: u128) -> Result<(), TransferError> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(TransferError::InsufficientBalance {
                holder: from,
                balance,
                requested: amount,
            });
        }
        if from != to {
            let to_balance = self.balance_of(to);
            if to_balance.checked_add(amount).is_none() {
                return Err(TransferError::Overflow(to));
            }
            self.balances.insert(from, balance - amount);
            self.balances.insert(to, to_balance + amount);
        }
        Ok(())
    }
}

impl TokenCustody for InMemoryToken {
    fn balance_of(&self, holder: Address) -> u128 {
        self.balances.get(&holder).copied().unwrap_or(0)
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(TransferError::InsufficientAllowance {
                owner: from,
                spender,
                allowed,
                requested: amount,
            });
        }
        self.move_balance(from, to, amount)?;
        self.allowances.insert((from, spender), allowed - amount);
        Ok(())
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<(), TransferError> {
        self.move_balance(from, to, amount)
    }
}

/// Token handle shared between a ledger (which owns one clone) and outside
/// parties that mint, approve and inspect balances.
#[derive(Debug, Clone, Default)]
pub struct SharedToken(Arc<Mutex<InMemoryToken>>);

impl SharedToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, InMemoryToken> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenCustody for SharedToken {
    fn balance_of(&self, holder: Address) -> u128 {
        self.lock().balance_of(holder)
    }

    fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: u128,
    ) -> Result<(), TransferError> {
        self.lock().transfer_from(spender, from, to, amount)
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<(), TransferError> {
        self.lock().transfer(from, to, amount)
    }
}

/// Mint-then-transfer on behalf of the payment aggregator, crediting the
/// ledger's holding account directly. Non-production only: no `Deposited`
/// notification is produced because the ledger is never called.
pub fn simulate_aggregator_deposit(
    token: &mut InMemoryToken,
    system: Address,
    holder: Address,
    amount: u128,
) -> Result<(), TransferError> {
    token.mint(system, amount)?;
    token.transfer(system, holder, amount)?;
    log(
        Level::Info,
        Domain::Custody,
        "aggregator_deposit_simulated",
        obj(&[
            ("system", v_str(&system.to_string())),
            ("holder", v_str(&holder.to_string())),
            ("amount", v_amount(amount)),
        ]),
    );
    Ok(())
}
