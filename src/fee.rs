use serde::Serialize;

use crate::address::Address;
use crate::error::{LedgerError, LedgerResult};

pub const DEFAULT_FEE_NUMERATOR: u128 = 1;
pub const DEFAULT_FEE_DENOMINATOR: u128 = 18;

/// Fee rate as a fraction plus the account that receives the skim.
///
/// Always holds `denominator > 0`, `numerator * 9 <= denominator` (rate at
/// most 10%), and a non-null recipient. The only way to build one is
/// [`FeeConfig::new`], which checks all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeConfig {
    #[serde(with = "crate::amount")]
    numerator: u128,
    #[serde(with = "crate::amount")]
    denominator: u128,
    recipient: Address,
}

impl FeeConfig {
    /// Validates in a fixed order: zero denominator, rate cap, recipient.
    pub fn new(numerator: u128, denominator: u128, recipient: Address) -> LedgerResult<Self> {
        if denominator == 0 {
            return Err(LedgerError::DenominatorZero);
        }
        let within_cap = numerator
            .checked_mul(9)
            .map(|scaled| scaled <= denominator)
            .unwrap_or(false);
        if !within_cap {
            return Err(LedgerError::FeeTooHigh { numerator, denominator });
        }
        if recipient.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        Ok(Self { numerator, denominator, recipient })
    }

    /// 1/18 routed to `recipient`.
    pub fn default_for(recipient: Address) -> LedgerResult<Self> {
        Self::new(DEFAULT_FEE_NUMERATOR, DEFAULT_FEE_DENOMINATOR, recipient)
    }

    pub fn numerator(&self) -> u128 {
        self.numerator
    }

    pub fn denominator(&self) -> u128 {
        self.denominator
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    /// `floor(amount * numerator / denominator)`. Truncates, never rounds.
    pub fn fee(&self, amount: u128) -> LedgerResult<u128> {
        amount
            .checked_mul(self.numerator)
            .map(|scaled| scaled / self.denominator)
            .ok_or(LedgerError::ArithmeticOverflow)
    }
}
