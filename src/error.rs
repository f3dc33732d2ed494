use thiserror::Error;

use crate::access::Role;
use crate::address::Address;

/// Coarse classification used by operator tooling to decide what to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    ExternalTransfer,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Authorization => "authorization",
            ErrorKind::State => "state",
            ErrorKind::ExternalTransfer => "external_transfer",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Every ledger call either commits fully or returns one of these with no
/// observable mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("amount must be greater than 0")]
    InvalidAmount,
    #[error("mismatched arrays: {recipients} recipients, {amounts} amounts")]
    LengthMismatch { recipients: usize, amounts: usize },
    #[error("denominator cannot be zero")]
    DenominatorZero,
    #[error("fee exceeds limit (max 10%): {numerator}/{denominator}")]
    FeeTooHigh { numerator: u128, denominator: u128 },
    #[error("invalid recipient")]
    InvalidRecipient,
    #[error("the holding account cannot deposit into itself")]
    HolderDeposit,
    #[error("account {account} is missing role {role}")]
    Unauthorized { account: Address, role: Role },
    #[error("insufficient unallocated balance: required {required}, available {available}")]
    InsufficientUnallocated { required: u128, available: u128 },
    #[error("no allocation to claim")]
    NothingToClaim,
    #[error("token transfer failed: {0}")]
    TransferFailed(#[from] TransferError),
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount
            | LedgerError::LengthMismatch { .. }
            | LedgerError::DenominatorZero
            | LedgerError::FeeTooHigh { .. }
            | LedgerError::InvalidRecipient
            | LedgerError::HolderDeposit => ErrorKind::Validation,
            LedgerError::Unauthorized { .. } => ErrorKind::Authorization,
            LedgerError::InsufficientUnallocated { .. } | LedgerError::NothingToClaim => {
                ErrorKind::State
            }
            LedgerError::TransferFailed(_) => ErrorKind::ExternalTransfer,
            LedgerError::ArithmeticOverflow | LedgerError::InvariantViolation(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Stable snake_case tag for logs.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount => "invalid_amount",
            LedgerError::LengthMismatch { .. } => "length_mismatch",
            LedgerError::DenominatorZero => "denominator_zero",
            LedgerError::FeeTooHigh { .. } => "fee_too_high",
            LedgerError::InvalidRecipient => "invalid_recipient",
            LedgerError::HolderDeposit => "holder_deposit",
            LedgerError::Unauthorized { .. } => "unauthorized",
            LedgerError::InsufficientUnallocated { .. } => "insufficient_unallocated",
            LedgerError::NothingToClaim => "nothing_to_claim",
            LedgerError::TransferFailed(_) => "transfer_failed",
            LedgerError::ArithmeticOverflow => "arithmetic_overflow",
            LedgerError::InvariantViolation(_) => "invariant_violation",
        }
    }
}

/// Failure of the underlying token pull/push.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("insufficient allowance: {spender} may pull {allowed} from {owner}, requested {requested}")]
    InsufficientAllowance {
        owner: Address,
        spender: Address,
        allowed: u128,
        requested: u128,
    },
    #[error("insufficient balance: {holder} holds {balance}, requested {requested}")]
    InsufficientBalance {
        holder: Address,
        balance: u128,
        requested: u128,
    },
    #[error("balance overflow crediting {0}")]
    Overflow(Address),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
