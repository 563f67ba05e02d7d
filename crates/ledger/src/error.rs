//! Rejection types for ledger operations.
//!
//! Every variant means the operation was refused and the ledger is exactly as
//! it was before the call.

use thiserror::Error;

use custody_core::Amount;

use crate::release::ReleaseError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DepositError {
    #[error("deposit amount must be greater than zero")]
    ZeroDeposit,

    #[error("deposit of {amount} would exceed bank cap {bank_cap} (currently held: {held_value})")]
    CapExceeded {
        held_value: Amount,
        bank_cap: Amount,
        amount: Amount,
    },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WithdrawError {
    #[error("withdrawal amount must be greater than zero")]
    ZeroWithdrawal,

    #[error("withdrawal of {amount} exceeds per-withdrawal limit {limit}")]
    WithdrawalLimitExceeded { limit: Amount, amount: Amount },

    #[error("insufficient balance: requested {amount}, available {available}")]
    InsufficientBalance { available: Amount, amount: Amount },

    #[error("value release failed")]
    TransferFailed(#[source] ReleaseError),
}

/// Error type of the ledger aggregate's `handle`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error(transparent)]
    Deposit(#[from] DepositError),

    #[error(transparent)]
    Withdraw(#[from] WithdrawError),
}
