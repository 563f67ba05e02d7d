//! Custody ledger: per-owner balances under a global cap and a per-withdrawal
//! limit.
//!
//! `AccountLedger` is the pure aggregate; `LedgerService` wraps it for shared,
//! multi-threaded use and forwards notifications to an event bus.

pub mod config;
pub mod error;
pub mod ledger;
pub mod release;
pub mod service;

pub use config::{ConfigError, LedgerConfig};
pub use error::{DepositError, LedgerError, WithdrawError};
pub use ledger::{
    AccountLedger, DepositFunds, Deposited, LedgerCommand, LedgerEvent, WithdrawFunds, Withdrawn,
};
pub use release::{InMemoryTreasury, ReleaseError, ValueRelease};
pub use service::{LedgerService, LedgerSnapshot, ServiceError};
