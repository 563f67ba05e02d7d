//! `custody-core` — domain primitives for the custody ledger.
//!
//! Pure domain building blocks only (no IO, no locking, no logging).

pub mod aggregate;
pub mod amount;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot};
pub use amount::Amount;
pub use error::DomainError;
pub use id::{LedgerId, OwnerId};
