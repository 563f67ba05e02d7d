//! Outbound value transfer collaborator.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use custody_core::{Amount, OwnerId};

use crate::ledger::AccountLedger;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReleaseError {
    /// The recipient refused the transfer.
    #[error("recipient {recipient} rejected the transfer")]
    Rejected { recipient: OwnerId },

    /// The releasing mechanism could not deliver funds.
    #[error("value release unavailable: {0}")]
    Unavailable(String),
}

/// Moves value out of custody to a recipient.
///
/// Called by `AccountLedger::withdraw` after the ledger has already debited
/// the owner. `ledger` is that post-debit state, so anything the
/// implementation observes (or hands to a recipient) already reflects the
/// withdrawal. Returning an error makes the ledger undo the whole withdrawal.
pub trait ValueRelease {
    fn release(
        &mut self,
        ledger: &AccountLedger,
        recipient: OwnerId,
        amount: Amount,
    ) -> Result<(), ReleaseError>;
}

/// In-memory payout recorder.
///
/// Accumulates everything released per recipient and refuses recipients on
/// its reject list.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTreasury {
    paid_out: HashMap<OwnerId, Amount>,
    rejecting: HashSet<OwnerId>,
    releases: u64,
}

impl InMemoryTreasury {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every future release to `recipient`.
    pub fn reject(&mut self, recipient: OwnerId) {
        self.rejecting.insert(recipient);
    }

    /// Total released to `recipient` so far.
    pub fn paid_to(&self, recipient: OwnerId) -> Amount {
        self.paid_out.get(&recipient).copied().unwrap_or(Amount::ZERO)
    }

    pub fn total_paid(&self) -> Amount {
        self.paid_out.values().copied().sum()
    }

    /// Number of successful releases.
    pub fn releases(&self) -> u64 {
        self.releases
    }
}

impl ValueRelease for InMemoryTreasury {
    fn release(
        &mut self,
        _ledger: &AccountLedger,
        recipient: OwnerId,
        amount: Amount,
    ) -> Result<(), ReleaseError> {
        if self.rejecting.contains(&recipient) {
            return Err(ReleaseError::Rejected { recipient });
        }

        let paid = self.paid_out.entry(recipient).or_insert(Amount::ZERO);
        *paid = paid.checked_add(amount).ok_or_else(|| {
            ReleaseError::Unavailable(format!("payout counter overflow for {recipient}"))
        })?;
        self.releases += 1;
        Ok(())
    }
}
