//! Thread-safe ledger façade.
//!
//! `LedgerService` serializes every operation on one `AccountLedger` behind a
//! single mutex, runs the value release while still holding it, and publishes
//! the resulting notifications to an `EventBus` once the change is committed.
//!
//! ```text
//! caller ─▶ lock ─▶ checks ─▶ effects ─▶ release ─▶ commit/rollback ─▶ publish ─▶ unlock
//! ```
//!
//! The release collaborator must not call back into the same service; it is
//! handed a read-only view of the ledger instead.

use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use custody_core::{Amount, LedgerId, OwnerId};
use custody_events::{EventBus, EventEnvelope};

use crate::config::LedgerConfig;
use crate::error::{DepositError, WithdrawError};
use crate::ledger::{AccountLedger, LedgerEvent};
use crate::release::ValueRelease;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Deposit(#[from] DepositError),

    #[error(transparent)]
    Withdraw(#[from] WithdrawError),

    /// A thread panicked while holding the ledger lock.
    #[error("ledger lock poisoned")]
    Poisoned,
}

/// Point-in-time copy of the ledger's aggregate counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub ledger_id: LedgerId,
    pub bank_cap: Amount,
    pub withdrawal_limit: Amount,
    pub held_value: Amount,
    pub deposit_count: u64,
    pub withdrawal_count: u64,
    pub owner_count: usize,
}

struct Inner<R> {
    ledger: AccountLedger,
    release: R,
    /// Sequence number of the last published envelope.
    published: u64,
}

pub struct LedgerService<B, R> {
    inner: Mutex<Inner<R>>,
    bus: B,
}

impl<B, R> LedgerService<B, R>
where
    B: EventBus<EventEnvelope<LedgerEvent>>,
    R: ValueRelease,
{
    pub fn new(ledger: AccountLedger, release: R, bus: B) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ledger,
                release,
                published: 0,
            }),
            bus,
        }
    }

    pub fn from_config(config: &LedgerConfig, release: R, bus: B) -> Self {
        Self::new(AccountLedger::from_config(config), release, bus)
    }

    #[tracing::instrument(skip_all, fields(owner = %owner, amount = %amount))]
    pub fn deposit(&self, owner: OwnerId, amount: Amount) -> Result<Amount, ServiceError> {
        let mut inner = self.lock()?;

        match inner.ledger.deposit(owner, amount) {
            Ok(new_balance) => {
                tracing::info!(%new_balance, held_value = %inner.ledger.held_value(), "deposit accepted");
                self.publish_pending(&mut inner);
                Ok(new_balance)
            }
            Err(err) => {
                tracing::warn!(error = %err, "deposit rejected");
                Err(err.into())
            }
        }
    }

    #[tracing::instrument(skip_all, fields(owner = %owner, amount = %amount))]
    pub fn withdraw(&self, owner: OwnerId, amount: Amount) -> Result<Amount, ServiceError> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;

        match inner.ledger.withdraw(owner, amount, &mut inner.release) {
            Ok(new_balance) => {
                tracing::info!(%new_balance, held_value = %inner.ledger.held_value(), "withdrawal released");
                self.publish_pending(inner);
                Ok(new_balance)
            }
            Err(WithdrawError::TransferFailed(reason)) => {
                tracing::warn!(%reason, "value release failed; withdrawal rolled back");
                Err(WithdrawError::TransferFailed(reason).into())
            }
            Err(err) => {
                tracing::warn!(error = %err, "withdrawal rejected");
                Err(err.into())
            }
        }
    }

    pub fn balance(&self, owner: OwnerId) -> Result<Amount, ServiceError> {
        Ok(self.lock()?.ledger.balance(owner))
    }

    pub fn deposit_count(&self) -> Result<u64, ServiceError> {
        Ok(self.lock()?.ledger.deposit_count())
    }

    pub fn withdrawal_count(&self) -> Result<u64, ServiceError> {
        Ok(self.lock()?.ledger.withdrawal_count())
    }

    pub fn held_value(&self) -> Result<Amount, ServiceError> {
        Ok(self.lock()?.ledger.held_value())
    }

    pub fn snapshot(&self) -> Result<LedgerSnapshot, ServiceError> {
        let inner = self.lock()?;
        let ledger = &inner.ledger;
        Ok(LedgerSnapshot {
            ledger_id: ledger.id_typed(),
            bank_cap: ledger.bank_cap(),
            withdrawal_limit: ledger.withdrawal_limit(),
            held_value: ledger.held_value(),
            deposit_count: ledger.deposit_count(),
            withdrawal_count: ledger.withdrawal_count(),
            owner_count: ledger.owner_count(),
        })
    }

    /// Run `f` against the release collaborator (e.g. to inspect payouts).
    pub fn with_release<T>(&self, f: impl FnOnce(&mut R) -> T) -> Result<T, ServiceError> {
        let mut inner = self.lock()?;
        Ok(f(&mut inner.release))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner<R>>, ServiceError> {
        self.inner.lock().map_err(|_| ServiceError::Poisoned)
    }

    /// Publish drained events while the lock is held so envelope order
    /// matches commit order. Failures are logged; the ledger change stands.
    fn publish_pending(&self, inner: &mut Inner<R>) {
        let ledger_id = inner.ledger.id_typed();
        for event in inner.ledger.take_events() {
            inner.published += 1;
            let envelope = EventEnvelope::wrap(ledger_id, inner.published, event);
            if let Err(err) = self.bus.publish(envelope) {
                tracing::error!(
                    error = %err,
                    sequence_number = inner.published,
                    "failed to publish ledger event"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::release::InMemoryTreasury;
    use custody_events::{InMemoryEventBus, Subscription};
    use std::sync::Arc;

    type Bus = Arc<InMemoryEventBus<EventEnvelope<LedgerEvent>>>;

    fn service(
        cap: u128,
        limit: u128,
    ) -> (
        LedgerService<Bus, InMemoryTreasury>,
        Subscription<EventEnvelope<LedgerEvent>>,
    ) {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let svc = LedgerService::from_config(
            &LedgerConfig::new(Amount::new(cap), Amount::new(limit)),
            InMemoryTreasury::new(),
            bus,
        );
        (svc, sub)
    }

    #[test]
    fn publishes_sequenced_envelopes_for_successful_operations() {
        let (svc, sub) = service(100, 10);
        let a = OwnerId::new();

        svc.deposit(a, Amount::new(20)).unwrap();
        svc.deposit(a, Amount::ZERO).unwrap_err();
        svc.withdraw(a, Amount::new(5)).unwrap();

        let envelopes = sub.drain();
        let seqs: Vec<u64> = envelopes.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2]);
        assert_eq!(envelopes[0].event_type(), "custody.ledger.deposited");
        assert_eq!(envelopes[1].event_type(), "custody.ledger.withdrawn");
        assert_eq!(envelopes[1].payload().new_balance(), Amount::new(15));
        assert_eq!(envelopes[1].ledger_id(), svc.snapshot().unwrap().ledger_id);
        assert_ne!(envelopes[0].event_id(), envelopes[1].event_id());
    }

    #[test]
    fn rejected_release_rolls_back_and_publishes_nothing() {
        let (svc, sub) = service(100, 10);
        let a = OwnerId::new();
        svc.deposit(a, Amount::new(8)).unwrap();
        sub.drain();

        svc.with_release(|t| t.reject(a)).unwrap();
        let err = svc.withdraw(a, Amount::new(3)).unwrap_err();

        assert!(matches!(
            err,
            ServiceError::Withdraw(WithdrawError::TransferFailed(_))
        ));
        assert_eq!(svc.balance(a).unwrap(), Amount::new(8));
        assert_eq!(svc.held_value().unwrap(), Amount::new(8));
        assert_eq!(svc.withdrawal_count().unwrap(), 0);
        assert!(sub.drain().is_empty());
        assert_eq!(svc.with_release(|t| t.releases()).unwrap(), 0);
    }

    #[test]
    fn snapshot_reports_limits_and_counters() {
        let (svc, _sub) = service(50, 7);
        svc.deposit(OwnerId::new(), Amount::new(3)).unwrap();
        svc.deposit(OwnerId::new(), Amount::new(4)).unwrap();

        let snap = svc.snapshot().unwrap();
        assert_eq!(snap.bank_cap, Amount::new(50));
        assert_eq!(snap.withdrawal_limit, Amount::new(7));
        assert_eq!(snap.held_value, Amount::new(7));
        assert_eq!(snap.deposit_count, 2);
        assert_eq!(snap.withdrawal_count, 0);
        assert_eq!(snap.owner_count, 2);
    }
}
