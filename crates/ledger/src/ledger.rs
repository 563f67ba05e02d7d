use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use custody_core::{Aggregate, AggregateRoot, Amount, LedgerId, OwnerId};
use custody_events::Event;

use crate::config::LedgerConfig;
use crate::error::{DepositError, LedgerError, WithdrawError};
use crate::release::ValueRelease;

/// Command: credit value the owner has already handed over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositFunds {
    pub owner: OwnerId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: debit the owner and release the value back to them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawFunds {
    pub owner: OwnerId,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Deposit(DepositFunds),
    Withdraw(WithdrawFunds),
}

/// Event: Deposited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposited {
    pub ledger_id: LedgerId,
    pub owner: OwnerId,
    pub amount: Amount,
    pub new_balance: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Withdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawn {
    pub ledger_id: LedgerId,
    pub owner: OwnerId,
    pub amount: Amount,
    pub new_balance: Amount,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Deposited(Deposited),
    Withdrawn(Withdrawn),
}

impl LedgerEvent {
    pub fn owner(&self) -> OwnerId {
        match self {
            LedgerEvent::Deposited(e) => e.owner,
            LedgerEvent::Withdrawn(e) => e.owner,
        }
    }

    pub fn new_balance(&self) -> Amount {
        match self {
            LedgerEvent::Deposited(e) => e.new_balance,
            LedgerEvent::Withdrawn(e) => e.new_balance,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::Deposited(_) => "custody.ledger.deposited",
            LedgerEvent::Withdrawn(_) => "custody.ledger.withdrawn",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::Deposited(e) => e.occurred_at,
            LedgerEvent::Withdrawn(e) => e.occurred_at,
        }
    }
}

/// Aggregate root: the custody ledger.
///
/// Holds every owner's balance, the two construction-time limits and the
/// operation counters. Invariants after every call:
///
/// - `held_value <= bank_cap`
/// - the balances sum exactly to `held_value`
/// - each counter grows by one per successful operation of its kind
/// - a rejected call leaves no trace (state, counters, outbox)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountLedger {
    id: LedgerId,
    bank_cap: Amount,
    withdrawal_limit: Amount,
    balances: HashMap<OwnerId, Amount>,
    held_value: Amount,
    deposit_count: u64,
    withdrawal_count: u64,
    version: u64,
    outbox: Vec<LedgerEvent>,
}

/// State touched by a withdrawal, captured before its effects are applied.
struct Checkpoint {
    owner: OwnerId,
    balance: Option<Amount>,
    held_value: Amount,
    withdrawal_count: u64,
    version: u64,
}

/// Undoes an applied withdrawal when dropped, unless committed.
struct RollbackGuard<'a> {
    ledger: &'a mut AccountLedger,
    checkpoint: Option<Checkpoint>,
}

impl RollbackGuard<'_> {
    fn commit(mut self) {
        self.checkpoint = None;
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if let Some(checkpoint) = self.checkpoint.take() {
            self.ledger.restore(checkpoint);
        }
    }
}

impl AccountLedger {
    pub fn new(bank_cap: Amount, withdrawal_limit: Amount) -> Self {
        Self::with_id(LedgerId::new(), bank_cap, withdrawal_limit)
    }

    pub fn with_id(id: LedgerId, bank_cap: Amount, withdrawal_limit: Amount) -> Self {
        Self {
            id,
            bank_cap,
            withdrawal_limit,
            balances: HashMap::new(),
            held_value: Amount::ZERO,
            deposit_count: 0,
            withdrawal_count: 0,
            version: 0,
            outbox: Vec::new(),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.bank_cap, config.withdrawal_limit)
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn bank_cap(&self) -> Amount {
        self.bank_cap
    }

    pub fn withdrawal_limit(&self) -> Amount {
        self.withdrawal_limit
    }

    /// Balance of `owner`; zero for owners that never deposited.
    pub fn balance(&self, owner: OwnerId) -> Amount {
        self.balances.get(&owner).copied().unwrap_or(Amount::ZERO)
    }

    pub fn held_value(&self) -> Amount {
        self.held_value
    }

    pub fn deposit_count(&self) -> u64 {
        self.deposit_count
    }

    pub fn withdrawal_count(&self) -> u64 {
        self.withdrawal_count
    }

    /// Owners that ever deposited, including those now at zero.
    pub fn owner_count(&self) -> usize {
        self.balances.len()
    }

    pub fn balances(&self) -> impl Iterator<Item = (OwnerId, Amount)> + '_ {
        self.balances.iter().map(|(owner, amount)| (*owner, *amount))
    }

    /// Credit `amount` to `owner`. The value must already be in custody.
    ///
    /// Returns the owner's new balance.
    pub fn deposit(&mut self, owner: OwnerId, amount: Amount) -> Result<Amount, DepositError> {
        let event = self.decide_deposit(&DepositFunds {
            owner,
            amount,
            occurred_at: Utc::now(),
        })?;
        let new_balance = event.new_balance;

        let event = LedgerEvent::Deposited(event);
        self.apply(&event);
        self.outbox.push(event);

        Ok(new_balance)
    }

    /// Debit `amount` from `owner` and hand it to `release`.
    ///
    /// The debit is applied before `release` runs; if the release fails the
    /// debit is undone and `TransferFailed` is returned. A panicking release
    /// also undoes the debit while unwinding.
    pub fn withdraw<R>(
        &mut self,
        owner: OwnerId,
        amount: Amount,
        release: &mut R,
    ) -> Result<Amount, WithdrawError>
    where
        R: ValueRelease + ?Sized,
    {
        let event = self.decide_withdraw(&WithdrawFunds {
            owner,
            amount,
            occurred_at: Utc::now(),
        })?;
        let new_balance = event.new_balance;

        let checkpoint = self.checkpoint(owner);
        let event = LedgerEvent::Withdrawn(event);
        self.apply(&event);

        // Restores the checkpoint on an error return or a panicking release.
        let guard = RollbackGuard {
            ledger: &mut *self,
            checkpoint: Some(checkpoint),
        };
        if let Err(err) = release.release(&*guard.ledger, owner, amount) {
            return Err(WithdrawError::TransferFailed(err));
        }
        guard.commit();

        self.outbox.push(event);
        Ok(new_balance)
    }

    /// Drain the notifications produced by successful operations, oldest first.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.outbox)
    }

    fn decide_deposit(&self, cmd: &DepositFunds) -> Result<Deposited, DepositError> {
        if cmd.amount.is_zero() {
            return Err(DepositError::ZeroDeposit);
        }

        // balance <= held_value, so a credit that overflows the balance also
        // overflows the total and lands here as a cap breach.
        let balance = self.balance(cmd.owner);
        let credit = self
            .held_value
            .checked_add(cmd.amount)
            .filter(|total| *total <= self.bank_cap)
            .zip(balance.checked_add(cmd.amount));
        let Some((_, new_balance)) = credit else {
            return Err(DepositError::CapExceeded {
                held_value: self.held_value,
                bank_cap: self.bank_cap,
                amount: cmd.amount,
            });
        };

        Ok(Deposited {
            ledger_id: self.id,
            owner: cmd.owner,
            amount: cmd.amount,
            new_balance,
            occurred_at: cmd.occurred_at,
        })
    }

    fn decide_withdraw(&self, cmd: &WithdrawFunds) -> Result<Withdrawn, WithdrawError> {
        if cmd.amount.is_zero() {
            return Err(WithdrawError::ZeroWithdrawal);
        }

        if cmd.amount > self.withdrawal_limit {
            return Err(WithdrawError::WithdrawalLimitExceeded {
                limit: self.withdrawal_limit,
                amount: cmd.amount,
            });
        }

        let available = self.balance(cmd.owner);
        let new_balance =
            available
                .checked_sub(cmd.amount)
                .ok_or(WithdrawError::InsufficientBalance {
                    available,
                    amount: cmd.amount,
                })?;

        Ok(Withdrawn {
            ledger_id: self.id,
            owner: cmd.owner,
            amount: cmd.amount,
            new_balance,
            occurred_at: cmd.occurred_at,
        })
    }

    fn checkpoint(&self, owner: OwnerId) -> Checkpoint {
        Checkpoint {
            owner,
            balance: self.balances.get(&owner).copied(),
            held_value: self.held_value,
            withdrawal_count: self.withdrawal_count,
            version: self.version,
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        match checkpoint.balance {
            Some(balance) => {
                self.balances.insert(checkpoint.owner, balance);
            }
            None => {
                self.balances.remove(&checkpoint.owner);
            }
        }
        self.held_value = checkpoint.held_value;
        self.withdrawal_count = checkpoint.withdrawal_count;
        self.version = checkpoint.version;
    }
}

impl AggregateRoot for AccountLedger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for AccountLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        // Amounts were checked in `handle`; saturation here never triggers.
        match event {
            LedgerEvent::Deposited(e) => {
                self.balances.insert(e.owner, e.new_balance);
                self.held_value = self.held_value.saturating_add(e.amount);
                self.deposit_count += 1;
            }
            LedgerEvent::Withdrawn(e) => {
                self.balances.insert(e.owner, e.new_balance);
                self.held_value = self.held_value.saturating_sub(e.amount);
                self.withdrawal_count += 1;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Deposit(cmd) => Ok(vec![LedgerEvent::Deposited(
                self.decide_deposit(cmd)?,
            )]),
            LedgerCommand::Withdraw(cmd) => Ok(vec![LedgerEvent::Withdrawn(
                self.decide_withdraw(cmd)?,
            )]),
        }
    }
}
