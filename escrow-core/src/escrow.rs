//! Voting-escrow state machine
//!
//! [`VotingEscrow`] is the sole mutator of the escrow state. Every operation
//! validates all of its preconditions before touching any record, so a
//! rejected call leaves locks, point logs, epochs and totals unchanged.
//!
//! Successful operations append [`StateChange`] records to a journal which the
//! persistence layer drains and commits atomically.
//!
//! # Voting power
//!
//! An account's power is `floor(delegated / MAXTIME) * (end - now)` where
//! `delegated` is the sum of all amounts routed to it (its own amount when
//! self-delegated, plus every delegator's amount) and `end` is its own lock end.

use crate::{
    checkpoint::CheckpointStore,
    clock::Clock,
    math::{self, floor_to_week, MAXTIME, PRECISION},
    types::{AccountId, BlockContext, Lock, Point},
    Error, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Largest amount whose voting power still fits the signed point arithmetic
const MAX_DELEGATED: u128 = i128::MAX as u128;

/// Privileged configuration of the escrow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Governance {
    /// Account allowed to run privileged operations
    pub owner: AccountId,
    /// Receiver of collected quit-lock penalties
    pub penalty_recipient: AccountId,
    /// Maximum penalty rate (PRECISION == 100%)
    pub max_penalty_rate: u128,
    /// Once set, penalties are zero and locks may be withdrawn at any time
    pub unlocked: bool,
}

impl Governance {
    /// Governance with default penalty settings
    pub fn new(owner: AccountId, penalty_recipient: AccountId) -> Self {
        Self {
            owner,
            penalty_recipient,
            max_penalty_rate: PRECISION,
            unlocked: false,
        }
    }
}

/// Complete escrow state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowState {
    /// Lock per account
    pub locks: HashMap<AccountId, Lock>,
    /// Point logs and slope schedule
    pub checkpoints: CheckpointStore,
    /// Total principal escrowed
    pub supply: u128,
    /// Penalties awaiting collection
    pub penalty_accumulated: u128,
    /// Privileged settings
    pub governance: Governance,
}

impl EscrowState {
    /// Fresh state with its genesis point at `genesis`
    pub fn new(genesis: BlockContext, governance: Governance) -> Self {
        Self {
            locks: HashMap::new(),
            checkpoints: CheckpointStore::new(genesis),
            supply: 0,
            penalty_accumulated: 0,
            governance,
        }
    }
}

/// Record written by a successful operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateChange {
    /// Lock of `account` replaced
    Lock {
        /// Owner of the lock
        account: AccountId,
        /// New lock value
        lock: Lock,
    },
    /// Global point appended
    GlobalPoint {
        /// Index in the global log
        epoch: u64,
        /// Appended point
        point: Point,
    },
    /// Account point appended
    UserPoint {
        /// Owner of the log
        account: AccountId,
        /// 1-based index in the account log
        epoch: u64,
        /// Appended point
        point: Point,
    },
    /// Slope schedule entry overwritten
    SlopeChange {
        /// Week-aligned timestamp
        time: u64,
        /// New delta (0 removes the entry)
        delta: i128,
    },
    /// Aggregates changed
    Totals {
        /// Total principal escrowed
        supply: u128,
        /// Penalties awaiting collection
        penalty_accumulated: u128,
    },
    /// Governance changed
    Governance(Governance),
}

/// Penalty handed to the recipient by [`VotingEscrow::collect_penalty`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyPayout {
    /// Receiver of the funds
    pub recipient: AccountId,
    /// Amount paid out
    pub amount: u128,
}

/// Voting-escrow ledger
pub struct VotingEscrow {
    state: EscrowState,
    clock: Arc<dyn Clock>,
    journal: Vec<StateChange>,
    last_checkpoint_steps: u64,
}

impl fmt::Debug for VotingEscrow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VotingEscrow")
            .field("locks", &self.state.locks.len())
            .field("global_epoch", &self.state.checkpoints.global_epoch())
            .field("supply", &self.state.supply)
            .field("pending_changes", &self.journal.len())
            .finish()
    }
}

impl VotingEscrow {
    /// Create an empty escrow whose genesis point is the clock's current block
    pub fn new(clock: Arc<dyn Clock>, governance: Governance) -> Self {
        let genesis = clock.now();
        let state = EscrowState::new(genesis, governance);
        let mut escrow = Self::from_state(state, clock);
        escrow.record(StateChange::GlobalPoint {
            epoch: 0,
            point: Point::zero_at(genesis),
        });
        escrow.record(StateChange::Governance(escrow.state.governance.clone()));
        escrow
    }

    /// Resume from a previously persisted state
    pub fn from_state(state: EscrowState, clock: Arc<dyn Clock>) -> Self {
        Self {
            state,
            clock,
            journal: Vec::new(),
            last_checkpoint_steps: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> &EscrowState {
        &self.state
    }

    /// Current block according to the clock
    pub fn now(&self) -> BlockContext {
        self.clock.now()
    }

    /// Drain the change journal
    pub fn take_changes(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.journal)
    }

    /// Week boundaries walked by the most recent global checkpoint (plus one
    /// for the point at the current block)
    pub fn last_checkpoint_steps(&self) -> u64 {
        self.last_checkpoint_steps
    }

    // Lock operations

    /// Lock `value` until `unlock_time` (rounded down to the week)
    pub fn create_lock(&mut self, account: AccountId, unlock_time: u64, value: u128) -> Result<()> {
        let now = self.now();
        let unlock_time = floor_to_week(unlock_time);
        let locked = self.locked(&account);

        if value == 0 {
            return Err(Error::NonZeroAmountRequired);
        }
        if locked.amount != 0 {
            return Err(Error::LockExists);
        }
        // A quit lock keeps its end; re-locking must go beyond it
        if locked.end != 0 && unlock_time <= locked.end {
            return Err(Error::OnlyIncreaseLockEnd);
        }
        if unlock_time <= now.timestamp {
            return Err(Error::FutureLockEndRequired);
        }
        if unlock_time > now.timestamp + MAXTIME {
            return Err(Error::ExceedsMaxTime);
        }
        let supply = checked_add(self.state.supply, value, "supply")?;
        let delegated = checked_delegated(locked.delegated, value)?;

        let new_lock = Lock {
            amount: value,
            delegated,
            end: unlock_time,
            delegatee: account,
        };
        self.write_lock(account, new_lock);
        // Power left over from a quit lock was already removed from the totals
        self.write_checkpoint(Some((account, Lock::empty(account), new_lock)), now);
        self.set_totals(supply, self.state.penalty_accumulated);

        tracing::info!(
            account = %account,
            amount = value,
            unlock_time,
            "Lock created"
        );
        Ok(())
    }

    /// Add `value` to an existing, live lock
    pub fn increase_amount(&mut self, account: AccountId, value: u128) -> Result<()> {
        let now = self.now();
        let locked = self.locked(&account);

        if value == 0 {
            return Err(Error::NonZeroAmountRequired);
        }
        if locked.amount == 0 {
            return Err(Error::NoLock);
        }
        if locked.end <= now.timestamp {
            return Err(Error::LockExpired);
        }
        let supply = checked_add(self.state.supply, value, "supply")?;
        let amount = checked_add(locked.amount, value, "lock amount")?;

        if locked.is_self_delegated(&account) {
            let new_lock = Lock {
                amount,
                delegated: checked_delegated(locked.delegated, value)?,
                ..locked
            };
            self.write_lock(account, new_lock);
            self.write_checkpoint(Some((account, locked, new_lock)), now);
        } else {
            // Power flows to the delegatee, which must still hold a live lock
            let delegatee = locked.delegatee;
            let delegatee_lock = self.locked(&delegatee);
            if delegatee_lock.amount == 0 {
                return Err(Error::DelegateeHasNoLock);
            }
            if delegatee_lock.end <= now.timestamp {
                return Err(Error::LockExpired);
            }
            let new_delegatee_lock = Lock {
                delegated: checked_delegated(delegatee_lock.delegated, value)?,
                ..delegatee_lock
            };
            let new_lock = Lock { amount, ..locked };

            self.write_lock(account, new_lock);
            self.write_checkpoint(Some((account, locked, new_lock)), now);
            self.write_lock(delegatee, new_delegatee_lock);
            self.write_checkpoint(Some((delegatee, delegatee_lock, new_delegatee_lock)), now);
        }
        self.set_totals(supply, self.state.penalty_accumulated);

        tracing::info!(account = %account, amount = value, "Lock amount increased");
        Ok(())
    }

    /// Move the end of a live lock to `unlock_time` (rounded down to the week)
    pub fn increase_unlock_time(&mut self, account: AccountId, unlock_time: u64) -> Result<()> {
        let now = self.now();
        let unlock_time = floor_to_week(unlock_time);
        let locked = self.locked(&account);

        if locked.amount == 0 {
            return Err(Error::NoLock);
        }
        if locked.end <= now.timestamp {
            return Err(Error::LockExpired);
        }
        if unlock_time <= locked.end {
            return Err(Error::OnlyIncreaseLockEnd);
        }
        if unlock_time > now.timestamp + MAXTIME {
            return Err(Error::ExceedsMaxTime);
        }

        let new_lock = Lock {
            end: unlock_time,
            ..locked
        };
        self.write_lock(account, new_lock);
        // Also covers power received from delegators while delegating out
        self.write_checkpoint(Some((account, locked, new_lock)), now);

        tracing::info!(account = %account, unlock_time, "Lock end increased");
        Ok(())
    }

    /// Route the voting power of `account`'s lock to `to`
    ///
    /// Delegating to another account requires its lock to end strictly after
    /// the delegator's own. Delegating back to self (undelegating) is always
    /// allowed; delegating to the current delegatee is a no-op.
    pub fn delegate(&mut self, account: AccountId, to: AccountId) -> Result<()> {
        let now = self.now();
        let locked = self.locked(&account);

        if locked.amount == 0 {
            return Err(Error::NoLock);
        }
        if locked.delegatee == to {
            return Ok(());
        }
        let from = locked.delegatee;
        let value = locked.amount;
        let to_lock = self.locked(&to);

        if to != account {
            if locked.end <= now.timestamp {
                return Err(Error::LockExpired);
            }
            if to_lock.amount == 0 {
                return Err(Error::DelegateeHasNoLock);
            }
            if to_lock.end <= locked.end {
                return Err(Error::OnlyDelegateToLongerLock);
            }
        }
        checked_delegated(to_lock.delegated, value)?;

        if from == account {
            // Delegate: own lock gives up its power
            let new_lock = Lock {
                delegatee: to,
                delegated: locked.delegated.saturating_sub(value),
                ..locked
            };
            self.write_lock(account, new_lock);
            self.write_checkpoint(Some((account, locked, new_lock)), now);
            self.credit_delegation(to, value, now);
        } else if to == account {
            // Undelegate: power returns to the own lock
            self.debit_delegation(from, value, now);
            let own = self.locked(&account);
            let new_lock = Lock {
                delegatee: account,
                delegated: own.delegated + value,
                ..own
            };
            self.write_lock(account, new_lock);
            self.write_checkpoint(Some((account, own, new_lock)), now);
        } else {
            // Re-delegate: the owner lock only changes its pointer
            self.write_lock(
                account,
                Lock {
                    delegatee: to,
                    ..locked
                },
            );
            self.debit_delegation(from, value, now);
            self.credit_delegation(to, value, now);
        }

        tracing::info!(account = %account, from = %from, to = %to, amount = value, "Lock delegated");
        Ok(())
    }

    /// Exit a live lock early, paying a penalty proportional to the time left.
    ///
    /// The lock end is kept, so a later `create_lock` must go beyond it.
    /// Returns the amount handed back to the account.
    pub fn quit_lock(&mut self, account: AccountId) -> Result<u128> {
        let now = self.now();
        let locked = self.locked(&account);

        if locked.amount == 0 {
            return Err(Error::NoLock);
        }
        if locked.end <= now.timestamp {
            return Err(Error::LockExpired);
        }
        if !locked.is_self_delegated(&account) {
            return Err(Error::LockDelegated);
        }

        let value = locked.amount;
        let rate = self.penalty_rate_for(locked.end, now.timestamp);
        let penalty = math::penalty_amount(rate, value).min(value);
        let returned = value - penalty;

        let stored = Lock {
            amount: 0,
            delegated: locked.delegated.saturating_sub(value),
            end: locked.end,
            delegatee: account,
        };
        self.write_lock(account, stored);
        // All power of this account leaves the totals, including delegators'
        self.write_checkpoint(Some((account, locked, Lock::empty(account))), now);
        self.set_totals(
            self.state.supply - value,
            self.state.penalty_accumulated.saturating_add(penalty),
        );

        tracing::info!(
            account = %account,
            amount = value,
            penalty,
            returned,
            "Lock quit"
        );
        Ok(returned)
    }

    /// Return the principal of an expired lock (any lock once unlocked)
    pub fn withdraw(&mut self, account: AccountId) -> Result<u128> {
        let now = self.now();
        let locked = self.locked(&account);

        if locked.amount == 0 {
            return Err(Error::NoLock);
        }
        if !self.state.governance.unlocked && locked.end > now.timestamp {
            return Err(Error::LockNotExpired);
        }
        if !locked.is_self_delegated(&account) {
            return Err(Error::LockDelegated);
        }

        let value = locked.amount;
        let stored = Lock {
            amount: 0,
            delegated: locked.delegated.saturating_sub(value),
            end: 0,
            delegatee: account,
        };
        self.write_lock(account, stored);
        self.write_checkpoint(Some((account, locked, Lock::empty(account))), now);
        self.set_totals(self.state.supply - value, self.state.penalty_accumulated);

        tracing::info!(account = %account, amount = value, "Lock withdrawn");
        Ok(value)
    }

    /// Bring the global point up to the current block
    pub fn checkpoint(&mut self) {
        let now = self.now();
        let latest = self.state.checkpoints.latest_global();
        if latest.ts == now.timestamp && latest.blk == now.height {
            self.last_checkpoint_steps = 0;
            return;
        }
        self.write_checkpoint(None, now);
        tracing::debug!(
            global_epoch = self.state.checkpoints.global_epoch(),
            steps = self.last_checkpoint_steps,
            "Global checkpoint"
        );
    }

    // Governance

    /// Permanently disable penalties and allow withdrawing any lock
    pub fn unlock(&mut self, caller: AccountId) -> Result<()> {
        self.ensure_owner(&caller, "unlock")?;
        let mut governance = self.state.governance.clone();
        governance.unlocked = true;
        governance.max_penalty_rate = 0;
        self.set_governance(governance);
        tracing::info!(caller = %caller, "Escrow unlocked");
        Ok(())
    }

    /// Hand privileged rights to `new_owner`
    pub fn transfer_ownership(&mut self, caller: AccountId, new_owner: AccountId) -> Result<()> {
        self.ensure_owner(&caller, "transfer_ownership")?;
        let mut governance = self.state.governance.clone();
        governance.owner = new_owner;
        self.set_governance(governance);
        tracing::info!(caller = %caller, new_owner = %new_owner, "Ownership transferred");
        Ok(())
    }

    /// Change the receiver of collected penalties
    pub fn set_penalty_recipient(&mut self, caller: AccountId, recipient: AccountId) -> Result<()> {
        self.ensure_owner(&caller, "set_penalty_recipient")?;
        let mut governance = self.state.governance.clone();
        governance.penalty_recipient = recipient;
        self.set_governance(governance);
        tracing::info!(caller = %caller, recipient = %recipient, "Penalty recipient updated");
        Ok(())
    }

    /// Pay accumulated penalties to the penalty recipient
    pub fn collect_penalty(&mut self) -> PenaltyPayout {
        let payout = PenaltyPayout {
            recipient: self.state.governance.penalty_recipient,
            amount: self.state.penalty_accumulated,
        };
        self.set_totals(self.state.supply, 0);
        tracing::info!(
            recipient = %payout.recipient,
            amount = payout.amount,
            "Penalty collected"
        );
        payout
    }

    // Views

    /// Lock of `account` (empty when it never locked)
    pub fn locked(&self, account: &AccountId) -> Lock {
        self.state
            .locks
            .get(account)
            .copied()
            .unwrap_or_else(|| Lock::empty(*account))
    }

    /// Lock end of `account`
    pub fn lock_end(&self, account: &AccountId) -> u64 {
        self.locked(account).end
    }

    /// Current voting power of `account`
    pub fn balance_of(&self, account: &AccountId) -> u128 {
        let now = self.now();
        self.state
            .checkpoints
            .latest_user(account)
            .map_or(0, |point| point.value_at(now.timestamp))
    }

    /// Total principal escrowed
    pub fn supply(&self) -> u128 {
        self.state.supply
    }

    /// Penalties awaiting collection
    pub fn penalty_accumulated(&self) -> u128 {
        self.state.penalty_accumulated
    }

    /// Privileged settings
    pub fn governance(&self) -> &Governance {
        &self.state.governance
    }

    /// Penalty rate `account` would pay if it quit now
    pub fn current_penalty_rate(&self, account: &AccountId) -> u128 {
        let now = self.now();
        let locked = self.locked(account);
        if !locked.is_active(now.timestamp) {
            return 0;
        }
        self.penalty_rate_for(locked.end, now.timestamp)
    }

    /// Index of the latest global point
    pub fn global_epoch(&self) -> u64 {
        self.state.checkpoints.global_epoch()
    }

    /// Number of points recorded for `account`
    pub fn user_epoch(&self, account: &AccountId) -> u64 {
        self.state.checkpoints.user_epoch(account)
    }

    /// Global point at `epoch`
    pub fn point_history(&self, epoch: u64) -> Option<Point> {
        self.state.checkpoints.global_point(epoch)
    }

    /// Account point at 1-based `epoch`
    pub fn user_point_history(&self, account: &AccountId, epoch: u64) -> Option<Point> {
        self.state.checkpoints.user_point(account, epoch)
    }

    /// Scheduled slope delta at `time`
    pub fn slope_change_at(&self, time: u64) -> i128 {
        self.state.checkpoints.slope_change(time)
    }

    // Internals

    fn penalty_rate_for(&self, end: u64, now: u64) -> u128 {
        if self.state.governance.unlocked {
            return 0;
        }
        math::penalty_rate(self.state.governance.max_penalty_rate, end, now)
    }

    fn ensure_owner(&self, caller: &AccountId, operation: &str) -> Result<()> {
        if *caller != self.state.governance.owner {
            tracing::warn!(caller = %caller, operation, "Rejected privileged call");
            return Err(Error::Unauthorized(format!(
                "{} may not call {}",
                caller, operation
            )));
        }
        Ok(())
    }

    fn credit_delegation(&mut self, to: AccountId, value: u128, now: BlockContext) {
        let old = self.locked(&to);
        let new = Lock {
            delegated: old.delegated + value,
            ..old
        };
        self.write_lock(to, new);
        self.write_checkpoint(Some((to, old, new)), now);
    }

    fn debit_delegation(&mut self, from: AccountId, value: u128, now: BlockContext) {
        let old = self.locked(&from);
        let new = Lock {
            delegated: old.delegated.saturating_sub(value),
            ..old
        };
        self.write_lock(from, new);
        // A quit or withdrawn lock no longer contributes to the totals
        if new.amount > 0 {
            self.write_checkpoint(Some((from, old, new)), now);
        }
    }

    fn record(&mut self, change: StateChange) {
        self.journal.push(change);
    }

    fn write_lock(&mut self, account: AccountId, lock: Lock) {
        self.state.locks.insert(account, lock);
        self.record(StateChange::Lock { account, lock });
    }

    fn set_totals(&mut self, supply: u128, penalty_accumulated: u128) {
        self.state.supply = supply;
        self.state.penalty_accumulated = penalty_accumulated;
        self.record(StateChange::Totals {
            supply,
            penalty_accumulated,
        });
    }

    fn set_governance(&mut self, governance: Governance) {
        self.state.governance = governance.clone();
        self.record(StateChange::Governance(governance));
    }

    fn set_slope_change(&mut self, time: u64, delta: i128) {
        self.state.checkpoints.set_slope_change(time, delta);
        self.record(StateChange::SlopeChange { time, delta });
    }

    /// Record the account's new point, bring the global log to `now` and
    /// reschedule slope changes for the old and new lock ends.
    fn write_checkpoint(&mut self, change: Option<(AccountId, Lock, Lock)>, now: BlockContext) {
        let mut user_old = Point::zero_at(now);
        let mut user_new = Point::zero_at(now);
        let mut old_dslope = 0i128;
        let mut new_dslope = 0i128;

        if let Some((account, old, new)) = change {
            user_old = power_point(&old, now);
            user_new = power_point(&new, now);
            let epoch = self.state.checkpoints.append_user(account, user_new);
            self.record(StateChange::UserPoint {
                account,
                epoch,
                point: user_new,
            });

            old_dslope = self.state.checkpoints.slope_change(old.end);
            if new.end != 0 {
                new_dslope = if new.end == old.end {
                    old_dslope
                } else {
                    self.state.checkpoints.slope_change(new.end)
                };
            }
        }

        let replay = self.state.checkpoints.replay_to(now);
        self.last_checkpoint_steps = replay.boundaries.len() as u64 + 1;
        for point in replay.boundaries {
            let epoch = self.state.checkpoints.append_global(point);
            self.record(StateChange::GlobalPoint { epoch, point });
        }

        let mut last = replay.current;
        if change.is_some() {
            last.slope += user_new.slope - user_old.slope;
            last.bias += user_new.bias - user_old.bias;
            if last.slope > 0 {
                last.slope = 0;
            }
            if last.bias < 0 {
                last.bias = 0;
            }
        }
        let epoch = self.state.checkpoints.append_global(last);
        self.record(StateChange::GlobalPoint { epoch, point: last });

        if let Some((_, old, new)) = change {
            if old.end > now.timestamp {
                // Cancel the old lock's scheduled expiry
                old_dslope += user_old.slope;
                if new.end == old.end {
                    old_dslope -= user_new.slope;
                }
                self.set_slope_change(old.end, old_dslope);
            }
            if new.end > now.timestamp && new.end > old.end {
                new_dslope -= user_new.slope;
                self.set_slope_change(new.end, new_dslope);
            }
        }
    }
}

/// Voting-power point of `lock` at `now`; zero once expired or undelegated
fn power_point(lock: &Lock, now: BlockContext) -> Point {
    if lock.end > now.timestamp && lock.delegated > 0 {
        let slope = math::slope_for_lock(lock.delegated);
        Point {
            bias: math::bias_for_new_lock(lock.delegated, lock.end - now.timestamp),
            slope,
            ts: now.timestamp,
            blk: now.height,
        }
    } else {
        Point::zero_at(now)
    }
}

fn checked_add(a: u128, b: u128, what: &str) -> Result<u128> {
    a.checked_add(b)
        .ok_or_else(|| Error::Overflow(format!("{} overflows", what)))
}

fn checked_delegated(delegated: u128, value: u128) -> Result<u128> {
    let total = checked_add(delegated, value, "delegated amount")?;
    if total > MAX_DELEGATED {
        return Err(Error::Overflow("delegated amount overflows".to_string()));
    }
    Ok(total)
}
