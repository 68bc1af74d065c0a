//! Actor-based concurrency for the escrow
//!
//! One task owns the [`VotingEscrow`] and its [`Storage`]. Every command runs
//! to completion before the next is dequeued, and the changes of a successful
//! command are committed in one RocksDB write batch before its reply is sent.
//!
//! ```text
//! EscrowHandle (Clone) ──mpsc (bounded)──▶ EscrowActor
//!                                            │ VotingEscrow::op()
//!                                            │ take_changes()
//!                                            ▼
//!                                          Storage::apply()
//! ```

use crate::{
    clock::Clock,
    escrow::{Governance, PenaltyPayout, StateChange, VotingEscrow},
    metrics::Metrics,
    types::{AccountId, Lock},
    Error, Result, Storage,
};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Ledger-wide figures returned by [`EscrowHandle::summary`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowSummary {
    /// Total principal escrowed
    pub supply: u128,
    /// Penalties awaiting collection
    pub penalty_accumulated: u128,
    /// Index of the latest global point
    pub global_epoch: u64,
    /// Privileged settings
    pub governance: Governance,
}

/// Message sent to the escrow actor
#[derive(Debug)]
pub enum EscrowMessage {
    /// Open a lock
    CreateLock {
        account: AccountId,
        unlock_time: u64,
        amount: u128,
        response: oneshot::Sender<Result<()>>,
    },

    /// Top up a lock
    IncreaseAmount {
        account: AccountId,
        amount: u128,
        response: oneshot::Sender<Result<()>>,
    },

    /// Extend a lock
    IncreaseUnlockTime {
        account: AccountId,
        unlock_time: u64,
        response: oneshot::Sender<Result<()>>,
    },

    /// Route voting power to another account (or back to self)
    Delegate {
        account: AccountId,
        to: AccountId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Exit early with a penalty
    QuitLock {
        account: AccountId,
        response: oneshot::Sender<Result<u128>>,
    },

    /// Withdraw an expired lock
    Withdraw {
        account: AccountId,
        response: oneshot::Sender<Result<u128>>,
    },

    /// Global checkpoint
    Checkpoint {
        response: oneshot::Sender<Result<()>>,
    },

    /// Disable penalties for good
    Unlock {
        caller: AccountId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Hand over ownership
    TransferOwnership {
        caller: AccountId,
        new_owner: AccountId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Change the penalty recipient
    SetPenaltyRecipient {
        caller: AccountId,
        recipient: AccountId,
        response: oneshot::Sender<Result<()>>,
    },

    /// Pay out accumulated penalties
    CollectPenalty {
        response: oneshot::Sender<Result<PenaltyPayout>>,
    },

    /// Current lock of an account
    Locked {
        account: AccountId,
        response: oneshot::Sender<Lock>,
    },

    /// Current voting power of an account
    BalanceOf {
        account: AccountId,
        response: oneshot::Sender<u128>,
    },

    /// Voting power of an account at a past block
    BalanceOfAt {
        account: AccountId,
        seq: u64,
        response: oneshot::Sender<Result<u128>>,
    },

    /// Current total voting power
    TotalSupply { response: oneshot::Sender<u128> },

    /// Total voting power at a past block
    TotalSupplyAt {
        seq: u64,
        response: oneshot::Sender<Result<u128>>,
    },

    /// Ledger-wide figures
    Summary {
        response: oneshot::Sender<EscrowSummary>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the escrow state
pub struct EscrowActor {
    escrow: VotingEscrow,
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    mailbox: mpsc::Receiver<EscrowMessage>,
}

impl std::fmt::Debug for EscrowActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowActor")
            .field("escrow", &self.escrow)
            .finish_non_exhaustive()
    }
}

impl EscrowActor {
    /// Create new actor
    pub fn new(
        escrow: VotingEscrow,
        storage: Arc<Storage>,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
        mailbox: mpsc::Receiver<EscrowMessage>,
    ) -> Self {
        Self {
            escrow,
            storage,
            clock,
            metrics,
            mailbox,
        }
    }

    /// Run the actor event loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let EscrowMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg);
        }
        tracing::info!(
            global_epoch = self.escrow.global_epoch(),
            "Escrow actor stopped"
        );
    }

    fn handle_message(&mut self, msg: EscrowMessage) {
        // Dropped receivers only mean the caller gave up waiting
        match msg {
            EscrowMessage::CreateLock {
                account,
                unlock_time,
                amount,
                response,
            } => {
                let result = self.execute("create_lock", |escrow| {
                    escrow.create_lock(account, unlock_time, amount)
                });
                let _ = response.send(result);
            }

            EscrowMessage::IncreaseAmount {
                account,
                amount,
                response,
            } => {
                let result = self.execute("increase_amount", |escrow| {
                    escrow.increase_amount(account, amount)
                });
                let _ = response.send(result);
            }

            EscrowMessage::IncreaseUnlockTime {
                account,
                unlock_time,
                response,
            } => {
                let result = self.execute("increase_unlock_time", |escrow| {
                    escrow.increase_unlock_time(account, unlock_time)
                });
                let _ = response.send(result);
            }

            EscrowMessage::Delegate {
                account,
                to,
                response,
            } => {
                let result = self.execute("delegate", |escrow| escrow.delegate(account, to));
                let _ = response.send(result);
            }

            EscrowMessage::QuitLock { account, response } => {
                let result = self.execute("quit_lock", |escrow| escrow.quit_lock(account));
                let _ = response.send(result);
            }

            EscrowMessage::Withdraw { account, response } => {
                let result = self.execute("withdraw", |escrow| escrow.withdraw(account));
                let _ = response.send(result);
            }

            EscrowMessage::Checkpoint { response } => {
                let result = self.execute("checkpoint", |escrow| {
                    escrow.checkpoint();
                    Ok(())
                });
                let _ = response.send(result);
            }

            EscrowMessage::Unlock { caller, response } => {
                let result = self.execute("unlock", |escrow| escrow.unlock(caller));
                let _ = response.send(result);
            }

            EscrowMessage::TransferOwnership {
                caller,
                new_owner,
                response,
            } => {
                let result = self.execute("transfer_ownership", |escrow| {
                    escrow.transfer_ownership(caller, new_owner)
                });
                let _ = response.send(result);
            }

            EscrowMessage::SetPenaltyRecipient {
                caller,
                recipient,
                response,
            } => {
                let result = self.execute("set_penalty_recipient", |escrow| {
                    escrow.set_penalty_recipient(caller, recipient)
                });
                let _ = response.send(result);
            }

            EscrowMessage::CollectPenalty { response } => {
                let result =
                    self.execute("collect_penalty", |escrow| Ok(escrow.collect_penalty()));
                let _ = response.send(result);
            }

            EscrowMessage::Locked { account, response } => {
                let _ = response.send(self.escrow.locked(&account));
            }

            EscrowMessage::BalanceOf { account, response } => {
                let _ = response.send(self.escrow.balance_of(&account));
            }

            EscrowMessage::BalanceOfAt {
                account,
                seq,
                response,
            } => {
                let _ = response.send(self.escrow.balance_of_at(&account, seq));
            }

            EscrowMessage::TotalSupply { response } => {
                let _ = response.send(self.escrow.total_supply());
            }

            EscrowMessage::TotalSupplyAt { seq, response } => {
                let _ = response.send(self.escrow.total_supply_at(seq));
            }

            EscrowMessage::Summary { response } => {
                let _ = response.send(EscrowSummary {
                    supply: self.escrow.supply(),
                    penalty_accumulated: self.escrow.penalty_accumulated(),
                    global_epoch: self.escrow.global_epoch(),
                    governance: self.escrow.governance().clone(),
                });
            }

            EscrowMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }

    /// Run one mutating operation and commit its changes
    fn execute<T>(
        &mut self,
        kind: &'static str,
        op: impl FnOnce(&mut VotingEscrow) -> Result<T>,
    ) -> Result<T> {
        let result = op(&mut self.escrow);
        let changes = self.escrow.take_changes();

        match result {
            Ok(value) => {
                self.commit(&changes)?;
                self.metrics.record_operation(kind);
                if changes
                    .iter()
                    .any(|c| matches!(c, StateChange::GlobalPoint { .. }))
                {
                    self.metrics.record_checkpoint(
                        self.escrow.last_checkpoint_steps(),
                        self.escrow.global_epoch(),
                    );
                }
                self.metrics.update_supply(self.escrow.supply());
                Ok(value)
            }
            Err(e) => {
                debug_assert!(changes.is_empty(), "rejected operation produced changes");
                self.metrics.record_rejection(kind);
                if e.is_precondition() {
                    tracing::debug!(operation = kind, error = %e, "Operation rejected");
                } else {
                    tracing::warn!(operation = kind, error = %e, "Operation failed");
                }
                Err(e)
            }
        }
    }

    fn commit(&mut self, changes: &[StateChange]) -> Result<()> {
        if let Err(e) = self.storage.apply(changes) {
            tracing::error!(error = %e, "Failed to commit escrow changes, reloading state");
            // Memory is ahead of disk; fall back to the last committed state
            match self.storage.load_state() {
                Ok(Some(state)) => {
                    self.escrow = VotingEscrow::from_state(state, self.clock.clone());
                }
                Ok(None) => tracing::error!("No committed escrow state to reload"),
                Err(reload) => tracing::error!(error = %reload, "Failed to reload escrow state"),
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct EscrowHandle {
    sender: mpsc::Sender<EscrowMessage>,
}

impl EscrowHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<EscrowMessage>) -> Self {
        Self { sender }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EscrowMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Lock `amount` until `unlock_time`
    pub async fn create_lock(&self, account: AccountId, unlock_time: u64, amount: u128) -> Result<()> {
        self.call(|response| EscrowMessage::CreateLock {
            account,
            unlock_time,
            amount,
            response,
        })
        .await?
    }

    /// Add `amount` to a live lock
    pub async fn increase_amount(&self, account: AccountId, amount: u128) -> Result<()> {
        self.call(|response| EscrowMessage::IncreaseAmount {
            account,
            amount,
            response,
        })
        .await?
    }

    /// Extend a live lock
    pub async fn increase_unlock_time(&self, account: AccountId, unlock_time: u64) -> Result<()> {
        self.call(|response| EscrowMessage::IncreaseUnlockTime {
            account,
            unlock_time,
            response,
        })
        .await?
    }

    /// Delegate voting power
    pub async fn delegate(&self, account: AccountId, to: AccountId) -> Result<()> {
        self.call(|response| EscrowMessage::Delegate {
            account,
            to,
            response,
        })
        .await?
    }

    /// Quit a lock early; returns the amount after penalty
    pub async fn quit_lock(&self, account: AccountId) -> Result<u128> {
        self.call(|response| EscrowMessage::QuitLock { account, response })
            .await?
    }

    /// Withdraw an expired lock; returns the principal
    pub async fn withdraw(&self, account: AccountId) -> Result<u128> {
        self.call(|response| EscrowMessage::Withdraw { account, response })
            .await?
    }

    /// Global checkpoint
    pub async fn checkpoint(&self) -> Result<()> {
        self.call(|response| EscrowMessage::Checkpoint { response })
            .await?
    }

    /// Disable penalties (owner only)
    pub async fn unlock(&self, caller: AccountId) -> Result<()> {
        self.call(|response| EscrowMessage::Unlock { caller, response })
            .await?
    }

    /// Hand over ownership (owner only)
    pub async fn transfer_ownership(&self, caller: AccountId, new_owner: AccountId) -> Result<()> {
        self.call(|response| EscrowMessage::TransferOwnership {
            caller,
            new_owner,
            response,
        })
        .await?
    }

    /// Change the penalty recipient (owner only)
    pub async fn set_penalty_recipient(&self, caller: AccountId, recipient: AccountId) -> Result<()> {
        self.call(|response| EscrowMessage::SetPenaltyRecipient {
            caller,
            recipient,
            response,
        })
        .await?
    }

    /// Pay out accumulated penalties
    pub async fn collect_penalty(&self) -> Result<PenaltyPayout> {
        self.call(|response| EscrowMessage::CollectPenalty { response })
            .await?
    }

    /// Current lock of `account`
    pub async fn locked(&self, account: AccountId) -> Result<Lock> {
        self.call(|response| EscrowMessage::Locked { account, response })
            .await
    }

    /// Current voting power of `account`
    pub async fn balance_of(&self, account: AccountId) -> Result<u128> {
        self.call(|response| EscrowMessage::BalanceOf { account, response })
            .await
    }

    /// Voting power of `account` at past block `seq`
    pub async fn balance_of_at(&self, account: AccountId, seq: u64) -> Result<u128> {
        self.call(|response| EscrowMessage::BalanceOfAt {
            account,
            seq,
            response,
        })
        .await?
    }

    /// Current total voting power
    pub async fn total_supply(&self) -> Result<u128> {
        self.call(|response| EscrowMessage::TotalSupply { response })
            .await
    }

    /// Total voting power at past block `seq`
    pub async fn total_supply_at(&self, seq: u64) -> Result<u128> {
        self.call(|response| EscrowMessage::TotalSupplyAt { seq, response })
            .await?
    }

    /// Ledger-wide figures
    pub async fn summary(&self) -> Result<EscrowSummary> {
        self.call(|response| EscrowMessage::Summary { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EscrowMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the escrow actor
pub fn spawn_escrow_actor(
    escrow: VotingEscrow,
    storage: Arc<Storage>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    mailbox_capacity: usize,
) -> (EscrowHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = EscrowActor::new(escrow, storage, clock, metrics, rx);
    let task = tokio::spawn(actor.run());
    (EscrowHandle::new(tx), task)
}
