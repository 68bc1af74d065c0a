//! Main escrow orchestration layer
//!
//! Opens storage, restores (or initialises) the escrow state and spawns the
//! single-writer actor. All operations go through the [`EscrowHandle`] this
//! facade dereferences to.
//!
//! # Example
//!
//! ```no_run
//! use escrow_core::{clock::SystemClock, Config, EscrowLedger};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> escrow_core::Result<()> {
//!     let config = Config::default();
//!     let clock = Arc::new(SystemClock::new(
//!         config.clock.genesis_timestamp,
//!         config.clock.block_time_secs,
//!     ));
//!     let ledger = EscrowLedger::open(config, clock).await?;
//!
//!     let supply = ledger.total_supply().await?;
//!     println!("voting power: {}", supply);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_escrow_actor, EscrowHandle},
    clock::Clock,
    escrow::{Governance, VotingEscrow},
    metrics::Metrics,
    Config, Error, Result, Storage,
};
use std::ops::Deref;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Main escrow interface
#[derive(Debug)]
pub struct EscrowLedger {
    handle: EscrowHandle,
    task: JoinHandle<()>,
    metrics: Metrics,
    config: Config,
}

impl EscrowLedger {
    /// Open ledger with configuration
    pub async fn open(config: Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(Storage::open(&config)?);
        let stats = storage.get_stats()?;
        tracing::info!(
            locks = stats.locks,
            global_points = stats.global_points,
            user_points = stats.user_points,
            "Escrow storage opened"
        );

        let escrow = match storage.load_state()? {
            Some(state) => {
                tracing::info!(
                    global_epoch = state.checkpoints.global_epoch(),
                    supply = state.supply,
                    "Restored escrow state"
                );
                VotingEscrow::from_state(state, clock.clone())
            }
            None => {
                let governance = Governance {
                    owner: config.escrow.owner,
                    penalty_recipient: config.escrow.penalty_recipient,
                    max_penalty_rate: config.escrow.max_penalty_rate,
                    unlocked: false,
                };
                let mut escrow = VotingEscrow::new(clock.clone(), governance);
                storage.apply(&escrow.take_changes())?;
                tracing::info!(owner = %config.escrow.owner, "Initialised new escrow");
                escrow
            }
        };

        let metrics = Metrics::new().map_err(|e| Error::Other(e.to_string()))?;
        metrics.update_supply(escrow.supply());
        metrics.record_checkpoint(0, escrow.global_epoch());

        let (handle, task) = spawn_escrow_actor(
            escrow,
            storage,
            clock,
            metrics.clone(),
            config.actor.mailbox_capacity,
        );

        Ok(Self {
            handle,
            task,
            metrics,
            config,
        })
    }

    /// Cloneable handle for concurrent callers
    pub fn handle(&self) -> EscrowHandle {
        self.handle.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Stop the actor and wait until storage is released
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.task
            .await
            .map_err(|e| Error::Concurrency(format!("Escrow actor failed: {}", e)))
    }
}

impl Deref for EscrowLedger {
    type Target = EscrowHandle;

    fn deref(&self) -> &EscrowHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::math::{MAXTIME, WEEK};
    use crate::types::{AccountId, BlockContext};

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.data_dir = dir.to_path_buf();
        config.escrow.owner = AccountId::derive("owner");
        config
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let temp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(BlockContext::new(1, 5 * WEEK)));
        let ledger = EscrowLedger::open(test_config(temp.path()), clock)
            .await
            .unwrap();

        let summary = ledger.summary().await.unwrap();
        assert_eq!(summary.global_epoch, 0);
        assert_eq!(summary.governance.owner, AccountId::derive("owner"));
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ledger_rejects_penalty_rate_above_precision() {
        let temp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(BlockContext::new(1, 5 * WEEK)));
        let mut config = test_config(temp.path());
        config.escrow.max_penalty_rate = 2 * crate::math::PRECISION;

        let result = EscrowLedger::open(config, clock).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_ledger_reopens_committed_state() {
        let temp = tempfile::tempdir().unwrap();
        let clock = Arc::new(ManualClock::new(BlockContext::new(1, 5 * WEEK)));
        let alice = AccountId::derive("alice");
        let amount = MAXTIME as u128 * 3;

        let ledger = EscrowLedger::open(test_config(temp.path()), clock.clone())
            .await
            .unwrap();
        ledger.create_lock(alice, 9 * WEEK, amount).await.unwrap();
        clock.advance(10, WEEK);
        ledger.checkpoint().await.unwrap();
        let power = ledger.balance_of(alice).await.unwrap();
        let epoch = ledger.summary().await.unwrap().global_epoch;
        ledger.shutdown().await.unwrap();

        let reopened = EscrowLedger::open(test_config(temp.path()), clock.clone())
            .await
            .unwrap();
        assert_eq!(reopened.locked(alice).await.unwrap().amount, amount);
        assert_eq!(reopened.balance_of(alice).await.unwrap(), power);
        assert_eq!(reopened.summary().await.unwrap().global_epoch, epoch);
        assert_eq!(reopened.balance_of_at(alice, 1).await.unwrap(), 3 * 4 * WEEK as u128);
        reopened.shutdown().await.unwrap();
    }
}
