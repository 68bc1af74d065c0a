//! Cumulative Merkle reward ledger
//!
//! The guardian publishes a root committing to every account's cumulative
//! entitlement. A claim pays the difference between the proven cumulative
//! amount and what the account has already been paid, so re-claiming an
//! epoch pays nothing and skipping epochs loses nothing.

use crate::config::Config;
use crate::merkle::{leaf_hash, verify_proof};
use crate::types::{ClaimReceipt, ClaimRecord, MerkleLeaf, NodeHash, RewardEpoch};
use crate::{Error, Result};
use escrow_core::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Persisted reward ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardState {
    /// Account allowed to publish roots
    pub guardian: AccountId,
    /// Current root and epoch
    pub current: RewardEpoch,
    /// Per-account claim records
    pub claims: BTreeMap<AccountId, ClaimRecord>,
    /// Sum of all payouts
    pub total_claimed: u128,
}

impl RewardState {
    /// Fresh state with no published root
    pub fn new(guardian: AccountId) -> Self {
        Self {
            guardian,
            current: RewardEpoch::default(),
            claims: BTreeMap::new(),
            total_claimed: 0,
        }
    }
}

/// Reward ledger with optional JSON persistence
#[derive(Debug)]
pub struct RewardLedger {
    state: RewardState,
    path: Option<PathBuf>,
}

impl RewardLedger {
    /// In-memory ledger
    pub fn new(guardian: AccountId) -> Self {
        Self {
            state: RewardState::new(guardian),
            path: None,
        }
    }

    /// Open the ledger from the configured state file, creating it if missing
    pub fn open(config: &Config) -> Result<Self> {
        let Some(path) = config.state_file.clone() else {
            return Ok(Self::new(config.guardian));
        };

        let state = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let state: RewardState = serde_json::from_str(&content)?;
            tracing::info!(
                epoch = state.current.epoch,
                root = %state.current.root,
                accounts = state.claims.len(),
                "Restored reward state"
            );
            state
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let state = RewardState::new(config.guardian);
            write_state(&path, &state)?;
            tracing::info!(guardian = %config.guardian, "Initialised reward state");
            state
        };

        Ok(Self {
            state,
            path: Some(path),
        })
    }

    /// Publish a new root; returns the new epoch
    pub fn update_root(&mut self, caller: AccountId, root: NodeHash) -> Result<u64> {
        self.ensure_guardian(caller, "update_root")?;

        let previous = self.state.current;
        self.state.current = RewardEpoch {
            root,
            epoch: previous.epoch + 1,
        };
        if let Err(e) = self.persist() {
            self.state.current = previous;
            return Err(e);
        }

        tracing::info!(root = %root, epoch = self.state.current.epoch, "Reward root updated");
        Ok(self.state.current.epoch)
    }

    /// Hand root publication to another account
    pub fn set_guardian(&mut self, caller: AccountId, guardian: AccountId) -> Result<()> {
        self.ensure_guardian(caller, "set_guardian")?;

        let previous = self.state.guardian;
        self.state.guardian = guardian;
        if let Err(e) = self.persist() {
            self.state.guardian = previous;
            return Err(e);
        }

        tracing::info!(guardian = %guardian, "Guardian changed");
        Ok(())
    }

    /// Amount `account` could claim now with the given leaf and proof
    pub fn unclaimed_reward(
        &self,
        caller: AccountId,
        index: u64,
        account: AccountId,
        cumulative_amount: u128,
        proof: &[NodeHash],
    ) -> Result<u128> {
        let leaf = leaf_hash(&MerkleLeaf {
            index,
            account,
            amount: cumulative_amount,
        });
        if !verify_proof(proof, &self.state.current.root, &leaf) {
            return Err(Error::InvalidMerkleProof);
        }
        if caller != account {
            return Err(Error::InvalidAccount);
        }

        let claimed = self.claimed(&account).total_claimed;
        Ok(cumulative_amount.saturating_sub(claimed))
    }

    /// Claim to the account itself
    pub fn claim(
        &mut self,
        caller: AccountId,
        index: u64,
        account: AccountId,
        cumulative_amount: u128,
        proof: &[NodeHash],
    ) -> Result<ClaimReceipt> {
        self.claim_to_other_address(caller, index, account, cumulative_amount, account, proof)
    }

    /// Claim and pay `recipient`; the claimant must be the caller
    pub fn claim_to_other_address(
        &mut self,
        caller: AccountId,
        index: u64,
        account: AccountId,
        cumulative_amount: u128,
        recipient: AccountId,
        proof: &[NodeHash],
    ) -> Result<ClaimReceipt> {
        let amount = self.unclaimed_reward(caller, index, account, cumulative_amount, proof)?;
        let epoch = self.state.current.epoch;
        let receipt = ClaimReceipt {
            account,
            recipient,
            amount,
            epoch,
        };

        if amount == 0 {
            tracing::debug!(account = %account, epoch, "Nothing left to claim");
            return Ok(receipt);
        }

        let total_claimed = self
            .state
            .total_claimed
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        let previous_record = self.state.claims.insert(
            account,
            ClaimRecord {
                total_claimed: cumulative_amount,
                last_claimed_epoch: epoch,
            },
        );
        let previous_total = std::mem::replace(&mut self.state.total_claimed, total_claimed);

        if let Err(e) = self.persist() {
            match previous_record {
                Some(record) => self.state.claims.insert(account, record),
                None => self.state.claims.remove(&account),
            };
            self.state.total_claimed = previous_total;
            return Err(e);
        }

        tracing::info!(
            account = %account,
            recipient = %recipient,
            amount,
            epoch,
            "Reward claimed"
        );
        Ok(receipt)
    }

    /// Claim record of `account` (zeroed when it never claimed)
    pub fn claimed(&self, account: &AccountId) -> ClaimRecord {
        self.state.claims.get(account).copied().unwrap_or_default()
    }

    /// Current root and epoch
    pub fn current(&self) -> RewardEpoch {
        self.state.current
    }

    /// Current guardian
    pub fn guardian(&self) -> AccountId {
        self.state.guardian
    }

    /// Sum of all payouts
    pub fn total_claimed(&self) -> u128 {
        self.state.total_claimed
    }

    /// Full state snapshot
    pub fn state(&self) -> &RewardState {
        &self.state
    }

    fn ensure_guardian(&self, caller: AccountId, operation: &str) -> Result<()> {
        if caller != self.state.guardian {
            tracing::warn!(caller = %caller, operation, "Rejected non-guardian call");
            return Err(Error::Unauthorized(format!(
                "{} requires the guardian, called by {}",
                operation, caller
            )));
        }
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        match &self.path {
            Some(path) => write_state(path, &self.state),
            None => Ok(()),
        }
    }
}

/// Replace the state file atomically (write then rename)
fn write_state(path: &Path, state: &RewardState) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
