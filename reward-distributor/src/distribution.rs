//! Published reward distribution
//!
//! A distribution is what the off-chain side hands to claimants: the root the
//! guardian publishes plus, for each leaf, everything needed to call `claim`.

use crate::merkle::{sorted_by_index, MerkleTree};
use crate::types::{MerkleLeaf, NodeHash};
use crate::Result;
use escrow_core::AccountId;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Claim material for a single leaf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionClaim {
    /// Leaf index
    pub index: u64,
    /// Beneficiary
    pub account: AccountId,
    /// Cumulative amount
    pub amount: u128,
    /// Sibling path to the root
    pub proof: Vec<NodeHash>,
}

/// Root and per-leaf proofs of one reward epoch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleDistribution {
    /// Merkle root to publish
    pub root: NodeHash,
    /// Sum of all cumulative amounts
    pub total_amount: u128,
    /// One entry per leaf, in index order
    pub claims: Vec<DistributionClaim>,
}

impl MerkleDistribution {
    /// Build the tree and collect proofs for every leaf
    pub fn build(leaves: &[MerkleLeaf]) -> Result<Self> {
        let leaves = sorted_by_index(leaves)?;
        let tree = MerkleTree::build(&leaves)?;

        let mut total_amount: u128 = 0;
        let mut claims = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            total_amount = total_amount
                .checked_add(leaf.amount)
                .ok_or(crate::Error::Overflow)?;
            claims.push(DistributionClaim {
                index: leaf.index,
                account: leaf.account,
                amount: leaf.amount,
                proof: tree.proof(leaf.index).unwrap_or_default(),
            });
        }

        tracing::debug!(
            root = %tree.root(),
            leaves = leaves.len(),
            total_amount,
            "Built reward distribution"
        );

        Ok(Self {
            root: tree.root(),
            total_amount,
            claims,
        })
    }

    /// Claim material for `account`, if it has a leaf
    pub fn claim_for(&self, account: &AccountId) -> Option<&DistributionClaim> {
        self.claims.iter().find(|c| &c.account == account)
    }

    /// Read a distribution from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the distribution as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
