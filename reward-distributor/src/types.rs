//! Core types for cumulative reward distribution

use escrow_core::AccountId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// SHA-256 digest of a leaf or internal node
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeHash(
    /// Raw digest bytes
    pub [u8; 32],
);

impl NodeHash {
    /// All-zero hash, the root before any distribution is published
    pub const ZERO: NodeHash = NodeHash([0u8; 32]);

    /// Parse from hex, with or without `0x` prefix
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(trimmed)
            .map_err(|e| crate::Error::Config(format!("invalid hash {}: {}", s, e)))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| crate::Error::Config(format!("invalid hash {}: expected 32 bytes", s)))?;
        Ok(Self(bytes))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeHash({})", self)
    }
}

impl TryFrom<String> for NodeHash {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<NodeHash> for String {
    fn from(hash: NodeHash) -> Self {
        hash.to_string()
    }
}

/// One entry of a distribution: the running total an account may have claimed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleLeaf {
    /// Position of the leaf, unique within a distribution
    pub index: u64,
    /// Beneficiary
    pub account: AccountId,
    /// Cumulative amount owed since the first distribution
    pub amount: u128,
}

/// Published root and its sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEpoch {
    /// Current Merkle root
    pub root: NodeHash,
    /// Incremented on every root update
    pub epoch: u64,
}

impl Default for RewardEpoch {
    fn default() -> Self {
        Self {
            root: NodeHash::ZERO,
            epoch: 0,
        }
    }
}

/// Per-account claim bookkeeping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Cumulative amount already paid out (never decreases)
    pub total_claimed: u128,
    /// Epoch of the last paying claim
    pub last_claimed_epoch: u64,
}

/// Outcome of a claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    /// Account whose leaf was claimed
    pub account: AccountId,
    /// Account receiving the payout
    pub recipient: AccountId,
    /// Amount paid by this claim (zero when nothing new is owed)
    pub amount: u128,
    /// Epoch the claim was verified against
    pub epoch: u64,
}
