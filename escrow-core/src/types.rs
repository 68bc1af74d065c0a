//! Core types for the escrow ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact integer arithmetic (fixed-point, no floats)

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of an account address in bytes
pub const ADDRESS_LEN: usize = 20;

/// Account identifier (20-byte address)
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId([u8; ADDRESS_LEN]);

impl AccountId {
    /// The zero address
    pub const ZERO: AccountId = AccountId([0u8; ADDRESS_LEN]);

    /// Create account ID from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Derive a deterministic address from a label (first 20 bytes of SHA-256)
    pub fn derive(label: &str) -> Self {
        let digest: [u8; 32] = Sha256::digest(label.as_bytes()).into();
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(bytes)
    }

    /// Parse from hex, with or without `0x` prefix
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(trimmed)
            .map_err(|e| crate::Error::InvalidAccountId(format!("{}: {}", s, e)))?;
        let bytes: [u8; ADDRESS_LEN] = raw.try_into().map_err(|_| {
            crate::Error::InvalidAccountId(format!("{}: expected {} bytes", s, ADDRESS_LEN))
        })?;
        Ok(Self(bytes))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self)
    }
}

impl TryFrom<String> for AccountId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<AccountId> for String {
    fn from(id: AccountId) -> Self {
        id.to_string()
    }
}

/// Position on the chain: monotonic sequence number plus wall-clock seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    /// Block height (the sequence number used by historical queries)
    pub height: u64,
    /// Unix timestamp in seconds
    pub timestamp: u64,
}

impl BlockContext {
    /// Create a new block context
    pub fn new(height: u64, timestamp: u64) -> Self {
        Self { height, timestamp }
    }
}

/// Escrowed lock of a single account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lock {
    /// Principal currently escrowed
    pub amount: u128,

    /// Amount whose voting power accrues to this account (own + delegators)
    pub delegated: u128,

    /// Expiry timestamp, always a multiple of `WEEK` (0 when never locked)
    pub end: u64,

    /// Account that receives this lock's voting power
    pub delegatee: AccountId,
}

impl Lock {
    /// Empty lock owned by `owner`
    pub fn empty(owner: AccountId) -> Self {
        Self {
            amount: 0,
            delegated: 0,
            end: 0,
            delegatee: owner,
        }
    }

    /// Lock is live (principal escrowed and not yet expired)
    pub fn is_active(&self, now: u64) -> bool {
        self.amount > 0 && self.end > now
    }

    /// Voting power is routed to `owner` itself
    pub fn is_self_delegated(&self, owner: &AccountId) -> bool {
        self.delegatee == *owner
    }
}

/// Linear decay checkpoint: `bias(t) = max(bias + slope * (t - ts), 0)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Voting power at `ts` (never negative)
    pub bias: i128,
    /// Decay per second (never positive)
    pub slope: i128,
    /// Timestamp of the checkpoint
    pub ts: u64,
    /// Block height of the checkpoint
    pub blk: u64,
}

impl Point {
    /// Point at the given block with zero power
    pub fn zero_at(block: BlockContext) -> Self {
        Self {
            bias: 0,
            slope: 0,
            ts: block.timestamp,
            blk: block.height,
        }
    }

    /// Voting power at time `t >= ts`
    pub fn value_at(&self, t: u64) -> u128 {
        let dt = t.saturating_sub(self.ts);
        crate::math::decayed_bias(self.bias, self.slope, dt)
    }
}
