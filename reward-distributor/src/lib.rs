//! Cumulative Merkle reward distribution
//!
//! Each epoch the guardian publishes the root of a Merkle tree whose leaves
//! hold every account's cumulative entitlement. Accounts claim with a proof
//! and receive the difference to what they were already paid.
//!
//! # Example
//!
//! ```no_run
//! use escrow_core::AccountId;
//! use reward_distributor::{MerkleDistribution, MerkleLeaf, RewardLedger};
//!
//! fn main() -> reward_distributor::Result<()> {
//!     let guardian = AccountId::derive("guardian");
//!     let alice = AccountId::derive("alice");
//!
//!     let leaves = [MerkleLeaf { index: 0, account: alice, amount: 1_000 }];
//!     let dist = MerkleDistribution::build(&leaves)?;
//!
//!     let mut ledger = RewardLedger::new(guardian);
//!     ledger.update_root(guardian, dist.root)?;
//!
//!     let claim = &dist.claims[0];
//!     let receipt = ledger.claim(alice, claim.index, alice, claim.amount, &claim.proof)?;
//!     println!("paid {}", receipt.amount);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod distribution;
pub mod error;
pub mod merkle;
pub mod rewards;
pub mod types;

// Re-exports
pub use config::Config;
pub use distribution::{DistributionClaim, MerkleDistribution};
pub use error::{Error, Result};
pub use merkle::MerkleTree;
pub use rewards::{RewardLedger, RewardState};
pub use types::*;
