//! Vote-escrow ledger
//!
//! Accounts lock tokens until a week-aligned end time and receive voting
//! power that decays linearly to zero at that end.
//!
//! # Architecture
//!
//! - **Checkpoint logs**: append-only global and per-account bias/slope points
//! - **Slope schedule**: expiring locks cancel their decay at their end week
//! - **Single Writer**: one actor task owns the state and commits each
//!   operation atomically to RocksDB
//! - **Historical queries**: binary search over the point logs by block height
//!
//! # Invariants
//!
//! - Failed operations leave every record unchanged
//! - Σ voting power of all accounts == total voting power
//! - Deterministic replay: same operations at the same blocks → same state

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod error;
pub mod escrow;
pub mod ledger;
pub mod math;
pub mod metrics;
pub mod query;
pub mod storage;
pub mod types;

// Re-exports
pub use actor::{EscrowHandle, EscrowSummary};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use escrow::{Governance, PenaltyPayout, StateChange, VotingEscrow};
pub use ledger::EscrowLedger;
pub use storage::Storage;
pub use types::{AccountId, BlockContext, Lock, Point};
