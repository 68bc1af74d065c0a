//! Block clock used to stamp checkpoints
//!
//! The ledger never reads wall-clock time directly. Every operation asks its
//! [`Clock`] for the current [`BlockContext`], so replaying the same sequence
//! of operations against the same clock readings reproduces the same state.

use crate::types::BlockContext;
use chrono::Utc;
use parking_lot::Mutex;

/// Source of the current block height and timestamp
pub trait Clock: Send + Sync {
    /// Current block
    fn now(&self) -> BlockContext;
}

/// Wall-clock based clock; height advances once per `block_time_secs`
#[derive(Debug, Clone)]
pub struct SystemClock {
    genesis_timestamp: u64,
    block_time_secs: u64,
}

impl SystemClock {
    /// Create a clock whose height 0 starts at `genesis_timestamp`
    pub fn new(genesis_timestamp: u64, block_time_secs: u64) -> Self {
        Self {
            genesis_timestamp,
            block_time_secs: block_time_secs.max(1),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> BlockContext {
        let timestamp = Utc::now().timestamp().max(0) as u64;
        let height = timestamp.saturating_sub(self.genesis_timestamp) / self.block_time_secs;
        BlockContext::new(height, timestamp)
    }
}

/// Manually driven clock for tests and deterministic replay
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<BlockContext>,
}

impl ManualClock {
    /// Create a clock positioned at `block`
    pub fn new(block: BlockContext) -> Self {
        Self {
            current: Mutex::new(block),
        }
    }

    /// Move forward by `blocks` and `seconds`
    pub fn advance(&self, blocks: u64, seconds: u64) -> BlockContext {
        let mut current = self.current.lock();
        current.height += blocks;
        current.timestamp += seconds;
        *current
    }
}

impl Clock for ManualClock {
    fn now(&self) -> BlockContext {
        *self.current.lock()
    }
}
