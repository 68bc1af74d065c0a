//! Append-only checkpoint logs
//!
//! # Layout
//!
//! - Global log: index 0 is the genesis point, `global_epoch` is the last index
//! - Per-account logs: epochs are 1-based, epoch 0 means "never checkpointed"
//! - Slope-change schedule: slope delta applied to the global slope at a
//!   week-aligned timestamp (positive, since it cancels an expiring lock)
//!
//! Points are never edited once appended; historical queries binary search
//! these logs by block height.

use crate::math::{floor_to_week, PRECISION, WEEK};
use crate::types::{AccountId, BlockContext, Point};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Global and per-account point logs plus the slope-change schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointStore {
    global: Vec<Point>,
    users: HashMap<AccountId, Vec<Point>>,
    slope_changes: BTreeMap<u64, i128>,
}

/// Result of walking the global point forward to the current block
#[derive(Debug, Clone)]
pub struct Replay {
    /// Points recorded at each crossed week boundary (excluding "now")
    pub boundaries: Vec<Point>,
    /// Global point at the current block, before any account adjustment
    pub current: Point,
}

impl CheckpointStore {
    /// Create a store whose genesis point sits at `genesis`
    pub fn new(genesis: BlockContext) -> Self {
        Self {
            global: vec![Point::zero_at(genesis)],
            users: HashMap::new(),
            slope_changes: BTreeMap::new(),
        }
    }

    /// Rebuild a store from persisted parts
    pub fn from_parts(
        global: Vec<Point>,
        users: HashMap<AccountId, Vec<Point>>,
        slope_changes: BTreeMap<u64, i128>,
    ) -> Self {
        Self {
            global,
            users,
            slope_changes,
        }
    }

    /// Append a global point, returning its epoch
    pub fn append_global(&mut self, point: Point) -> u64 {
        self.global.push(point);
        self.global_epoch()
    }

    /// Append a point to an account's log, returning its epoch
    pub fn append_user(&mut self, account: AccountId, point: Point) -> u64 {
        let log = self.users.entry(account).or_default();
        log.push(point);
        log.len() as u64
    }

    /// Latest global point
    pub fn latest_global(&self) -> Point {
        // Genesis point is always present
        self.global.last().copied().unwrap_or_default()
    }

    /// Latest point of an account, if it was ever checkpointed
    pub fn latest_user(&self, account: &AccountId) -> Option<Point> {
        self.users.get(account).and_then(|log| log.last().copied())
    }

    /// Index of the latest global point
    pub fn global_epoch(&self) -> u64 {
        self.global.len().saturating_sub(1) as u64
    }

    /// Number of points recorded for an account
    pub fn user_epoch(&self, account: &AccountId) -> u64 {
        self.users.get(account).map_or(0, |log| log.len() as u64)
    }

    /// Global point at `epoch`
    pub fn global_point(&self, epoch: u64) -> Option<Point> {
        self.global.get(epoch as usize).copied()
    }

    /// Account point at 1-based `epoch`
    pub fn user_point(&self, account: &AccountId, epoch: u64) -> Option<Point> {
        if epoch == 0 {
            return None;
        }
        self.users
            .get(account)
            .and_then(|log| log.get(epoch as usize - 1).copied())
    }

    /// Scheduled slope delta at `time`
    pub fn slope_change(&self, time: u64) -> i128 {
        self.slope_changes.get(&time).copied().unwrap_or(0)
    }

    /// Overwrite the scheduled slope delta at `time`
    pub fn set_slope_change(&mut self, time: u64, delta: i128) {
        if delta == 0 {
            self.slope_changes.remove(&time);
        } else {
            self.slope_changes.insert(time, delta);
        }
    }

    /// Walk the latest global point forward to `now`, one week at a time,
    /// applying scheduled slope changes at each boundary.
    ///
    /// Cost is proportional to the number of weeks since the last global
    /// checkpoint. Block heights of the boundary points are interpolated
    /// between the last point and `now`.
    pub fn replay_to(&self, now: BlockContext) -> Replay {
        let initial = self.latest_global();
        // Clocks never run backwards relative to the log
        let now = BlockContext::new(
            now.height.max(initial.blk),
            now.timestamp.max(initial.ts),
        );
        let mut point = initial;
        let mut last_checkpoint = initial.ts;

        // dblock/dt, scaled by PRECISION
        let block_slope = if now.timestamp > initial.ts {
            (PRECISION * now.height.saturating_sub(initial.blk) as u128)
                / (now.timestamp - initial.ts) as u128
        } else {
            0
        };

        let mut boundaries = Vec::new();
        let mut t = floor_to_week(last_checkpoint);
        loop {
            t += WEEK;
            let mut d_slope = 0;
            if t > now.timestamp {
                t = now.timestamp;
            } else {
                d_slope = self.slope_change(t);
            }

            point.bias += point.slope * (t - last_checkpoint) as i128;
            point.slope += d_slope;
            if point.bias < 0 {
                point.bias = 0;
            }
            if point.slope > 0 {
                point.slope = 0;
            }
            last_checkpoint = t;
            point.ts = t;
            point.blk =
                initial.blk + ((block_slope * (t - initial.ts) as u128) / PRECISION) as u64;

            if t == now.timestamp {
                point.blk = now.height;
                break;
            }
            boundaries.push(point);
        }

        Replay {
            boundaries,
            current: point,
        }
    }

    /// Latest global epoch whose block height is `<= blk` (binary search)
    pub fn find_global_epoch(&self, blk: u64) -> u64 {
        let mut min = 0usize;
        let mut max = self.global.len().saturating_sub(1);
        while min < max {
            let mid = (min + max + 1) / 2;
            if self.global[mid].blk <= blk {
                min = mid;
            } else {
                max = mid - 1;
            }
        }
        min as u64
    }

    /// Latest account epoch whose block height is `<= blk`; 0 when none
    pub fn find_user_epoch(&self, account: &AccountId, blk: u64) -> u64 {
        let log = match self.users.get(account) {
            Some(log) => log,
            None => return 0,
        };
        // Epochs are 1-based; epoch 0 stands for "before the first point"
        let mut min = 0usize;
        let mut max = log.len();
        while min < max {
            let mid = (min + max + 1) / 2;
            if log[mid - 1].blk <= blk {
                min = mid;
            } else {
                max = mid - 1;
            }
        }
        min as u64
    }

    pub(crate) fn slope_schedule(&self) -> &BTreeMap<u64, i128> {
        &self.slope_changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genesis() -> BlockContext {
        BlockContext::new(100, 10 * WEEK)
    }

    #[test]
    fn test_genesis_point() {
        let store = CheckpointStore::new(genesis());
        assert_eq!(store.global_epoch(), 0);
        let point = store.latest_global();
        assert_eq!(point.ts, 10 * WEEK);
        assert_eq!(point.blk, 100);
        assert_eq!(point.bias, 0);
    }

    #[test]
    fn test_append_user_epochs_are_one_based() {
        let mut store = CheckpointStore::new(genesis());
        let alice = AccountId::derive("alice");
        assert_eq!(store.user_epoch(&alice), 0);
        assert!(store.latest_user(&alice).is_none());

        let epoch = store.append_user(alice, Point::zero_at(genesis()));
        assert_eq!(epoch, 1);
        assert!(store.user_point(&alice, 0).is_none());
        assert!(store.user_point(&alice, 1).is_some());
    }

    #[test]
    fn test_replay_within_same_week() {
        let store = CheckpointStore::new(genesis());
        let now = BlockContext::new(110, 10 * WEEK + 120);
        let replay = store.replay_to(now);
        assert!(replay.boundaries.is_empty());
        assert_eq!(replay.current.ts, now.timestamp);
        assert_eq!(replay.current.blk, now.height);
    }

    #[test]
    fn test_replay_records_each_week_boundary() {
        let mut store = CheckpointStore::new(genesis());
        store.append_global(Point {
            bias: 3 * WEEK as i128 * 10,
            slope: -10,
            ts: 10 * WEEK,
            blk: 100,
        });
        store.set_slope_change(13 * WEEK, 10);

        let now = BlockContext::new(400, 15 * WEEK + 5);
        let replay = store.replay_to(now);

        // Boundaries at weeks 11..=15
        assert_eq!(replay.boundaries.len(), 5);
        assert_eq!(replay.boundaries[0].bias, 2 * WEEK as i128 * 10);
        assert_eq!(replay.boundaries[2].bias, 0);
        assert_eq!(replay.boundaries[2].slope, 0);
        assert_eq!(replay.current.bias, 0);
        assert_eq!(replay.current.blk, 400);

        // Interpolated heights are monotonic
        let heights: Vec<u64> = replay.boundaries.iter().map(|p| p.blk).collect();
        assert!(heights.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_binary_search_by_height() {
        let mut store = CheckpointStore::new(genesis());
        for (i, blk) in [110u64, 120, 130].iter().enumerate() {
            store.append_global(Point {
                bias: 0,
                slope: 0,
                ts: 10 * WEEK + i as u64,
                blk: *blk,
            });
        }
        assert_eq!(store.find_global_epoch(99), 0);
        assert_eq!(store.find_global_epoch(100), 0);
        assert_eq!(store.find_global_epoch(119), 1);
        assert_eq!(store.find_global_epoch(120), 2);
        assert_eq!(store.find_global_epoch(1_000), 3);

        let alice = AccountId::derive("alice");
        assert_eq!(store.find_user_epoch(&alice, 1_000), 0);
        store.append_user(alice, Point { bias: 1, slope: 0, ts: 0, blk: 115 });
        store.append_user(alice, Point { bias: 2, slope: 0, ts: 0, blk: 125 });
        assert_eq!(store.find_user_epoch(&alice, 114), 0);
        assert_eq!(store.find_user_epoch(&alice, 115), 1);
        assert_eq!(store.find_user_epoch(&alice, 124), 1);
        assert_eq!(store.find_user_epoch(&alice, 500), 2);
    }

    #[test]
    fn test_zero_slope_change_is_removed() {
        let mut store = CheckpointStore::new(genesis());
        store.set_slope_change(WEEK, 5);
        assert_eq!(store.slope_change(WEEK), 5);
        store.set_slope_change(WEEK, 0);
        assert_eq!(store.slope_change(WEEK), 0);
        assert!(store.slope_schedule().is_empty());
    }
}
