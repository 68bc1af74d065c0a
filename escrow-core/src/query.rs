//! Historical voting-power queries
//!
//! Past sequences are block heights. A block's timestamp is estimated by
//! linear interpolation between the two global points surrounding it (or the
//! latest global point and the current block), then the matching point is
//! decayed to that time.

use crate::{
    checkpoint::CheckpointStore,
    escrow::VotingEscrow,
    math::{floor_to_week, WEEK},
    types::{AccountId, BlockContext, Point},
    Error, Result,
};

impl VotingEscrow {
    /// Voting power of `account` at block `seq`
    pub fn balance_of_at(&self, account: &AccountId, seq: u64) -> Result<u128> {
        let now = self.now();
        ensure_past(seq, now)?;
        let store = &self.state().checkpoints;

        let user_epoch = store.find_user_epoch(account, seq);
        let point = match store.user_point(account, user_epoch) {
            Some(point) => point,
            None => return Ok(0),
        };
        let block_time = estimate_block_time(store, seq, now);
        Ok(point.value_at(block_time))
    }

    /// Total voting power at the current time
    pub fn total_supply(&self) -> u128 {
        let now = self.now();
        let store = &self.state().checkpoints;
        supply_at(store, store.latest_global(), now.timestamp)
    }

    /// Total voting power at block `seq`
    pub fn total_supply_at(&self, seq: u64) -> Result<u128> {
        let now = self.now();
        ensure_past(seq, now)?;
        let store = &self.state().checkpoints;

        let epoch = store.find_global_epoch(seq);
        let point = store.global_point(epoch).unwrap_or_default();
        let block_time = estimate_block_time(store, seq, now);
        Ok(supply_at(store, point, block_time))
    }
}

fn ensure_past(seq: u64, now: BlockContext) -> Result<()> {
    if seq >= now.height {
        return Err(Error::OnlyPastSequenceAllowed);
    }
    Ok(())
}

/// Interpolated timestamp of block `seq`
fn estimate_block_time(store: &CheckpointStore, seq: u64, now: BlockContext) -> u64 {
    let epoch = store.find_global_epoch(seq);
    let point = store.global_point(epoch).unwrap_or_default();

    let (d_block, d_t) = match store.global_point(epoch + 1) {
        Some(next) => (next.blk - point.blk, next.ts - point.ts),
        None => (
            now.height.saturating_sub(point.blk),
            now.timestamp.saturating_sub(point.ts),
        ),
    };
    if d_block == 0 {
        return point.ts;
    }
    let elapsed_blocks = seq.saturating_sub(point.blk) as u128;
    point.ts + (d_t as u128 * elapsed_blocks / d_block as u128) as u64
}

/// Decay global `point` to time `t`, applying scheduled slope changes at each
/// week boundary crossed on the way
pub fn supply_at(store: &CheckpointStore, point: Point, t: u64) -> u128 {
    let mut last = point;
    let mut t_i = floor_to_week(last.ts);
    while t_i < t {
        t_i += WEEK;
        let mut d_slope = 0;
        if t_i > t {
            t_i = t;
        } else {
            d_slope = store.slope_change(t_i);
        }
        last.bias += last.slope * (t_i.saturating_sub(last.ts)) as i128;
        if t_i == t {
            break;
        }
        last.slope += d_slope;
        last.ts = t_i;
    }
    last.bias.max(0) as u128
}
