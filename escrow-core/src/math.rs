//! Fixed-point time math for linear voting-power decay
//!
//! Pure functions only. Amounts are `u128`, bias/slope are `i128` with a
//! non-positive slope.

/// Rounding unit for lock ends (one week)
pub const WEEK: u64 = 7 * 86_400;

/// Maximum lock duration (two years)
pub const MAXTIME: u64 = 730 * 86_400;

/// Fixed-point unit (1e18 == 100%)
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Round a timestamp down to the start of its week
pub fn floor_to_week(t: u64) -> u64 {
    (t / WEEK) * WEEK
}

/// `max(bias + slope * dt, 0)`
pub fn decayed_bias(bias: i128, slope: i128, dt: u64) -> u128 {
    let value = bias.saturating_add(slope.saturating_mul(dt as i128));
    if value > 0 {
        value as u128
    } else {
        0
    }
}

/// Decay rate for a lock of `amount`: `-floor(amount / MAXTIME)`
pub fn slope_for_lock(amount: u128) -> i128 {
    -((amount / MAXTIME as u128) as i128)
}

/// Initial voting power: `floor(amount / MAXTIME) * lock_seconds`
pub fn bias_for_new_lock(amount: u128, lock_seconds: u64) -> i128 {
    -slope_for_lock(amount) * lock_seconds as i128
}

/// Penalty rate for quitting with `end - now` seconds left, capped at `max_rate`
pub fn penalty_rate(max_rate: u128, end: u64, now: u64) -> u128 {
    if end <= now {
        return 0;
    }
    let remaining = (end - now) as u128;
    let scaled = max_rate.saturating_mul(remaining) / MAXTIME as u128;
    scaled.min(max_rate)
}

/// Penalty charged on `amount` at `rate` (fixed point, PRECISION = 100%)
pub fn penalty_amount(rate: u128, amount: u128) -> u128 {
    mul_div(rate, amount, PRECISION)
}

/// `a * b / denom` without intermediate overflow for values below 2^128
pub fn mul_div(a: u128, b: u128, denom: u128) -> u128 {
    if denom == 0 {
        return 0;
    }
    match a.checked_mul(b) {
        Some(product) => product / denom,
        None => {
            // Split `a` into quotient and remainder by `denom`
            let q = a / denom;
            let r = a % denom;
            q.saturating_mul(b)
                .saturating_add(r.checked_mul(b).map(|v| v / denom).unwrap_or_else(|| {
                    let bq = b / denom;
                    let br = b % denom;
                    r.saturating_mul(bq)
                        .saturating_add(r.saturating_mul(br) / denom)
                }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_to_week() {
        assert_eq!(floor_to_week(0), 0);
        assert_eq!(floor_to_week(WEEK - 1), 0);
        assert_eq!(floor_to_week(WEEK), WEEK);
        assert_eq!(floor_to_week(3 * WEEK + 17), 3 * WEEK);
    }

    #[test]
    fn test_decayed_bias() {
        assert_eq!(decayed_bias(1000, -10, 0), 1000);
        assert_eq!(decayed_bias(1000, -10, 50), 500);
        assert_eq!(decayed_bias(1000, -10, 100), 0);
        assert_eq!(decayed_bias(1000, -10, 1_000), 0);
    }

    #[test]
    fn test_new_lock_bias_and_slope() {
        let amount = MAXTIME as u128 * 5 + 7;
        assert_eq!(slope_for_lock(amount), -5);
        assert_eq!(bias_for_new_lock(amount, WEEK), 5 * WEEK as i128);
        // Amounts below MAXTIME carry no voting power
        assert_eq!(slope_for_lock(MAXTIME as u128 - 1), 0);
    }

    #[test]
    fn test_penalty_rate_bounds() {
        let now = 1_000;
        assert_eq!(penalty_rate(PRECISION, now, now), 0);
        assert_eq!(penalty_rate(PRECISION, now - 1, now), 0);
        assert_eq!(penalty_rate(PRECISION, now + MAXTIME, now), PRECISION);
        assert_eq!(penalty_rate(PRECISION, now + MAXTIME / 2, now), PRECISION / 2);
        assert_eq!(penalty_rate(0, now + MAXTIME, now), 0);
    }

    #[test]
    fn test_penalty_amount() {
        let amount = 1_000 * PRECISION;
        assert_eq!(penalty_amount(PRECISION, amount), amount);
        assert_eq!(penalty_amount(PRECISION / 4, amount), amount / 4);
        assert_eq!(penalty_amount(0, amount), 0);
    }

    #[test]
    fn test_mul_div_large_operands() {
        let big = u128::MAX / 3;
        assert_eq!(mul_div(big, PRECISION, PRECISION), big);
        assert_eq!(mul_div(PRECISION, big, PRECISION), big);
        assert_eq!(mul_div(7, 3, 2), 10);
        assert_eq!(mul_div(7, 3, 0), 0);
    }
}
