//! Reward calculator
//!
//! Linear, non-compounding proration of a pool's APY over the time since the
//! position's last claim:
//!
//! ```text
//! reward = amount * apy * (min(now, end_time) - last_claim_at) / 365 days
//! ```
//!
//! Pure: no storage access, safe to call for previews outside a unit of work.

use crate::{
    error::{Error, Result},
    types::{Pool, StakePosition},
};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

/// Milliseconds in a 365-day year
pub const MILLIS_PER_YEAR: i64 = 365 * 24 * 60 * 60 * 1000;

/// Decimal places kept on every distributed reward
pub const REWARD_SCALE: u32 = 18;

/// Reward accrued by `position` in `pool` as of `now`
///
/// Accrual stops at `pool.end_time`. An accrual window that is empty or
/// negative (claim after pool close, clock skew) yields zero, never a
/// negative amount. The result is truncated to [`REWARD_SCALE`] places so
/// the ledger never pays out more than accrued.
pub fn accrued_reward(position: &StakePosition, pool: &Pool, now: DateTime<Utc>) -> Result<Decimal> {
    let clamped_now = now.min(pool.end_time);
    let elapsed_ms = (clamped_now - position.last_claim_at).num_milliseconds();

    if elapsed_ms <= 0 || position.amount <= Decimal::ZERO || pool.apy <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }

    // Year fraction first: amount * elapsed_ms alone can exceed Decimal::MAX
    let reward = pool
        .apy
        .checked_mul(Decimal::from(elapsed_ms))
        .and_then(|v| v.checked_div(Decimal::from(MILLIS_PER_YEAR)))
        .and_then(|rate| rate.checked_mul(position.amount))
        .ok_or_else(|| {
            Error::Arithmetic(format!(
                "reward for amount {} at apy {} over {}ms",
                position.amount, pool.apy, elapsed_ms
            ))
        })?;

    Ok(reward
        .round_dp_with_strategy(REWARD_SCALE, RoundingStrategy::ToZero)
        .max(Decimal::ZERO)
        .normalize())
}
