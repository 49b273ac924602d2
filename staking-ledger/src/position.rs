//! Position manager
//!
//! Creates, grows, shrinks and removes stake positions, and keeps each pool's
//! `total_staked` equal to the sum of its live position amounts. Every
//! function stages writes on the caller's unit of work; the aggregate and the
//! position always change in the same commit.

use crate::{
    error::{Error, Result},
    storage::{keys, ReadStore, Table},
    types::{Pool, PoolId, StakePosition, UserId},
    unit_of_work::UnitOfWork,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// What a stake did to the (user, pool) position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeOutcome {
    /// First stake, new position
    Opened,
    /// Added to an existing position
    Merged,
}

/// Open a position, or add to the existing one
///
/// A merge keeps `staked_at` and `last_claim_at`, so accrual continues on
/// the combined amount from the previous reference point.
pub fn open_or_merge(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    pool_id: PoolId,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(StakePosition, StakeOutcome)> {
    let (position, outcome) = match uow.position(user_id, pool_id)? {
        Some(mut position) => {
            let current = position.amount;
            position.amount = current
                .checked_add(amount)
                .ok_or_else(|| Error::Arithmetic(format!("{} + {}", current, amount)))?;
            position.updated_at = now;
            (position, StakeOutcome::Merged)
        }
        None => (
            StakePosition {
                user_id,
                pool_id,
                amount,
                reward: Decimal::ZERO,
                staked_at: now,
                last_claim_at: now,
                updated_at: now,
            },
            StakeOutcome::Opened,
        ),
    };

    put(uow, &position)?;
    Ok((position, outcome))
}

/// Shrink a position by `amount`, removing it when nothing is left
///
/// Returns the remaining position, or `None` when it was deleted. A partial
/// reduction resets `reward` and moves `last_claim_at` to `now`: the caller
/// has just paid out everything accrued.
pub fn reduce(
    uow: &mut UnitOfWork<'_>,
    position: &StakePosition,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Option<StakePosition>> {
    if amount > position.amount {
        return Err(Error::UnstakeExceedsPosition {
            requested: amount,
            staked: position.amount,
        });
    }

    if amount == position.amount {
        uow.delete(
            Table::Positions,
            keys::position(position.user_id, position.pool_id),
        );
        return Ok(None);
    }

    let mut remaining = position.clone();
    remaining.amount -= amount;
    remaining.reward = Decimal::ZERO;
    remaining.last_claim_at = now;
    remaining.updated_at = now;
    put(uow, &remaining)?;

    Ok(Some(remaining))
}

/// Reset accrual after a reward payout
pub fn mark_claimed(
    uow: &mut UnitOfWork<'_>,
    position: &StakePosition,
    now: DateTime<Utc>,
) -> Result<StakePosition> {
    let mut claimed = position.clone();
    claimed.reward = Decimal::ZERO;
    claimed.last_claim_at = now;
    claimed.updated_at = now;
    put(uow, &claimed)?;
    Ok(claimed)
}

/// Apply a signed delta to the pool's `total_staked`
pub fn adjust_pool_total(
    uow: &mut UnitOfWork<'_>,
    pool_id: PoolId,
    delta: Decimal,
    now: DateTime<Utc>,
) -> Result<Pool> {
    let mut pool = uow.pool(pool_id)?.ok_or(Error::PoolNotFound(pool_id))?;

    let total = pool
        .total_staked
        .checked_add(delta)
        .ok_or_else(|| Error::Arithmetic(format!("{} + {}", pool.total_staked, delta)))?;

    if total < Decimal::ZERO {
        return Err(Error::InvariantViolation(format!(
            "pool {} total_staked would become {}",
            pool_id, total
        )));
    }

    pool.total_staked = total;
    pool.updated_at = now;
    uow.put(Table::Pools, keys::pool(pool_id), &pool)?;

    Ok(pool)
}

fn put(uow: &mut UnitOfWork<'_>, position: &StakePosition) -> Result<()> {
    uow.put(
        Table::Positions,
        keys::position(position.user_id, position.pool_id),
        position,
    )
}
