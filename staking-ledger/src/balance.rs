//! Balance mutator
//!
//! Guarded increment/decrement of a user's per-asset holdings inside a unit
//! of work. Each primitive reads the row through the unit of work, applies
//! the delta, and refuses any result below zero, so `available >= 0` and
//! `locked >= 0` hold for every committed row.
//!
//! None of these write trail entries; callers append the record that gives
//! the movement its kind.

use crate::{
    error::{Error, Result},
    storage::{keys, ReadStore, Table},
    types::{Asset, UserAssetBalance, UserId},
    unit_of_work::UnitOfWork,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Symbol -> asset, `AssetNotFound` when unregistered
pub fn resolve_asset<S: ReadStore>(store: &S, symbol: &str) -> Result<Asset> {
    store
        .asset_by_symbol(symbol)?
        .ok_or_else(|| Error::AssetNotFound(symbol.to_string()))
}

/// Credit `amount` to `available`, creating the balance row on first credit
pub fn distribute(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    symbol: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<UserAssetBalance> {
    let asset = resolve_asset(&*uow, symbol)?;

    let mut row = match uow.balance(user_id, asset.id)? {
        Some(row) => row,
        None => UserAssetBalance::new(user_id, asset.id, now),
    };

    row.available = checked_add(row.available, amount)?;
    row.updated_at = now;
    store(uow, &row)?;

    tracing::debug!(
        user_id = %user_id,
        asset = %symbol,
        amount = %amount,
        available = %row.available,
        "Balance credited"
    );

    Ok(row)
}

/// Move `amount` from `available` to `locked`
pub fn lock(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    asset: &Asset,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<UserAssetBalance> {
    let mut row = existing(uow, user_id, asset)?;

    if row.available < amount {
        return Err(Error::InsufficientBalance {
            required: amount,
            available: row.available,
        });
    }

    row.available -= amount;
    row.locked = checked_add(row.locked, amount)?;
    row.updated_at = now;
    store(uow, &row)?;

    Ok(row)
}

/// Move `amount` from `locked` back to `available`
pub fn unlock(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    asset: &Asset,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<UserAssetBalance> {
    let mut row = existing(uow, user_id, asset)?;

    if row.locked < amount {
        return Err(Error::InvariantViolation(format!(
            "user {} has {} {} locked, cannot release {}",
            user_id, row.locked, asset.symbol, amount
        )));
    }

    row.locked -= amount;
    row.available = checked_add(row.available, amount)?;
    row.updated_at = now;
    store(uow, &row)?;

    Ok(row)
}

/// Remove `amount` from `available`
pub fn debit(
    uow: &mut UnitOfWork<'_>,
    user_id: UserId,
    asset: &Asset,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<UserAssetBalance> {
    let mut row = existing(uow, user_id, asset)?;

    if row.available < amount {
        return Err(Error::InsufficientBalance {
            required: amount,
            available: row.available,
        });
    }

    row.available -= amount;
    row.updated_at = now;
    store(uow, &row)?;

    Ok(row)
}

fn existing(uow: &UnitOfWork<'_>, user_id: UserId, asset: &Asset) -> Result<UserAssetBalance> {
    uow.balance(user_id, asset.id)?
        .ok_or_else(|| Error::AssetNotFound(asset.symbol.clone()))
}

fn store(uow: &mut UnitOfWork<'_>, row: &UserAssetBalance) -> Result<()> {
    uow.put(Table::Balances, keys::balance(row.user_id, row.asset_id), row)
}

fn checked_add(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| Error::Arithmetic(format!("{} + {}", a, b)))
}
