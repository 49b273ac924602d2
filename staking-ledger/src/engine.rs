//! Ledger engine orchestration layer
//!
//! This module ties together storage, the reward calculator, the balance
//! mutator and the position manager into the public staking API. Each
//! mutating operation follows the same shape:
//!
//! 1. open a unit of work
//! 2. read and validate preconditions
//! 3. compute deltas (reward calculator)
//! 4. stage balance, position and pool mutations
//! 5. stage trail entries
//! 6. commit
//!
//! Any error between 1 and 6 drops the unit of work and nothing is applied.
//!
//! # Example
//!
//! ```no_run
//! use staking_ledger::{Config, LedgerEngine};
//! use staking_ledger::types::{AssetId, PoolId, UserId};
//! use rust_decimal::Decimal;
//!
//! fn main() -> staking_ledger::Result<()> {
//!     let engine = LedgerEngine::open(&Config::default())?;
//!
//!     engine.stake(UserId(1), PoolId(1), AssetId(1), Decimal::new(1000, 0))?;
//!     let stakes = engine.get_user_stakes(UserId(1))?;
//!     println!("{} live positions", stakes.len());
//!
//!     Ok(())
//! }
//! ```

use crate::{
    balance,
    clock::{Clock, SystemClock},
    metrics::Metrics,
    position::{self, StakeOutcome},
    reward,
    storage::{keys, ReadStore, Storage, Table},
    trail,
    types::{
        Asset, AssetId, BalanceView, NewPool, Pool, PoolAudit, PoolId, PoolPhase, StakeView,
        TransactionKind, TransactionRecord, UnstakeReceipt, UserId,
    },
    Config, Error, Result,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;

/// Main staking ledger interface
pub struct LedgerEngine {
    /// Persistent state
    storage: Arc<Storage>,

    /// Source of "now"
    clock: Arc<dyn Clock>,

    /// Operation metrics
    metrics: Metrics,
}

impl std::fmt::Debug for LedgerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerEngine")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl LedgerEngine {
    /// Build an engine over an existing storage handle and clock
    pub fn new(storage: Arc<Storage>, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            storage,
            clock,
            metrics: Metrics::new()?,
        })
    }

    /// Open storage from configuration, using the wall clock
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(config)?);
        Self::new(storage, Arc::new(SystemClock))
    }

    /// Operation metrics
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Underlying storage
    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    fn observe<T>(&self, operation: &'static str, run: impl FnOnce() -> Result<T>) -> Result<T> {
        let started = Instant::now();
        let result = run();

        match &result {
            Ok(_) => self
                .metrics
                .record_success(operation, started.elapsed().as_secs_f64()),
            Err(e) => {
                self.metrics.record_rejection(operation, e);
                if e.is_infrastructure() {
                    tracing::error!(operation, error = %e, "Operation failed");
                } else {
                    tracing::warn!(operation, kind = e.kind(), error = %e, "Operation rejected");
                }
            }
        }

        result
    }

    // Reference data

    /// Register a new asset
    pub fn register_asset(&self, symbol: &str, name: &str) -> Result<Asset> {
        self.observe("register_asset", || {
            let symbol = symbol.trim();
            if symbol.is_empty() {
                return Err(Error::InvalidAsset("symbol must not be empty".to_string()));
            }

            let now = self.clock.now();
            let mut uow = self.storage.begin("register_asset");

            if uow.asset_id_by_symbol(symbol)?.is_some() {
                return Err(Error::AssetAlreadyExists(symbol.to_string()));
            }

            let asset = Asset {
                id: AssetId(uow.next_id("assets")?),
                symbol: symbol.to_string(),
                name: name.to_string(),
                created_at: now,
            };

            uow.put(Table::Assets, keys::asset(asset.id), &asset)?;
            uow.put(Table::Indices, keys::asset_symbol(symbol), &asset.id)?;
            uow.commit()?;

            tracing::info!(asset_id = %asset.id, symbol = %asset.symbol, "Asset registered");
            Ok(asset)
        })
    }

    /// Create a launch pool
    pub fn create_pool(&self, new_pool: NewPool) -> Result<Pool> {
        self.observe("create_pool", || {
            if new_pool.start_time >= new_pool.end_time {
                return Err(Error::InvalidPool(format!(
                    "start_time {} must be before end_time {}",
                    new_pool.start_time, new_pool.end_time
                )));
            }
            if new_pool.apy < Decimal::ZERO {
                return Err(Error::InvalidPool(format!(
                    "apy must not be negative, got {}",
                    new_pool.apy
                )));
            }

            let now = self.clock.now();
            let mut uow = self.storage.begin("create_pool");

            balance::resolve_asset(&uow, &new_pool.stake_asset)?;
            balance::resolve_asset(&uow, &new_pool.reward_asset)?;

            let pool = Pool {
                id: PoolId(uow.next_id("pools")?),
                name: new_pool.name,
                stake_asset: new_pool.stake_asset,
                reward_asset: new_pool.reward_asset,
                start_time: new_pool.start_time,
                end_time: new_pool.end_time,
                apy: new_pool.apy,
                total_staked: Decimal::ZERO,
                created_at: now,
                updated_at: now,
            };

            uow.put(Table::Pools, keys::pool(pool.id), &pool)?;
            uow.commit()?;

            tracing::info!(
                pool_id = %pool.id,
                stake_asset = %pool.stake_asset,
                reward_asset = %pool.reward_asset,
                apy = %pool.apy,
                "Pool created"
            );
            Ok(pool)
        })
    }

    // Balance movements

    /// Credit an external deposit to `available`
    pub fn deposit(&self, user_id: UserId, symbol: &str, amount: Decimal) -> Result<TransactionRecord> {
        self.observe("deposit", || {
            ensure_positive(amount)?;

            let now = self.clock.now();
            let mut uow = self.storage.begin("deposit");

            balance::distribute(&mut uow, user_id, symbol, amount, now)?;
            let record = trail::append(&mut uow, user_id, symbol, amount, TransactionKind::Deposit, now)?;
            uow.commit()?;

            tracing::info!(user_id = %user_id, asset = %symbol, amount = %amount, tx_id = %record.tx_id, "Deposit committed");
            Ok(record)
        })
    }

    /// Debit an external withdrawal from `available`
    pub fn withdraw(&self, user_id: UserId, symbol: &str, amount: Decimal) -> Result<TransactionRecord> {
        self.observe("withdraw", || {
            ensure_positive(amount)?;

            let now = self.clock.now();
            let mut uow = self.storage.begin("withdraw");

            let asset = balance::resolve_asset(&uow, symbol)?;
            balance::debit(&mut uow, user_id, &asset, amount, now)?;
            let record = trail::append(&mut uow, user_id, symbol, amount, TransactionKind::Withdraw, now)?;
            uow.commit()?;

            tracing::info!(user_id = %user_id, asset = %symbol, amount = %amount, tx_id = %record.tx_id, "Withdrawal committed");
            Ok(record)
        })
    }

    // Staking

    /// Lock `amount` of the pool's stake asset into the user's position
    pub fn stake(
        &self,
        user_id: UserId,
        pool_id: PoolId,
        asset_id: AssetId,
        amount: Decimal,
    ) -> Result<TransactionRecord> {
        self.observe("stake", || {
            ensure_positive(amount)?;

            let now = self.clock.now();
            let mut uow = self.storage.begin("stake");

            let pool = uow.pool(pool_id)?.ok_or(Error::PoolNotFound(pool_id))?;
            let phase = pool.phase(now);
            if phase != PoolPhase::Active {
                return Err(Error::PoolNotActive { pool_id, phase });
            }

            let asset = balance::resolve_asset(&uow, &pool.stake_asset)?;
            if asset.id != asset_id {
                return Err(match uow.asset(asset_id)? {
                    None => Error::AssetNotFound(asset_id.to_string()),
                    Some(_) => Error::StakeAssetMismatch {
                        pool_id,
                        asset_id,
                        expected: pool.stake_asset.clone(),
                    },
                });
            }

            balance::lock(&mut uow, user_id, &asset, amount, now)?;
            let (staked, outcome) = position::open_or_merge(&mut uow, user_id, pool_id, amount, now)?;
            let pool = position::adjust_pool_total(&mut uow, pool_id, amount, now)?;
            let record = trail::append(&mut uow, user_id, &asset.symbol, amount, TransactionKind::Stake, now)?;
            uow.commit()?;

            tracing::info!(
                user_id = %user_id,
                pool_id = %pool_id,
                amount = %amount,
                position_amount = %staked.amount,
                total_staked = %pool.total_staked,
                merged = outcome == StakeOutcome::Merged,
                tx_id = %record.tx_id,
                "Stake committed"
            );
            Ok(record)
        })
    }

    /// Release `amount` from the user's position, paying out all accrued reward
    ///
    /// The reward covers the whole position, also on a partial unstake.
    pub fn unstake(&self, user_id: UserId, pool_id: PoolId, amount: Decimal) -> Result<UnstakeReceipt> {
        self.observe("unstake", || {
            ensure_positive(amount)?;

            let now = self.clock.now();
            let mut uow = self.storage.begin("unstake");

            let current = uow
                .position(user_id, pool_id)?
                .ok_or(Error::StakeNotFound { user_id, pool_id })?;
            if amount > current.amount {
                return Err(Error::UnstakeExceedsPosition {
                    requested: amount,
                    staked: current.amount,
                });
            }

            let pool = uow.pool(pool_id)?.ok_or(Error::PoolNotFound(pool_id))?;

            // Priced on the position as it stood before this operation
            let reward = reward::accrued_reward(&current, &pool, now)?;
            let reward_record = if reward > Decimal::ZERO {
                balance::distribute(&mut uow, user_id, &pool.reward_asset, reward, now)?;
                Some(trail::append(
                    &mut uow,
                    user_id,
                    &pool.reward_asset,
                    reward,
                    TransactionKind::Reward,
                    now,
                )?)
            } else {
                None
            };

            let stake_asset = balance::resolve_asset(&uow, &pool.stake_asset)?;
            balance::unlock(&mut uow, user_id, &stake_asset, amount, now)?;
            let remaining = position::reduce(&mut uow, &current, amount, now)?;
            let pool = position::adjust_pool_total(&mut uow, pool_id, -amount, now)?;
            let unstake_record = trail::append(
                &mut uow,
                user_id,
                &stake_asset.symbol,
                amount,
                TransactionKind::Unstake,
                now,
            )?;
            uow.commit()?;

            self.metrics.record_reward(reward);
            tracing::info!(
                user_id = %user_id,
                pool_id = %pool_id,
                amount = %amount,
                reward = %reward,
                position_closed = remaining.is_none(),
                total_staked = %pool.total_staked,
                tx_id = %unstake_record.tx_id,
                "Unstake committed"
            );

            Ok(UnstakeReceipt {
                unstake: unstake_record,
                reward: reward_record,
                position_closed: remaining.is_none(),
            })
        })
    }

    /// Pay out accrued reward without touching the staked amount
    pub fn claim_reward(&self, user_id: UserId, pool_id: PoolId) -> Result<TransactionRecord> {
        self.observe("claim_reward", || {
            let now = self.clock.now();
            let mut uow = self.storage.begin("claim_reward");

            let current = uow
                .position(user_id, pool_id)?
                .ok_or(Error::StakeNotFound { user_id, pool_id })?;
            let pool = uow.pool(pool_id)?.ok_or(Error::PoolNotFound(pool_id))?;

            let reward = reward::accrued_reward(&current, &pool, now)?;
            if reward <= Decimal::ZERO {
                return Err(Error::NoRewardToClaim { user_id, pool_id });
            }

            balance::distribute(&mut uow, user_id, &pool.reward_asset, reward, now)?;
            position::mark_claimed(&mut uow, &current, now)?;
            let record = trail::append(
                &mut uow,
                user_id,
                &pool.reward_asset,
                reward,
                TransactionKind::Reward,
                now,
            )?;
            uow.commit()?;

            self.metrics.record_reward(reward);
            tracing::info!(
                user_id = %user_id,
                pool_id = %pool_id,
                reward = %reward,
                tx_id = %record.tx_id,
                "Reward claimed"
            );
            Ok(record)
        })
    }

    // Queries (committed state, no unit of work)

    /// A user's live positions with pool details and pending reward
    ///
    /// Positions and pools are read from one snapshot.
    pub fn get_user_stakes(&self, user_id: UserId) -> Result<Vec<StakeView>> {
        let now = self.clock.now();
        let snapshot = self.storage.snapshot();

        snapshot
            .positions_for_user(user_id)?
            .into_iter()
            .map(|position| {
                let pool = snapshot.pool(position.pool_id)?.ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "position of user {} references missing pool {}",
                        user_id, position.pool_id
                    ))
                })?;
                let pending_reward = reward::accrued_reward(&position, &pool, now)?;
                Ok(StakeView {
                    position,
                    pool,
                    pending_reward,
                })
            })
            .collect()
    }

    /// Pool by id
    pub fn get_pool_info(&self, pool_id: PoolId) -> Result<Pool> {
        self.storage.pool(pool_id)?.ok_or(Error::PoolNotFound(pool_id))
    }

    /// A user's holdings per asset
    pub fn get_user_balances(&self, user_id: UserId) -> Result<Vec<BalanceView>> {
        let snapshot = self.storage.snapshot();

        snapshot
            .balances_for_user(user_id)?
            .into_iter()
            .map(|row| {
                let asset = snapshot
                    .asset(row.asset_id)?
                    .ok_or_else(|| Error::AssetNotFound(row.asset_id.to_string()))?;
                Ok(BalanceView {
                    asset_id: asset.id,
                    symbol: asset.symbol,
                    available: row.available,
                    locked: row.locked,
                })
            })
            .collect()
    }

    /// A user's trail, oldest first
    pub fn get_user_transactions(&self, user_id: UserId) -> Result<Vec<TransactionRecord>> {
        self.storage.transactions_for_user(user_id)
    }

    /// Reward a claim would pay right now
    pub fn preview_reward(&self, user_id: UserId, pool_id: PoolId) -> Result<Decimal> {
        let current = self
            .storage
            .position(user_id, pool_id)?
            .ok_or(Error::StakeNotFound { user_id, pool_id })?;
        let pool = self.get_pool_info(pool_id)?;
        reward::accrued_reward(&current, &pool, self.clock.now())
    }

    /// Recompute a pool's aggregate from its live positions
    pub fn audit_pool(&self, pool_id: PoolId) -> Result<PoolAudit> {
        let pool = self.get_pool_info(pool_id)?;
        let positions = self.storage.positions_in_pool(pool_id)?;

        let audit = PoolAudit {
            pool_id,
            recorded_total: pool.total_staked,
            positions_total: positions.iter().map(|p| p.amount).sum(),
            position_count: positions.len(),
        };

        if !audit.is_consistent() {
            tracing::error!(
                pool_id = %pool_id,
                recorded = %audit.recorded_total,
                computed = %audit.positions_total,
                "Pool aggregate diverged from positions"
            );
        }

        Ok(audit)
    }
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidAmount(format!(
            "amount must be positive, got {}",
            amount
        )));
    }
    Ok(())
}
