//! Error types for the staking ledger

use crate::types::{AssetId, PoolId, PoolPhase, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every variant aborts the unit of work it was raised in. None are retried
/// by the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Pool does not exist
    #[error("Pool not found: {0}")]
    PoolNotFound(PoolId),

    /// Pool is outside its active window
    #[error("Pool {pool_id} not active (phase: {phase})")]
    PoolNotActive {
        /// Pool
        pool_id: PoolId,
        /// Phase at request time
        phase: PoolPhase,
    },

    /// No balance row, or no asset definition, for the requested asset
    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    /// Stake requested with an asset other than the pool's stake asset
    #[error("Asset {asset_id} is not the stake asset of pool {pool_id} ({expected})")]
    StakeAssetMismatch {
        /// Pool
        pool_id: PoolId,
        /// Requested asset
        asset_id: AssetId,
        /// Pool's stake asset symbol
        expected: String,
    },

    /// Requested amount exceeds available balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Requested quantity
        required: Decimal,
        /// Available quantity
        available: Decimal,
    },

    /// No live position for (user, pool)
    #[error("Stake not found for user {user_id} in pool {pool_id}")]
    StakeNotFound {
        /// User
        user_id: UserId,
        /// Pool
        pool_id: PoolId,
    },

    /// Unstake amount larger than the position
    #[error("Unstake amount {requested} exceeds staked amount {staked}")]
    UnstakeExceedsPosition {
        /// Requested quantity
        requested: Decimal,
        /// Position quantity
        staked: Decimal,
    },

    /// Accrued reward is zero
    #[error("No reward to claim for user {user_id} in pool {pool_id}")]
    NoRewardToClaim {
        /// User
        user_id: UserId,
        /// Pool
        pool_id: PoolId,
    },

    /// Non-positive quantity
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Asset symbol already registered
    #[error("Asset already exists: {0}")]
    AssetAlreadyExists(String),

    /// Malformed asset definition
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    /// Malformed pool definition
    #[error("Invalid pool: {0}")]
    InvalidPool(String),

    /// Stored state contradicts a ledger invariant
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Decimal overflow
    #[error("Arithmetic overflow: {0}")]
    Arithmetic(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::PoolNotFound(_) => "pool_not_found",
            Error::PoolNotActive { .. } => "pool_not_active",
            Error::AssetNotFound(_) => "asset_not_found",
            Error::StakeAssetMismatch { .. } => "stake_asset_mismatch",
            Error::InsufficientBalance { .. } => "insufficient_balance",
            Error::StakeNotFound { .. } => "stake_not_found",
            Error::UnstakeExceedsPosition { .. } => "unstake_exceeds_position",
            Error::NoRewardToClaim { .. } => "no_reward_to_claim",
            Error::InvalidAmount(_) => "invalid_amount",
            Error::AssetAlreadyExists(_) => "asset_already_exists",
            Error::InvalidAsset(_) => "invalid_asset",
            Error::InvalidPool(_) => "invalid_pool",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::Arithmetic(_) => "arithmetic",
            Error::Storage(_) => "storage",
            Error::Serialization(_) => "serialization",
            Error::Concurrency(_) => "concurrency",
            Error::Metrics(_) => "metrics",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
        }
    }

    /// Opaque infrastructure failure rather than a rejected request
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Error::Storage(_)
                | Error::Serialization(_)
                | Error::Concurrency(_)
                | Error::Metrics(_)
                | Error::Config(_)
                | Error::Io(_)
        )
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
