//! Launchpool Staking Ledger
//!
//! Transactional ledger engine for launch-pool staking: users lock a stake
//! asset into a time-boxed pool and accrue a reward asset at a fixed APY.
//!
//! # Architecture
//!
//! - **Unit of Work**: Every operation stages its writes and commits them as one RocksDB write batch
//! - **Single Writer**: Units of work are serialized; an actor front end orders requests
//! - **Exact Arithmetic**: All quantities are `rust_decimal::Decimal`
//! - **Transaction Trail**: Every balance movement is recorded in the same commit
//!
//! # Invariants
//!
//! - Conservation: `available + locked` changes only by deposits, withdrawals and reward payouts
//! - Aggregate consistency: `pool.total_staked == Σ position.amount`
//! - Non-negativity: no balance, position or pool total goes below zero
//! - Atomicity: a failed operation leaves no trace

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod balance;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod position;
pub mod reward;
pub mod storage;
pub mod trail;
pub mod types;
pub mod unit_of_work;

// Re-exports
pub use actor::{spawn_engine_actor, EngineHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use engine::LedgerEngine;
pub use error::{Error, Result};
pub use storage::Storage;
pub use types::{
    Asset, AssetId, BalanceView, NewPool, Pool, PoolAudit, PoolId, PoolPhase, StakePosition,
    StakeView, TransactionKind, TransactionRecord, TransactionStatus, TxId, UnstakeReceipt,
    UserAssetBalance, UserId,
};
