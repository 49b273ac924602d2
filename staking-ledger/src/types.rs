//! Core types for the staking ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for quantities and rates)
//! - Cheap copyable identifiers usable as big-endian storage keys

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            /// Big-endian bytes, so keys sort numerically
            pub fn to_key(self) -> [u8; 8] {
                self.0.to_be_bytes()
            }

            /// Inverse of [`Self::to_key`]
            pub fn from_key(bytes: &[u8]) -> Option<Self> {
                let raw: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
                Some(Self(u64::from_be_bytes(raw)))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

numeric_id!(
    /// User identifier (owned by the account service)
    UserId
);
numeric_id!(
    /// Launch pool identifier
    PoolId
);
numeric_id!(
    /// Asset identifier
    AssetId
);

/// Registered asset (immutable reference data)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset ID
    pub id: AssetId,
    /// Unique ticker symbol, e.g. `BTC`
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Registration timestamp
    pub created_at: DateTime<Utc>,
}

/// Per-(user, asset) holdings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAssetBalance {
    /// Owner
    pub user_id: UserId,
    /// Asset held
    pub asset_id: AssetId,
    /// Spendable quantity
    pub available: Decimal,
    /// Quantity committed to stake positions
    pub locked: Decimal,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl UserAssetBalance {
    /// Empty balance row
    pub fn new(user_id: UserId, asset_id: AssetId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            asset_id,
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// `available + locked`
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }
}

/// Launch pool lifecycle, derived from the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolPhase {
    /// Before `start_time`; stakes rejected
    Pending,
    /// Inside `[start_time, end_time]`
    Active,
    /// After `end_time`; stakes rejected, unstake and claim still allowed
    Closed,
}

impl fmt::Display for PoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PoolPhase::Pending => "pending",
            PoolPhase::Active => "active",
            PoolPhase::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Time-bounded staking program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Pool ID
    pub id: PoolId,
    /// Project name
    pub name: String,
    /// Symbol of the asset users stake
    pub stake_asset: String,
    /// Symbol of the asset rewards are paid in
    pub reward_asset: String,
    /// Opening instant (inclusive)
    pub start_time: DateTime<Utc>,
    /// Closing instant (inclusive); accrual stops here
    pub end_time: DateTime<Utc>,
    /// Annualized yield, e.g. `0.10` for 10%
    pub apy: Decimal,
    /// Sum of all live position amounts
    pub total_staked: Decimal,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Pool {
    /// Phase of the pool at `now`
    pub fn phase(&self, now: DateTime<Utc>) -> PoolPhase {
        if now < self.start_time {
            PoolPhase::Pending
        } else if now > self.end_time {
            PoolPhase::Closed
        } else {
            PoolPhase::Active
        }
    }
}

/// Parameters for a new pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPool {
    /// Project name
    pub name: String,
    /// Stake asset symbol (must be registered)
    pub stake_asset: String,
    /// Reward asset symbol (must be registered)
    pub reward_asset: String,
    /// Opening instant
    pub start_time: DateTime<Utc>,
    /// Closing instant, strictly after `start_time`
    pub end_time: DateTime<Utc>,
    /// Annualized yield, non-negative
    pub apy: Decimal,
}

/// A user's live stake in one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    /// Owner
    pub user_id: UserId,
    /// Pool staked into
    pub pool_id: PoolId,
    /// Staked quantity, > 0 while the position exists
    pub amount: Decimal,
    /// Accrued but unpaid reward; zero after every distribution
    pub reward: Decimal,
    /// First stake instant
    pub staked_at: DateTime<Utc>,
    /// Accrual reference point
    pub last_claim_at: DateTime<Utc>,
    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

/// Kind of balance-affecting event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionKind {
    /// External credit
    Deposit = 1,
    /// External debit
    Withdraw = 2,
    /// available -> locked
    Stake = 3,
    /// locked -> available
    Unstake = 4,
    /// Reward payout
    Reward = 5,
}

impl TransactionKind {
    /// Stable lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::Stake => "stake",
            TransactionKind::Unstake => "unstake",
            TransactionKind::Reward => "reward",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionStatus {
    /// Accepted, not yet applied
    Pending = 1,
    /// Applied
    Completed = 2,
    /// Abandoned
    Failed = 3,
}

/// Audit correlation id: `tx_<YYYYMMDDHHMMSS>_<8 alphanumerics>`
///
/// Not unique by construction and never used as a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(String);

impl TxId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Append-only trail entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Storage key (UUIDv7, so records sort by creation time)
    pub record_id: Uuid,
    /// Affected user
    pub user_id: UserId,
    /// Affected asset
    pub asset_symbol: String,
    /// Quantity moved
    pub amount: Decimal,
    /// Event kind
    pub kind: TransactionKind,
    /// Status
    pub status: TransactionStatus,
    /// Correlation id
    pub tx_id: TxId,
    /// Timestamp
    pub created_at: DateTime<Utc>,
}

/// Result of an unstake: the principal leg plus the reward leg, if any
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnstakeReceipt {
    /// `unstake` record
    pub unstake: TransactionRecord,
    /// `reward` record, when reward > 0 was paid out
    pub reward: Option<TransactionRecord>,
    /// Whether the position was removed
    pub position_closed: bool,
}

/// Position joined with its pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeView {
    /// The position
    pub position: StakePosition,
    /// Pool details
    pub pool: Pool,
    /// Reward that would be paid if claimed now
    pub pending_reward: Decimal,
}

/// Balance joined with its asset symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    /// Asset ID
    pub asset_id: AssetId,
    /// Asset symbol
    pub symbol: String,
    /// Spendable quantity
    pub available: Decimal,
    /// Locked quantity
    pub locked: Decimal,
}

/// Recomputed pool aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolAudit {
    /// Pool audited
    pub pool_id: PoolId,
    /// Stored `total_staked`
    pub recorded_total: Decimal,
    /// Sum over live positions
    pub positions_total: Decimal,
    /// Number of live positions
    pub position_count: usize,
}

impl PoolAudit {
    /// `total_staked` matches the position sum
    pub fn is_consistent(&self) -> bool {
        self.recorded_total == self.positions_total
    }
}
