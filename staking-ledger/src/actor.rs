//! Actor-based concurrency for the engine
//!
//! This module implements the single-writer front end using a Tokio actor:
//! - Every request is applied in mailbox order by one task
//! - Async message passing with backpressure (bounded mailbox)
//! - Each request gets its own oneshot reply
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               EngineHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              EngineActor (Single Task)                │
//! │                       │                               │
//! │                       ▼                               │
//! │     LedgerEngine::{stake, unstake, claim_reward}     │
//! │        (one unit of work per request)                │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::engine::LedgerEngine;
use crate::types::{
    Asset, AssetId, BalanceView, NewPool, Pool, PoolAudit, PoolId, StakeView, TransactionRecord,
    UnstakeReceipt, UserId,
};
use crate::{Error, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Message sent to the engine actor
#[derive(Debug)]
pub enum EngineMessage {
    /// Register an asset
    RegisterAsset {
        /// Asset symbol
        symbol: String,
        /// Display name
        name: String,
        /// Reply channel
        response: Reply<Asset>,
    },

    /// Create a pool
    CreatePool {
        /// Pool parameters
        pool: NewPool,
        /// Reply channel
        response: Reply<Pool>,
    },

    /// Credit an external deposit
    Deposit {
        /// User
        user_id: UserId,
        /// Asset symbol
        symbol: String,
        /// Quantity
        amount: Decimal,
        /// Reply channel
        response: Reply<TransactionRecord>,
    },

    /// Debit an external withdrawal
    Withdraw {
        /// User
        user_id: UserId,
        /// Asset symbol
        symbol: String,
        /// Quantity
        amount: Decimal,
        /// Reply channel
        response: Reply<TransactionRecord>,
    },

    /// Stake into a pool
    Stake {
        /// User
        user_id: UserId,
        /// Pool
        pool_id: PoolId,
        /// Asset to stake
        asset_id: AssetId,
        /// Quantity
        amount: Decimal,
        /// Reply channel
        response: Reply<TransactionRecord>,
    },

    /// Unstake from a pool
    Unstake {
        /// User
        user_id: UserId,
        /// Pool
        pool_id: PoolId,
        /// Quantity
        amount: Decimal,
        /// Reply channel
        response: Reply<UnstakeReceipt>,
    },

    /// Claim accrued reward
    ClaimReward {
        /// User
        user_id: UserId,
        /// Pool
        pool_id: PoolId,
        /// Reply channel
        response: Reply<TransactionRecord>,
    },

    /// List a user's positions
    GetUserStakes {
        /// User
        user_id: UserId,
        /// Reply channel
        response: Reply<Vec<StakeView>>,
    },

    /// Get pool by id
    GetPoolInfo {
        /// Pool
        pool_id: PoolId,
        /// Reply channel
        response: Reply<Pool>,
    },

    /// List a user's balances
    GetUserBalances {
        /// User
        user_id: UserId,
        /// Reply channel
        response: Reply<Vec<BalanceView>>,
    },

    /// List a user's trail
    GetUserTransactions {
        /// User
        user_id: UserId,
        /// Reply channel
        response: Reply<Vec<TransactionRecord>>,
    },

    /// Price a claim without applying it
    PreviewReward {
        /// User
        user_id: UserId,
        /// Pool
        pool_id: PoolId,
        /// Reply channel
        response: Reply<Decimal>,
    },

    /// Recompute a pool aggregate
    AuditPool {
        /// Pool
        pool_id: PoolId,
        /// Reply channel
        response: Reply<PoolAudit>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that applies engine requests one at a time
#[derive(Debug)]
pub struct EngineActor {
    /// Engine
    engine: Arc<LedgerEngine>,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<EngineMessage>,
}

impl EngineActor {
    /// Create new actor
    pub fn new(engine: Arc<LedgerEngine>, mailbox: mpsc::Receiver<EngineMessage>) -> Self {
        Self { engine, mailbox }
    }

    /// Run the actor event loop until shutdown or every handle is dropped
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let EngineMessage::Shutdown = msg {
                tracing::info!("Engine actor shutting down");
                break;
            }
            self.handle_message(msg);
        }
    }

    /// Handle a single message
    ///
    /// A dropped reply channel means the caller gave up; the outcome is
    /// already committed (or aborted) either way.
    fn handle_message(&self, msg: EngineMessage) {
        let engine = &self.engine;

        match msg {
            EngineMessage::RegisterAsset {
                symbol,
                name,
                response,
            } => {
                let _ = response.send(engine.register_asset(&symbol, &name));
            }

            EngineMessage::CreatePool { pool, response } => {
                let _ = response.send(engine.create_pool(pool));
            }

            EngineMessage::Deposit {
                user_id,
                symbol,
                amount,
                response,
            } => {
                let _ = response.send(engine.deposit(user_id, &symbol, amount));
            }

            EngineMessage::Withdraw {
                user_id,
                symbol,
                amount,
                response,
            } => {
                let _ = response.send(engine.withdraw(user_id, &symbol, amount));
            }

            EngineMessage::Stake {
                user_id,
                pool_id,
                asset_id,
                amount,
                response,
            } => {
                let _ = response.send(engine.stake(user_id, pool_id, asset_id, amount));
            }

            EngineMessage::Unstake {
                user_id,
                pool_id,
                amount,
                response,
            } => {
                let _ = response.send(engine.unstake(user_id, pool_id, amount));
            }

            EngineMessage::ClaimReward {
                user_id,
                pool_id,
                response,
            } => {
                let _ = response.send(engine.claim_reward(user_id, pool_id));
            }

            EngineMessage::GetUserStakes { user_id, response } => {
                let _ = response.send(engine.get_user_stakes(user_id));
            }

            EngineMessage::GetPoolInfo { pool_id, response } => {
                let _ = response.send(engine.get_pool_info(pool_id));
            }

            EngineMessage::GetUserBalances { user_id, response } => {
                let _ = response.send(engine.get_user_balances(user_id));
            }

            EngineMessage::GetUserTransactions { user_id, response } => {
                let _ = response.send(engine.get_user_transactions(user_id));
            }

            EngineMessage::PreviewReward {
                user_id,
                pool_id,
                response,
            } => {
                let _ = response.send(engine.preview_reward(user_id, pool_id));
            }

            EngineMessage::AuditPool { pool_id, response } => {
                let _ = response.send(engine.audit_pool(pool_id));
            }

            EngineMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineMessage>,
}

impl EngineHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<EngineMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> EngineMessage) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Register an asset
    pub async fn register_asset(&self, symbol: impl Into<String>, name: impl Into<String>) -> Result<Asset> {
        let (symbol, name) = (symbol.into(), name.into());
        self.request(|response| EngineMessage::RegisterAsset {
            symbol,
            name,
            response,
        })
        .await
    }

    /// Create a pool
    pub async fn create_pool(&self, pool: NewPool) -> Result<Pool> {
        self.request(|response| EngineMessage::CreatePool { pool, response })
            .await
    }

    /// Credit an external deposit
    pub async fn deposit(
        &self,
        user_id: UserId,
        symbol: impl Into<String>,
        amount: Decimal,
    ) -> Result<TransactionRecord> {
        let symbol = symbol.into();
        self.request(|response| EngineMessage::Deposit {
            user_id,
            symbol,
            amount,
            response,
        })
        .await
    }

    /// Debit an external withdrawal
    pub async fn withdraw(
        &self,
        user_id: UserId,
        symbol: impl Into<String>,
        amount: Decimal,
    ) -> Result<TransactionRecord> {
        let symbol = symbol.into();
        self.request(|response| EngineMessage::Withdraw {
            user_id,
            symbol,
            amount,
            response,
        })
        .await
    }

    /// Stake into a pool
    pub async fn stake(
        &self,
        user_id: UserId,
        pool_id: PoolId,
        asset_id: AssetId,
        amount: Decimal,
    ) -> Result<TransactionRecord> {
        self.request(|response| EngineMessage::Stake {
            user_id,
            pool_id,
            asset_id,
            amount,
            response,
        })
        .await
    }

    /// Unstake from a pool
    pub async fn unstake(&self, user_id: UserId, pool_id: PoolId, amount: Decimal) -> Result<UnstakeReceipt> {
        self.request(|response| EngineMessage::Unstake {
            user_id,
            pool_id,
            amount,
            response,
        })
        .await
    }

    /// Claim accrued reward
    pub async fn claim_reward(&self, user_id: UserId, pool_id: PoolId) -> Result<TransactionRecord> {
        self.request(|response| EngineMessage::ClaimReward {
            user_id,
            pool_id,
            response,
        })
        .await
    }

    /// List a user's positions
    pub async fn get_user_stakes(&self, user_id: UserId) -> Result<Vec<StakeView>> {
        self.request(|response| EngineMessage::GetUserStakes { user_id, response })
            .await
    }

    /// Get pool by id
    pub async fn get_pool_info(&self, pool_id: PoolId) -> Result<Pool> {
        self.request(|response| EngineMessage::GetPoolInfo { pool_id, response })
            .await
    }

    /// List a user's balances
    pub async fn get_user_balances(&self, user_id: UserId) -> Result<Vec<BalanceView>> {
        self.request(|response| EngineMessage::GetUserBalances { user_id, response })
            .await
    }

    /// List a user's trail
    pub async fn get_user_transactions(&self, user_id: UserId) -> Result<Vec<TransactionRecord>> {
        self.request(|response| EngineMessage::GetUserTransactions { user_id, response })
            .await
    }

    /// Price a claim without applying it
    pub async fn preview_reward(&self, user_id: UserId, pool_id: PoolId) -> Result<Decimal> {
        self.request(|response| EngineMessage::PreviewReward {
            user_id,
            pool_id,
            response,
        })
        .await
    }

    /// Recompute a pool aggregate
    pub async fn audit_pool(&self, pool_id: PoolId) -> Result<PoolAudit> {
        self.request(|response| EngineMessage::AuditPool { pool_id, response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(EngineMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the engine actor
pub fn spawn_engine_actor(engine: Arc<LedgerEngine>, mailbox_capacity: usize) -> EngineHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity);
    let actor = EngineActor::new(engine, rx);

    tokio::spawn(async move {
        actor.run().await;
    });

    EngineHandle::new(tx)
}
