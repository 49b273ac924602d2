//! Shared fixture for integration tests

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use staking_ledger::{
    AssetId, Clock, Config, LedgerEngine, ManualClock, NewPool, Pool, Storage, UserId,
};
use std::sync::Arc;
use tempfile::TempDir;

pub const STAKE: &str = "USDT";
pub const REWARD: &str = "GLD";

pub struct Fixture {
    pub engine: LedgerEngine,
    pub clock: Arc<ManualClock>,
    pub stake_asset: AssetId,
    pub reward_asset: AssetId,
    pub pool: Pool,
    pub temp: TempDir,
}

pub fn genesis() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Engine with USDT/GLD registered and one pool running `[start, start + days)`
pub fn fixture_with_window(apy: Decimal, start: DateTime<Utc>, days: i64) -> Fixture {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.data_dir = temp.path().to_path_buf();
    config.rocksdb.sync_writes = false;

    let clock = Arc::new(ManualClock::new(genesis()));
    let storage = Arc::new(Storage::open(&config).unwrap());
    let engine = LedgerEngine::new(storage, clock.clone()).unwrap();

    let stake_asset = engine.register_asset(STAKE, "Tether USD").unwrap().id;
    let reward_asset = engine.register_asset(REWARD, "Gold Rush").unwrap().id;
    let pool = engine
        .create_pool(NewPool {
            name: "Genesis Launchpool".to_string(),
            stake_asset: STAKE.to_string(),
            reward_asset: REWARD.to_string(),
            start_time: start,
            end_time: start + Duration::days(days),
            apy,
        })
        .unwrap();

    Fixture {
        engine,
        clock,
        stake_asset,
        reward_asset,
        pool,
        temp,
    }
}

/// Pool active from genesis for two years
pub fn fixture(apy: Decimal) -> Fixture {
    fixture_with_window(apy, genesis(), 730)
}

impl Fixture {
    /// `(available, locked)` for one asset, zeros when the row is missing
    pub fn holdings(&self, user_id: UserId, symbol: &str) -> (Decimal, Decimal) {
        self.engine
            .get_user_balances(user_id)
            .unwrap()
            .into_iter()
            .find(|b| b.symbol == symbol)
            .map(|b| (b.available, b.locked))
            .unwrap_or((Decimal::ZERO, Decimal::ZERO))
    }

    pub fn fund(&self, user_id: UserId, amount: Decimal) {
        self.engine.deposit(user_id, STAKE, amount).unwrap();
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn advance_days(&self, days: i64) {
        self.clock.advance(Duration::days(days));
    }

    pub fn assert_consistent(&self) {
        let audit = self.engine.audit_pool(self.pool.id).unwrap();
        assert!(
            audit.is_consistent(),
            "pool total {} != positions total {}",
            audit.recorded_total,
            audit.positions_total
        );
    }
}
