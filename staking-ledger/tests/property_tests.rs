//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify critical invariants:
//! - Conservation: stake and unstake only move funds between available and locked
//! - Aggregate consistency: pool total == Σ position amounts after every commit
//! - Non-negativity: failed operations leave no trace
//! - Reward monotonicity: accrual never decreases and freezes at pool end

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{fixture, genesis, Fixture, STAKE};
use proptest::prelude::*;
use rust_decimal::Decimal;
use staking_ledger::{
    reward::accrued_reward, spawn_engine_actor, Pool, PoolId, StakePosition, UserId,
};
use std::sync::Arc;

/// Strategy for generating valid amounts (positive decimals, two places)
fn amount_strategy() -> impl Strategy<Value = Decimal> {
    (1u64..1_000_000_00u64).prop_map(|cents| Decimal::new(cents as i64, 2))
}

/// Strategy for generating APYs between 0% and 500%
fn apy_strategy() -> impl Strategy<Value = Decimal> {
    (0u32..50_000u32).prop_map(|bps| Decimal::new(bps as i64, 4))
}

#[derive(Debug, Clone)]
enum Op {
    Stake { user: u64, amount: Decimal },
    Unstake { user: u64, percent: u32 },
    Claim { user: u64 },
    Withdraw { user: u64, amount: Decimal },
    Advance { hours: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (1u64..4, amount_strategy()).prop_map(|(user, amount)| Op::Stake { user, amount }),
        3 => (1u64..4, 1u32..=100).prop_map(|(user, percent)| Op::Unstake { user, percent }),
        2 => (1u64..4).prop_map(|user| Op::Claim { user }),
        1 => (1u64..4, amount_strategy()).prop_map(|(user, amount)| Op::Withdraw { user, amount }),
        3 => (1i64..240).prop_map(|hours| Op::Advance { hours }),
    ]
}

const FUNDING: i64 = 5_000_000;

fn position_amount(f: &Fixture, user_id: UserId) -> Decimal {
    f.engine
        .get_user_stakes(user_id)
        .unwrap()
        .into_iter()
        .find(|s| s.pool.id == f.pool.id)
        .map(|s| s.position.amount)
        .unwrap_or(Decimal::ZERO)
}

fn test_pool(apy: Decimal, days: i64) -> Pool {
    let start = genesis();
    Pool {
        id: PoolId(1),
        name: "Property".to_string(),
        stake_asset: STAKE.to_string(),
        reward_asset: "GLD".to_string(),
        start_time: start,
        end_time: start + Duration::days(days),
        apy,
        total_staked: Decimal::ZERO,
        created_at: start,
        updated_at: start,
    }
}

fn test_position(amount: Decimal) -> StakePosition {
    StakePosition {
        user_id: UserId(1),
        pool_id: PoolId(1),
        amount,
        reward: Decimal::ZERO,
        staked_at: genesis(),
        last_claim_at: genesis(),
        updated_at: genesis(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: a successful stake moves exactly `amount` from available to locked
    #[test]
    fn prop_stake_conserves_funds(funded in amount_strategy(), percent in 1u32..=100) {
        let f = fixture(Decimal::new(1, 1));
        let user = UserId(1);
        f.fund(user, funded);

        let amount = (funded * Decimal::from(percent) / Decimal::from(100)).round_dp(2);
        prop_assume!(amount > Decimal::ZERO);

        let (available_before, locked_before) = f.holdings(user, STAKE);
        f.engine.stake(user, f.pool.id, f.stake_asset, amount).unwrap();
        let (available_after, locked_after) = f.holdings(user, STAKE);

        prop_assert_eq!(available_before - available_after, amount);
        prop_assert_eq!(locked_after - locked_before, amount);

        f.engine.unstake(user, f.pool.id, amount).unwrap();
        prop_assert_eq!(f.holdings(user, STAKE), (available_before, locked_before));
    }

    /// Property: an overdrawn stake is rejected and nothing moves
    #[test]
    fn prop_overdraw_leaves_no_trace(funded in amount_strategy(), excess in amount_strategy()) {
        let f = fixture(Decimal::new(1, 1));
        let user = UserId(1);
        f.fund(user, funded);
        let trail_before = f.engine.get_user_transactions(user).unwrap();

        let result = f.engine.stake(user, f.pool.id, f.stake_asset, funded + excess);
        prop_assert!(result.is_err());

        prop_assert_eq!(f.holdings(user, STAKE), (funded, Decimal::ZERO));
        prop_assert_eq!(f.engine.get_user_transactions(user).unwrap(), trail_before);
        prop_assert_eq!(position_amount(&f, user), Decimal::ZERO);
        prop_assert_eq!(
            f.engine.get_pool_info(f.pool.id).unwrap().total_staked,
            Decimal::ZERO
        );
    }

    /// Property: pool aggregates and holdings stay consistent under any operation sequence
    #[test]
    fn prop_random_sequences_keep_invariants(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let f = fixture(Decimal::new(25, 2));
        let funding = Decimal::from(FUNDING);
        let mut withdrawn = [Decimal::ZERO; 4];
        for user in 1..4 {
            f.fund(UserId(user), funding);
        }

        for op in ops {
            let result = match op {
                Op::Stake { user, amount } => f
                    .engine
                    .stake(UserId(user), f.pool.id, f.stake_asset, amount)
                    .map(|_| ()),
                Op::Unstake { user, percent } => {
                    let staked = position_amount(&f, UserId(user));
                    let amount = (staked * Decimal::from(percent) / Decimal::from(100)).round_dp(2);
                    f.engine.unstake(UserId(user), f.pool.id, amount).map(|_| ())
                }
                Op::Claim { user } => f.engine.claim_reward(UserId(user), f.pool.id).map(|_| ()),
                Op::Withdraw { user, amount } => f
                    .engine
                    .withdraw(UserId(user), STAKE, amount)
                    .map(|_| withdrawn[user as usize] += amount),
                Op::Advance { hours } => {
                    f.clock.advance(Duration::hours(hours));
                    Ok(())
                }
            };

            if let Err(e) = result {
                prop_assert!(!e.is_infrastructure(), "infrastructure failure: {}", e);
            }

            let audit = f.engine.audit_pool(f.pool.id).unwrap();
            prop_assert!(audit.is_consistent());
            prop_assert!(audit.recorded_total >= Decimal::ZERO);

            for user in 1..4u64 {
                let (available, locked) = f.holdings(UserId(user), STAKE);
                prop_assert!(available >= Decimal::ZERO);
                prop_assert!(locked >= Decimal::ZERO);
                prop_assert_eq!(locked, position_amount(&f, UserId(user)));
                prop_assert_eq!(available + locked, funding - withdrawn[user as usize]);
            }
        }
    }

    /// Property: accrual is monotone up to pool end and constant after it
    #[test]
    fn prop_reward_monotone(
        amount in amount_strategy(),
        apy in apy_strategy(),
        days in 1i64..400,
        t1_hours in 0i64..12_000,
        dt_hours in 0i64..12_000,
    ) {
        let pool = test_pool(apy, days);
        let position = test_position(amount);
        let t1 = genesis() + Duration::hours(t1_hours);
        let t2 = t1 + Duration::hours(dt_hours);

        let r1 = accrued_reward(&position, &pool, t1).unwrap();
        let r2 = accrued_reward(&position, &pool, t2).unwrap();
        prop_assert!(r1 >= Decimal::ZERO);
        prop_assert!(r2 >= r1);

        let at_end = accrued_reward(&position, &pool, pool.end_time).unwrap();
        if t1 >= pool.end_time {
            prop_assert_eq!(r1, at_end);
            prop_assert_eq!(r2, at_end);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: requests through the actor observe the same invariants
    #[test]
    fn prop_actor_stake_unstake_round_trip(stakes in prop::collection::vec(amount_strategy(), 1..6)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let f = fixture(Decimal::new(1, 1));
            let user = UserId(9);
            let total: Decimal = stakes.iter().copied().sum();
            f.fund(user, total);

            let Fixture { engine, pool, stake_asset, temp: _temp, .. } = f;
            let pool_id = pool.id;
            let handle = spawn_engine_actor(Arc::new(engine), 8);

            for amount in &stakes {
                handle.stake(user, pool_id, stake_asset, *amount).await.unwrap();
            }
            let audit = handle.audit_pool(pool_id).await.unwrap();
            prop_assert_eq!(audit.recorded_total, total);
            prop_assert_eq!(audit.position_count, 1);

            let receipt = handle.unstake(user, pool_id, total).await.unwrap();
            prop_assert!(receipt.position_closed);
            prop_assert!(handle.get_user_stakes(user).await.unwrap().is_empty());

            handle.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}

#[test]
fn reward_at_exact_year_matches_apy() {
    let pool = test_pool(Decimal::new(10, 2), 730);
    let position = test_position(Decimal::from(1000));
    let year_later = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
    // 2024 is a leap year: Jan 1 to Dec 31 is exactly 365 days
    assert_eq!(
        accrued_reward(&position, &pool, year_later).unwrap(),
        Decimal::from(100)
    );
}
