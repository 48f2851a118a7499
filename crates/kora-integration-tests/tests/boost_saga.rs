//! Integration test: boost purchase distribution and rollback.
//!
//! The boost purchase is a multi-account saga: debit the booster,
//! credit the creator, credit the reserve, record the boost. These
//! scenarios drive it over a real store and over [`FlakyStore`] with
//! failures injected at each later step, asserting that compensation
//! always restores the booster and never leaves an active promotion:
//! 1. Happy path splits the cost 50/50 between creator and reserve
//! 2. Creator earnings from a boost are instantly available
//! 3. Idempotent replay returns the recorded boost without recharging
//! 4. Failure after the charge refunds the booster in full
//! 5. Boosts expire out of the active set after 24 hours

use std::sync::atomic::Ordering;
use std::sync::Arc;

use kora_integration_tests::{
    engine, engine_over, entries_of, fund, FlakyStore, BASE_TIME,
};
use kora_ledger::{EngineConfig, LedgerError};
use kora_types::{EntryKind, HOUR_SECS};

#[tokio::test]
async fn purchase_splits_cost_between_creator_and_reserve() {
    let (ledger, _clock) = engine(BASE_TIME);
    fund(&ledger, "u-booster", 1_000).await;

    let boost = ledger
        .boost_post("u-booster", "post-1", "u-creator", None)
        .await
        .expect("purchase");
    assert_eq!(boost.cost, 100);
    assert_eq!(boost.expires_at, BASE_TIME + 24 * HOUR_SECS);

    // Booster paid the full cost
    let booster = ledger.balance_of("u-booster").await.expect("balance");
    assert_eq!(booster.total_balance, 900);
    assert_eq!(booster.available_balance, 900);

    // Creator got the 50% share, instantly spendable (no hold)
    let creator = ledger.balance_of("u-creator").await.expect("balance");
    assert_eq!(creator.total_balance, 50);
    assert_eq!(creator.available_balance, 50);

    let creator_entries = entries_of(&ledger, "u-creator").await;
    assert_eq!(creator_entries.len(), 1);
    assert_eq!(creator_entries[0].kind, EntryKind::BoostEarn);
    assert_eq!(creator_entries[0].available_at, creator_entries[0].created_at);

    // Platform + reserve shares land on the reserve account
    let reserve = ledger.reserve_balance().await.expect("reserve");
    assert_eq!(reserve.total_balance, 50);

    // The promotion is live
    let active = ledger.active_boosts("post-1").await.expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].boost_id, boost.boost_id);
}

#[tokio::test]
async fn insufficient_funds_charges_nothing() {
    let (ledger, _clock) = engine(BASE_TIME);
    fund(&ledger, "u-poor", 99).await;

    let err = ledger
        .boost_post("u-poor", "post-1", "u-creator", None)
        .await
        .expect_err("cannot afford");
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            required: 100,
            available: 99
        }
    ));

    let booster = ledger.balance_of("u-poor").await.expect("balance");
    assert_eq!(booster.total_balance, 99);
    assert!(ledger.balance_of("u-creator").await.is_err());
    assert!(ledger
        .active_boosts("post-1")
        .await
        .expect("active")
        .is_empty());
}

#[tokio::test]
async fn idempotent_replay_returns_recorded_boost() {
    let (ledger, _clock) = engine(BASE_TIME);
    fund(&ledger, "u-booster", 1_000).await;

    let key = Some("purchase-abc".to_string());
    let first = ledger
        .boost_post("u-booster", "post-1", "u-creator", key.clone())
        .await
        .expect("purchase");
    let replay = ledger
        .boost_post("u-booster", "post-1", "u-creator", key)
        .await
        .expect("replay");
    assert_eq!(replay.boost_id, first.boost_id);

    // Charged exactly once
    let booster = ledger.balance_of("u-booster").await.expect("balance");
    assert_eq!(booster.total_balance, 900);
    let creator = ledger.balance_of("u-creator").await.expect("balance");
    assert_eq!(creator.total_balance, 50);
    assert_eq!(
        ledger.active_boosts("post-1").await.expect("active").len(),
        1
    );
}

#[tokio::test]
async fn failed_record_insert_refunds_the_booster() {
    let store = Arc::new(FlakyStore::new());
    // Arc so the test keeps a handle to the failure flags
    let (ledger, _clock) = engine_over(store.clone(), BASE_TIME, EngineConfig::default(), &[]);
    fund(&ledger, "u-booster", 1_000).await;

    store.fail_insert_boost.store(true, Ordering::SeqCst);
    ledger
        .boost_post("u-booster", "post-1", "u-creator", None)
        .await
        .expect_err("insert fails");

    // Compensation unwound every step: booster whole, creator and
    // reserve back to zero, no promotion live
    let booster = ledger.balance_of("u-booster").await.expect("balance");
    assert_eq!(booster.total_balance, 1_000);
    assert_eq!(booster.available_balance, 1_000);

    let creator = ledger.balance_of("u-creator").await.expect("balance");
    assert_eq!(creator.total_balance, 0);

    let reserve = ledger.reserve_balance().await.expect("reserve");
    assert_eq!(reserve.total_balance, 0);

    assert!(ledger
        .active_boosts("post-1")
        .await
        .expect("active")
        .is_empty());

    // The ledger shows the charge and its reversal, not a clean slate
    let entries = entries_of(&ledger, "u-booster").await;
    let reversal = entries
        .iter()
        .find(|e| e.kind == EntryKind::BoostCost && e.amount == 100)
        .expect("compensating credit");
    assert!(reversal.reversal_of.is_some());

    // The store healed; the next purchase goes through
    ledger
        .boost_post("u-booster", "post-1", "u-creator", None)
        .await
        .expect("retry succeeds");
    let booster = ledger.balance_of("u-booster").await.expect("balance");
    assert_eq!(booster.total_balance, 900);
}

#[tokio::test]
async fn failed_creator_credit_refunds_the_booster() {
    let store = Arc::new(FlakyStore::new());
    let (ledger, _clock) = engine_over(store.clone(), BASE_TIME, EngineConfig::default(), &[]);
    fund(&ledger, "u-booster", 1_000).await;

    store.block_commits_for("u-creator");
    ledger
        .boost_post("u-booster", "post-1", "u-creator", None)
        .await
        .expect_err("creator credit fails");
    store.unblock_commits();

    let booster = ledger.balance_of("u-booster").await.expect("balance");
    assert_eq!(booster.total_balance, 1_000);
    // The creator was never credited, so no account came into being
    assert!(ledger.balance_of("u-creator").await.is_err());
    let reserve = ledger.reserve_balance().await.expect("reserve");
    assert_eq!(reserve.total_balance, 0);
    assert!(ledger
        .active_boosts("post-1")
        .await
        .expect("active")
        .is_empty());
}

#[tokio::test]
async fn failed_reserve_credit_unwinds_the_creator() {
    let store = Arc::new(FlakyStore::new());
    let (ledger, _clock) = engine_over(store.clone(), BASE_TIME, EngineConfig::default(), &[]);
    fund(&ledger, "u-booster", 1_000).await;

    store.fail_reserve.store(true, Ordering::SeqCst);
    ledger
        .boost_post("u-booster", "post-1", "u-creator", None)
        .await
        .expect_err("reserve commit fails");
    store.fail_reserve.store(false, Ordering::SeqCst);

    let booster = ledger.balance_of("u-booster").await.expect("balance");
    assert_eq!(booster.total_balance, 1_000);
    let creator = ledger.balance_of("u-creator").await.expect("balance");
    assert_eq!(creator.total_balance, 0);
    assert!(ledger
        .active_boosts("post-1")
        .await
        .expect("active")
        .is_empty());
}

#[tokio::test]
async fn boosts_expire_out_of_the_active_set() {
    let (ledger, clock) = engine(BASE_TIME);
    fund(&ledger, "u-booster", 1_000).await;

    ledger
        .boost_post("u-booster", "post-1", "u-creator", None)
        .await
        .expect("purchase");

    clock.set(BASE_TIME + 24 * HOUR_SECS);
    assert_eq!(
        ledger.active_boosts("post-1").await.expect("active").len(),
        1,
        "active through the last second"
    );

    clock.set(BASE_TIME + 24 * HOUR_SECS + 1);
    assert!(ledger
        .active_boosts("post-1")
        .await
        .expect("active")
        .is_empty());
}
