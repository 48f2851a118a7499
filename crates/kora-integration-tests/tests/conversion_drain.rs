//! Integration test: fixed-point conversion has no rounding drift.
//!
//! Conversions quote SA in fiat at rational rates and only accept
//! amounts that divide exactly, so draining a balance through many
//! small conversions must land on exactly zero:
//! 1. 100 conversions of 100 SA drain 10,000 SA to exactly 0
//! 2. Inexact amounts are rejected before anything is written
//! 3. USD and NGN quotes agree with the reference rates
//! 4. Conversion entries are instant debits against available funds

use kora_integration_tests::{engine, entries_of, fund, BASE_TIME};
use kora_ledger::LedgerError;
use kora_types::{Currency, EntryKind};

#[tokio::test]
async fn hundred_conversions_drain_to_exactly_zero() {
    let (ledger, _clock) = engine(BASE_TIME);
    fund(&ledger, "u-conv", 10_000).await;

    for i in 0..100 {
        let quote = ledger
            .convert("u-conv", 100, Currency::Usd)
            .await
            .unwrap_or_else(|e| panic!("conversion {i} failed: {e}"));
        assert_eq!(quote.sa_amount, 100);
        assert_eq!(quote.converted_amount, 1, "100 SA is exactly 1 USD");
    }

    let account = ledger.balance_of("u-conv").await.expect("balance");
    assert_eq!(account.total_balance, 0);
    assert_eq!(account.available_balance, 0);
    assert!(account.balanced());

    // The funding credit plus one debit per conversion
    let entries = entries_of(&ledger, "u-conv").await;
    assert_eq!(entries.len(), 101);
    assert_eq!(
        entries
            .iter()
            .filter(|e| e.kind == EntryKind::Conversion)
            .count(),
        100
    );

    // Nothing left to convert
    let err = ledger
        .convert("u-conv", 100, Currency::Usd)
        .await
        .expect_err("drained");
    assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
}

#[tokio::test]
async fn inexact_amounts_are_rejected() {
    let (ledger, _clock) = engine(BASE_TIME);
    fund(&ledger, "u-conv", 1_000).await;

    // 150 SA is 1.5 USD; fiat units are integral, so the quote refuses
    let err = ledger
        .convert("u-conv", 150, Currency::Usd)
        .await
        .expect_err("inexact");
    assert!(matches!(err, LedgerError::InvalidAmount { .. }));

    let err = ledger
        .convert("u-conv", 0, Currency::Usd)
        .await
        .expect_err("zero");
    assert!(matches!(err, LedgerError::InvalidAmount { .. }));

    // Rejections write nothing
    let account = ledger.balance_of("u-conv").await.expect("balance");
    assert_eq!(account.total_balance, 1_000);
    assert_eq!(entries_of(&ledger, "u-conv").await.len(), 1);
}

#[tokio::test]
async fn reference_rates() {
    let (ledger, _clock) = engine(BASE_TIME);
    fund(&ledger, "u-conv", 1_000).await;

    // 1 USD = 100 SA
    let usd = ledger
        .convert("u-conv", 500, Currency::Usd)
        .await
        .expect("usd quote");
    assert_eq!(usd.converted_amount, 5);
    assert_eq!(usd.currency, Currency::Usd);

    // 1 SA = 1,440 NGN
    let ngn = ledger
        .convert("u-conv", 100, Currency::Ngn)
        .await
        .expect("ngn quote");
    assert_eq!(ngn.converted_amount, 144_000);
}

#[tokio::test]
async fn conversion_needs_available_funds_not_held_ones() {
    let (ledger, clock) = engine(BASE_TIME);

    // Earnings on hold cannot be converted
    ledger
        .apply_entry(kora_ledger::ApplyEntry {
            user_id: "u-held".to_string(),
            kind: kora_types::EntryKind::EngagementEarn,
            amount: 80,
            hold_secs: None,
            related_entity_id: None,
            idempotency_key: None,
        })
        .await
        .expect("earn");

    // NGN converts at 1 SA granularity, so only the hold stands in the way
    let err = ledger
        .convert("u-held", 80, Currency::Ngn)
        .await
        .expect_err("held funds");
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds {
            required: 80,
            available: 0
        }
    ));

    // After maturation the same conversion goes through
    clock.advance(24 * kora_types::HOUR_SECS);
    let quote = ledger
        .convert("u-held", 80, Currency::Ngn)
        .await
        .expect("matured funds convert");
    assert_eq!(quote.converted_amount, 80 * 1_440);
}
