//! Wallet command handlers: balances, history, earns, conversion,
//! subscription activation.

use std::sync::Arc;

use serde_json::Value;

use kora_ledger::ApplyEntry;
use kora_types::{Currency, EntryKind};

use super::{opt_str, require_str, require_u64, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Get a user's balance. Rederives from the entry log, so matured holds
/// are reflected even before the sweep touches the account.
pub async fn get_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let account = state
        .engine
        .balance_of(user_id)
        .await
        .map_err(RpcError::from_ledger)?;
    to_json(&account)
}

/// Get a user's ledger history, newest first.
pub async fn get_history(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let limit = params
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(100) as usize;
    let entries = state
        .engine
        .history(user_id, limit)
        .await
        .map_err(RpcError::from_ledger)?;
    to_json(&entries)
}

/// Record an earn entry (engagement, subscription, or boost earn).
pub async fn record_earn(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let kind_str = require_str(params, "kind")?;
    let kind = EntryKind::parse(kind_str)
        .map_err(|_| RpcError::invalid_params(&format!("unknown entry kind: {kind_str}")))?;
    if !kind.is_earn() {
        return Err(RpcError::invalid_params(&format!(
            "{kind_str} is not an earn kind"
        )));
    }
    let amount = i64::try_from(require_u64(params, "amount")?)
        .map_err(|_| RpcError::invalid_params("amount too large"))?;
    let hold_secs = params.get("hold_secs").and_then(|v| v.as_u64());

    let entry = state
        .engine
        .apply_entry(ApplyEntry {
            user_id: user_id.to_string(),
            kind,
            amount,
            hold_secs,
            related_entity_id: opt_str(params, "related_entity_id"),
            idempotency_key: opt_str(params, "idempotency_key"),
        })
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "EntryApplied",
        serde_json::json!({
            "user_id": entry.user_id,
            "entry_id": entry.entry_id,
            "kind": entry.kind.as_str(),
            "amount": entry.amount,
            "available_at": entry.available_at,
        }),
    );
    to_json(&entry)
}

/// Convert SA into a fiat quote, debiting the SA immediately.
pub async fn convert(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let sa_amount = require_u64(params, "sa_amount")?;
    let currency_str = require_str(params, "currency")?;
    let currency = Currency::parse(currency_str)
        .map_err(|_| RpcError::invalid_params(&format!("unknown currency: {currency_str}")))?;

    let quote = state
        .engine
        .convert(user_id, sa_amount, currency)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "ConversionApplied",
        serde_json::json!({
            "user_id": user_id,
            "sa_amount": quote.sa_amount,
            "converted_amount": quote.converted_amount,
            "currency": quote.currency.as_str(),
            "entry_id": quote.entry_id,
        }),
    );
    to_json(&quote)
}

/// Whether a user clears the follower bar for verification.
pub async fn get_verification_eligibility(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let eligibility = state.engine.verification_eligibility(user_id).await;
    to_json(&eligibility)
}

/// Gateway webhook: a subscription checkout completed. Idempotent per
/// gateway reference.
pub async fn activate_subscription(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let reference = require_str(params, "gateway_reference")?;

    let account = state
        .engine
        .activate_subscription(user_id, reference)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "SubscriptionActivated",
        serde_json::json!({
            "user_id": user_id,
            "expires_at": account.subscription_expires_at,
        }),
    );
    to_json(&account)
}
