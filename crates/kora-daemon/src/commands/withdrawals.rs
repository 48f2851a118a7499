//! Withdrawal command handlers: user-facing requests plus the gateway
//! payout lifecycle.

use std::sync::Arc;

use serde_json::Value;

use kora_types::Currency;

use super::{require_str, require_u64, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Open a payout request. Policy checks run inside the engine; a failure
/// writes nothing.
pub async fn request_withdrawal(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let amount = require_u64(params, "amount")?;
    let currency_str = require_str(params, "currency")?;
    let currency = Currency::parse(currency_str)
        .map_err(|_| RpcError::invalid_params(&format!("unknown currency: {currency_str}")))?;
    let method = require_str(params, "method")?;

    let withdrawal = state
        .engine
        .request_withdrawal(user_id, amount, currency, method)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "WithdrawalRequested",
        serde_json::json!({
            "withdrawal_id": withdrawal.withdrawal_id,
            "user_id": withdrawal.user_id,
            "amount": withdrawal.amount,
        }),
    );
    to_json(&withdrawal)
}

/// List a user's withdrawal requests, newest first.
pub async fn get_withdrawals(state: &Arc<DaemonState>, params: &Value) -> Result {
    let user_id = require_str(params, "user_id")?;
    let limit = params
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(50) as usize;
    let withdrawals = state
        .engine
        .withdrawals_of(user_id, limit)
        .await
        .map_err(RpcError::from_ledger)?;
    to_json(&withdrawals)
}

/// Start the external payout for an approved withdrawal. Idempotent: a
/// withdrawal that already has a gateway reference is returned as-is.
pub async fn initiate_payout(state: &Arc<DaemonState>, params: &Value) -> Result {
    let withdrawal_id = require_str(params, "withdrawal_id")?;

    let withdrawal = state
        .engine
        .initiate_payout(withdrawal_id)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "PayoutInitiated",
        serde_json::json!({
            "withdrawal_id": withdrawal.withdrawal_id,
            "user_id": withdrawal.user_id,
            "gateway_reference": withdrawal.gateway_reference,
        }),
    );
    to_json(&withdrawal)
}

/// Poll the gateway for the payout outcome and settle if it completed.
pub async fn confirm_payout(state: &Arc<DaemonState>, params: &Value) -> Result {
    let withdrawal_id = require_str(params, "withdrawal_id")?;

    let withdrawal = state
        .engine
        .confirm_payout(withdrawal_id)
        .await
        .map_err(RpcError::from_ledger)?;

    if withdrawal.status == kora_types::WithdrawalStatus::Settled {
        state.event_bus.emit_now(
            "WithdrawalSettled",
            serde_json::json!({
                "withdrawal_id": withdrawal.withdrawal_id,
                "user_id": withdrawal.user_id,
                "amount": withdrawal.amount,
            }),
        );
    }
    to_json(&withdrawal)
}

/// Gateway webhook: the payout completed. Settles the withdrawal,
/// removing the held funds from the user's total. Idempotent.
pub async fn settle_withdrawal(state: &Arc<DaemonState>, params: &Value) -> Result {
    let withdrawal_id = require_str(params, "withdrawal_id")?;

    let withdrawal = state
        .engine
        .settle_withdrawal(withdrawal_id)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "WithdrawalSettled",
        serde_json::json!({
            "withdrawal_id": withdrawal.withdrawal_id,
            "user_id": withdrawal.user_id,
            "amount": withdrawal.amount,
        }),
    );
    to_json(&withdrawal)
}
