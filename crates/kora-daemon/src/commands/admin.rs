//! Admin command handlers: withdrawal decisions, reserve and balance
//! adjustments, audit log, daemon status.

use std::sync::Arc;

use serde_json::Value;

use kora_ledger::WithdrawalDecision;

use super::{opt_str, require_i64, require_str, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Approve or reject a pending withdrawal.
pub async fn decide_withdrawal(state: &Arc<DaemonState>, params: &Value) -> Result {
    let admin_id = require_str(params, "admin_id")?;
    let withdrawal_id = require_str(params, "withdrawal_id")?;
    let decision = match require_str(params, "decision")? {
        "approve" => WithdrawalDecision::Approve,
        "reject" => WithdrawalDecision::Reject,
        other => {
            return Err(RpcError::invalid_params(&format!(
                "unknown decision: {other}"
            )))
        }
    };
    let reason = opt_str(params, "reason");

    let withdrawal = state
        .engine
        .decide_withdrawal(admin_id, withdrawal_id, decision, reason)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "WithdrawalDecided",
        serde_json::json!({
            "withdrawal_id": withdrawal.withdrawal_id,
            "user_id": withdrawal.user_id,
            "status": withdrawal.status.as_str(),
            "decided_by": admin_id,
        }),
    );
    to_json(&withdrawal)
}

/// Signed adjustment of the platform reserve.
pub async fn adjust_reserve(state: &Arc<DaemonState>, params: &Value) -> Result {
    let admin_id = require_str(params, "admin_id")?;
    let delta = require_i64(params, "delta")?;
    let reason = require_str(params, "reason")?;

    let reserve = state
        .engine
        .adjust_reserve(admin_id, delta, reason)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "ReserveAdjusted",
        serde_json::json!({
            "admin_id": admin_id,
            "delta": delta,
            "total_balance": reserve.total_balance,
        }),
    );
    to_json(&reserve)
}

/// Signed admin adjustment on a user's ledger.
pub async fn adjust_user_balance(state: &Arc<DaemonState>, params: &Value) -> Result {
    let admin_id = require_str(params, "admin_id")?;
    let user_id = require_str(params, "user_id")?;
    let amount = require_i64(params, "amount")?;
    let reason = require_str(params, "reason")?;

    let entry = state
        .engine
        .credit_admin_adjustment(admin_id, user_id, amount, reason)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "UserBalanceAdjusted",
        serde_json::json!({
            "admin_id": admin_id,
            "user_id": user_id,
            "amount": amount,
            "entry_id": entry.entry_id,
        }),
    );
    to_json(&entry)
}

/// Current platform reserve balance.
pub async fn get_reserve(state: &Arc<DaemonState>) -> Result {
    let reserve = state
        .engine
        .reserve_balance()
        .await
        .map_err(RpcError::from_ledger)?;
    to_json(&reserve)
}

/// Read the audit log, newest first.
pub async fn get_audit_log(state: &Arc<DaemonState>, params: &Value) -> Result {
    let limit = params
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(100) as u32;
    let log = state
        .engine
        .audit_log(limit)
        .await
        .map_err(RpcError::from_ledger)?;
    to_json(&log)
}

/// Daemon version and event sequence.
pub async fn get_status(state: &Arc<DaemonState>) -> Result {
    Ok(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "event_sequence": state.event_bus.sequence(),
        "sweep_interval_secs": state.config.sweep.interval_secs,
    }))
}
