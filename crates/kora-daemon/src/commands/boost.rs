//! Boost command handlers.

use std::sync::Arc;

use serde_json::Value;

use super::{opt_str, require_str, to_json, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

/// Buy a boost for a post. The booster pays the configured cost; the
/// creator and the reserve split it per the engine config. Boosting your
/// own post is rejected here at the API boundary.
pub async fn boost_post(state: &Arc<DaemonState>, params: &Value) -> Result {
    let booster_user_id = require_str(params, "booster_user_id")?;
    let post_id = require_str(params, "post_id")?;
    let creator_user_id = require_str(params, "creator_user_id")?;
    if booster_user_id == creator_user_id {
        return Err(RpcError::invalid_params("cannot boost your own post"));
    }
    let idempotency_key = opt_str(params, "idempotency_key");

    let boost = state
        .engine
        .boost_post(booster_user_id, post_id, creator_user_id, idempotency_key)
        .await
        .map_err(RpcError::from_ledger)?;

    state.event_bus.emit_now(
        "BoostPurchased",
        serde_json::json!({
            "boost_id": boost.boost_id,
            "post_id": boost.post_id,
            "booster_user_id": boost.booster_user_id,
            "creator_user_id": boost.creator_user_id,
            "cost": boost.cost,
            "expires_at": boost.expires_at,
        }),
    );
    to_json(&boost)
}

/// List the boosts currently active for a post.
pub async fn get_active_boosts(state: &Arc<DaemonState>, params: &Value) -> Result {
    let post_id = require_str(params, "post_id")?;
    let boosts = state
        .engine
        .active_boosts(post_id)
        .await
        .map_err(RpcError::from_ledger)?;
    to_json(&boosts)
}
