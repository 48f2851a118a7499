//! IPC command handlers.
//!
//! Each submodule implements the commands for one RPC category. Handlers
//! take the shared daemon state plus the raw JSON params, run the engine
//! operation, emit the corresponding event, and return the JSON result.

pub mod admin;
pub mod boost;
pub mod wallet;
pub mod withdrawals;

use serde_json::Value;

use crate::rpc::RpcError;

pub type Result = std::result::Result<Value, RpcError>;

/// Extract a required string parameter.
pub fn require_str<'a>(params: &'a Value, key: &str) -> std::result::Result<&'a str, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Extract a required unsigned integer parameter.
pub fn require_u64(params: &Value, key: &str) -> std::result::Result<u64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Extract a required signed integer parameter.
pub fn require_i64(params: &Value, key: &str) -> std::result::Result<i64, RpcError> {
    params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RpcError::invalid_params(&format!("{key} required")))
}

/// Extract an optional string parameter.
pub fn opt_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

/// Serialize an engine result value into JSON.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}
