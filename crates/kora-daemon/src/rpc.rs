//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! line-delimited JSON-RPC 2.0 method calls to the command handlers. A
//! connection that calls `subscribe_events` additionally receives ledger
//! events as JSON-RPC notifications on the same socket.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use kora_ledger::LedgerError;

use crate::commands;
use crate::events::{Event, EventFilter};
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    #[allow(dead_code)]
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    /// Error code.
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Map a ledger error onto the daemon's named error codes.
    pub fn from_ledger(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds {
                required,
                available,
            } => Self {
                code: -32040,
                message: "INSUFFICIENT_FUNDS".to_string(),
                data: Some(serde_json::json!({"required": required, "available": available})),
            },
            LedgerError::AccountNotFound { user_id } => Self {
                code: -32041,
                message: "ACCOUNT_NOT_FOUND".to_string(),
                data: Some(serde_json::json!({"user_id": user_id})),
            },
            LedgerError::BelowMinimum { minimum } => Self {
                code: -32042,
                message: "BELOW_MINIMUM".to_string(),
                data: Some(serde_json::json!({"minimum": minimum})),
            },
            LedgerError::DailyCapExceeded { cap, attempted } => Self {
                code: -32043,
                message: "DAILY_CAP_EXCEEDED".to_string(),
                data: Some(serde_json::json!({"cap": cap, "attempted": attempted})),
            },
            LedgerError::CooldownActive { remaining_secs } => Self {
                code: -32044,
                message: "COOLDOWN_ACTIVE".to_string(),
                data: Some(serde_json::json!({"remaining_secs": remaining_secs})),
            },
            LedgerError::InvalidAmount { reason } => Self {
                code: -32045,
                message: "INVALID_AMOUNT".to_string(),
                data: Some(serde_json::json!({"reason": reason})),
            },
            LedgerError::ConcurrentModification { attempts } => Self {
                code: -32046,
                message: "CONCURRENT_MODIFICATION".to_string(),
                data: Some(serde_json::json!({"attempts": attempts})),
            },
            LedgerError::GatewayUnavailable { reason } => Self {
                code: -32047,
                message: "GATEWAY_UNAVAILABLE".to_string(),
                data: Some(serde_json::json!({"reason": reason})),
            },
            LedgerError::WithdrawalNotFound { withdrawal_id } => Self {
                code: -32048,
                message: "WITHDRAWAL_NOT_FOUND".to_string(),
                data: Some(serde_json::json!({"withdrawal_id": withdrawal_id})),
            },
            LedgerError::InvalidTransition { from, to } => Self {
                code: -32049,
                message: "INVALID_TRANSITION".to_string(),
                data: Some(serde_json::json!({"from": from, "to": to})),
            },
            other => Self::internal_error(&other.to_string()),
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut subscription: Option<(EventFilter, broadcast::Receiver<Event>)> = None;

    loop {
        line.clear();
        let mut bus_gone = false;
        let request_line = match subscription.as_mut() {
            None => {
                let bytes_read = reader.read_line(&mut line).await?;
                if bytes_read == 0 {
                    break;
                }
                true
            }
            Some((filter, rx)) => {
                tokio::select! {
                    bytes_read = reader.read_line(&mut line) => {
                        if bytes_read? == 0 {
                            break;
                        }
                        true
                    }
                    event = rx.recv() => {
                        match event {
                            Ok(event) => {
                                if filter.matches(&event) {
                                    let notification = serde_json::json!({
                                        "jsonrpc": "2.0",
                                        "method": "event",
                                        "params": event,
                                    });
                                    write_line(&mut writer, &notification).await?;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                warn!(missed, "event subscriber lagged, events dropped");
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                bus_gone = true;
                            }
                        }
                        false
                    }
                }
            }
        };
        if bus_gone {
            subscription = None;
        }
        if !request_line {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) if request.method == "subscribe_events" => {
                let filter: EventFilter =
                    serde_json::from_value(request.params.clone()).unwrap_or_default();
                subscription = Some((filter, state.event_bus.subscribe()));
                RpcResponse::success(request.id, serde_json::json!({"subscribed": true}))
            }
            Ok(request) if request.method == "unsubscribe_events" => {
                subscription = None;
                RpcResponse::success(request.id, serde_json::json!({"subscribed": false}))
            }
            Ok(request) => dispatch_request(state.clone(), request).await,
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        write_line(&mut writer, &response).await?;
    }

    Ok(())
}

async fn write_line<W, T>(writer: &mut W, value: &T) -> anyhow::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(value)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    debug!("dispatching RPC method: {}", method);

    let result = match method {
        // Wallet commands
        "get_balance" => commands::wallet::get_balance(&state, &request.params).await,
        "get_history" => commands::wallet::get_history(&state, &request.params).await,
        "record_earn" => commands::wallet::record_earn(&state, &request.params).await,
        "convert" => commands::wallet::convert(&state, &request.params).await,
        "get_verification_eligibility" => {
            commands::wallet::get_verification_eligibility(&state, &request.params).await
        }
        "activate_subscription" => {
            commands::wallet::activate_subscription(&state, &request.params).await
        }

        // Withdrawal commands
        "request_withdrawal" => {
            commands::withdrawals::request_withdrawal(&state, &request.params).await
        }
        "get_withdrawals" => commands::withdrawals::get_withdrawals(&state, &request.params).await,
        "initiate_payout" => commands::withdrawals::initiate_payout(&state, &request.params).await,
        "confirm_payout" => commands::withdrawals::confirm_payout(&state, &request.params).await,
        "settle_withdrawal" => {
            commands::withdrawals::settle_withdrawal(&state, &request.params).await
        }

        // Boost commands
        "boost_post" => commands::boost::boost_post(&state, &request.params).await,
        "get_active_boosts" => commands::boost::get_active_boosts(&state, &request.params).await,

        // Admin commands
        "decide_withdrawal" => commands::admin::decide_withdrawal(&state, &request.params).await,
        "adjust_reserve" => commands::admin::adjust_reserve(&state, &request.params).await,
        "adjust_user_balance" => {
            commands::admin::adjust_user_balance(&state, &request.params).await
        }
        "get_reserve" => commands::admin::get_reserve(&state).await,
        "get_audit_log" => commands::admin::get_audit_log(&state, &request.params).await,

        // System
        "get_status" => commands::admin::get_status(&state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_codes() {
        let err = RpcError::from_ledger(LedgerError::InsufficientFunds {
            required: 100,
            available: 50,
        });
        assert_eq!(err.code, -32040);
        assert_eq!(err.message, "INSUFFICIENT_FUNDS");
        assert_eq!(err.data.expect("data")["available"], 50);

        let err = RpcError::from_ledger(LedgerError::CooldownActive { remaining_secs: 7 });
        assert_eq!(err.code, -32044);

        let err = RpcError::from_ledger(LedgerError::Inconsistent("bad".to_string()));
        assert_eq!(err.code, -32603);

        let err = RpcError::method_not_found("unknown");
        assert_eq!(err.code, -32601);
    }

    #[test]
    fn test_rpc_response_shapes() {
        let resp = RpcResponse::success(serde_json::json!(1), serde_json::json!({"balance": 10}));
        assert!(resp.result.is_some());
        assert!(resp.error.is_none());

        let resp = RpcResponse::error(serde_json::json!(1), RpcError::internal_error("test"));
        assert!(resp.result.is_none());
        assert!(resp.error.is_some());
    }
}
