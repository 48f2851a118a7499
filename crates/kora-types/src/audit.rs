//! Admin audit log records.

use serde::{Deserialize, Serialize};

use crate::AdminId;

/// One append-only audit record. Every admin-surface operation writes one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Global sequence number, assigned by the store.
    pub seq: u64,
    pub admin_id: AdminId,
    /// Action name, e.g. "decide_withdrawal" or "adjust_reserve".
    pub action: String,
    /// Action-specific fields (ids, amounts, decisions).
    pub detail: serde_json::Value,
    pub timestamp: u64,
}
