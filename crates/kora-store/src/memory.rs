//! In-memory [`LedgerStore`] for tests.
//!
//! Same commit semantics as the SQLite store, including version
//! conflicts, so engine behavior under contention can be exercised
//! without a database file.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use kora_types::{AuditLogEntry, Boost, BoostId, ReserveAccount, UserId};

use crate::port::{LedgerStore, UserCommit, UserState, VersionedReserve, VersionedUser};
use crate::{Result, StoreError};

#[derive(Default)]
struct MemoryInner {
    users: HashMap<UserId, VersionedUser>,
    reserve_version: u64,
    reserve: ReserveAccount,
    boosts: HashMap<BoostId, Boost>,
    audit: Vec<AuditLogEntry>,
}

/// Test store backed by a single async mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load_user(&self, user_id: &str) -> Result<Option<VersionedUser>> {
        let inner = self.inner.lock().await;
        Ok(inner.users.get(user_id).cloned())
    }

    async fn commit_user(&self, commit: UserCommit) -> Result<u64> {
        let mut inner = self.inner.lock().await;

        let current = inner.users.get(&commit.user_id).map_or(0, |u| u.version);
        if current != commit.expected_version {
            return Err(StoreError::VersionConflict);
        }

        // Validate before mutating so a failed commit leaves no trace.
        if let Some(update) = &commit.withdrawal_update {
            let exists = inner.users.get(&commit.user_id).is_some_and(|u| {
                u.state
                    .withdrawals
                    .iter()
                    .any(|w| w.withdrawal_id == update.withdrawal_id)
            });
            if !exists {
                return Err(StoreError::NotFound(format!(
                    "withdrawal {}",
                    update.withdrawal_id
                )));
            }
        }

        let next = current + 1;
        let doc = inner
            .users
            .entry(commit.user_id.clone())
            .or_insert_with(|| VersionedUser {
                version: 0,
                state: UserState {
                    account: commit.account.clone(),
                    entries: Vec::new(),
                    withdrawals: Vec::new(),
                    idempotency: Vec::new(),
                },
            });

        doc.version = next;
        doc.state.account = commit.account;
        doc.state.entries.extend(commit.new_entries);
        if let Some(withdrawal) = commit.new_withdrawal {
            doc.state.withdrawals.push(withdrawal);
        }
        if let Some(update) = commit.withdrawal_update {
            if let Some(target) = doc
                .state
                .withdrawals
                .iter_mut()
                .find(|w| w.withdrawal_id == update.withdrawal_id)
            {
                target.status = update.status;
                if let Some(at) = update.decided_at {
                    target.decided_at = Some(at);
                }
                if let Some(reason) = update.decision_reason {
                    target.decision_reason = Some(reason);
                }
                if let Some(reference) = update.gateway_reference {
                    target.gateway_reference = Some(reference);
                }
            }
        }
        if let Some(record) = commit.new_idempotency {
            doc.state.idempotency.push(record);
        }

        Ok(next)
    }

    async fn load_reserve(&self) -> Result<VersionedReserve> {
        let inner = self.inner.lock().await;
        Ok(VersionedReserve {
            version: inner.reserve_version,
            reserve: inner.reserve.clone(),
        })
    }

    async fn commit_reserve(&self, reserve: ReserveAccount, expected_version: u64) -> Result<u64> {
        let mut inner = self.inner.lock().await;
        if inner.reserve_version != expected_version {
            return Err(StoreError::VersionConflict);
        }
        inner.reserve = reserve;
        inner.reserve_version += 1;
        Ok(inner.reserve_version)
    }

    async fn insert_boost(&self, boost: &Boost) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.boosts.contains_key(&boost.boost_id) {
            return Err(StoreError::Constraint(format!(
                "duplicate boost {}",
                boost.boost_id
            )));
        }
        inner.boosts.insert(boost.boost_id.clone(), boost.clone());
        Ok(())
    }

    async fn active_boosts(&self, post_id: &str, now: u64) -> Result<Vec<Boost>> {
        let inner = self.inner.lock().await;
        let mut out: Vec<Boost> = inner
            .boosts
            .values()
            .filter(|b| b.post_id == post_id && b.is_active(now))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn find_boost(&self, boost_id: &str) -> Result<Option<Boost>> {
        let inner = self.inner.lock().await;
        Ok(inner.boosts.get(boost_id).cloned())
    }

    async fn owner_of_withdrawal(&self, withdrawal_id: &str) -> Result<Option<UserId>> {
        let inner = self.inner.lock().await;
        for (user_id, doc) in &inner.users {
            if doc
                .state
                .withdrawals
                .iter()
                .any(|w| w.withdrawal_id == withdrawal_id)
            {
                return Ok(Some(user_id.clone()));
            }
        }
        Ok(None)
    }

    async fn append_audit(
        &self,
        admin_id: &str,
        action: &str,
        detail: &serde_json::Value,
        timestamp: u64,
    ) -> Result<AuditLogEntry> {
        let mut inner = self.inner.lock().await;
        let entry = AuditLogEntry {
            seq: inner.audit.len() as u64 + 1,
            admin_id: admin_id.to_string(),
            action: action.to_string(),
            detail: detail.clone(),
            timestamp,
        };
        inner.audit.push(entry.clone());
        Ok(entry)
    }

    async fn audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audit
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn users_with_maturing_holds(&self, since: u64, until: u64) -> Result<Vec<UserId>> {
        let inner = self.inner.lock().await;
        let mut out: Vec<UserId> = inner
            .users
            .iter()
            .filter(|(_, doc)| {
                doc.state
                    .entries
                    .iter()
                    .any(|e| e.amount > 0 && e.available_at > since && e.available_at <= until)
            })
            .map(|(id, _)| id.clone())
            .collect();
        out.sort();
        Ok(out)
    }
}
