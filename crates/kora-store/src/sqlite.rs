//! SQLite-backed [`LedgerStore`].
//!
//! One connection behind an async mutex; every commit runs in a single
//! SQL transaction. The version gate is a conditional UPDATE: zero rows
//! changed means another writer got there first.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;

use kora_types::{
    Account, AuditLogEntry, Boost, Currency, EntryKind, LedgerEntry, ReserveAccount,
    SubscriptionTier, UserId, Withdrawal, WithdrawalStatus,
};

use crate::port::{
    IdempotencyRecord, LedgerStore, UserCommit, UserState, VersionedReserve, VersionedUser,
};
use crate::{migrations, Result, StoreError};

/// Production store over a single SQLite database.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    ///
    /// Configures WAL mode, foreign keys, and runs any pending
    /// migrations.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

fn serialization(err: impl std::fmt::Display) -> StoreError {
    StoreError::Serialization(err.to_string())
}

fn read_account(conn: &Connection, user_id: &str) -> Result<Option<(u64, Account)>> {
    let row = conn
        .query_row(
            "SELECT version, total_balance, available_balance, on_hold_balance,
                    subscription_tier, subscription_expires_at, created_at
             FROM accounts WHERE user_id = ?1",
            [user_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, i64>(1)? as u64,
                    row.get::<_, i64>(2)? as u64,
                    row.get::<_, i64>(3)? as u64,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, i64>(6)? as u64,
                ))
            },
        )
        .optional()?;

    let Some((version, total, available, on_hold, tier, expires, created_at)) = row else {
        return Ok(None);
    };

    Ok(Some((
        version,
        Account {
            user_id: user_id.to_string(),
            total_balance: total,
            available_balance: available,
            on_hold_balance: on_hold,
            subscription_tier: SubscriptionTier::parse(&tier).map_err(serialization)?,
            subscription_expires_at: expires.map(|v| v as u64),
            created_at,
        },
    )))
}

fn read_entries(conn: &Connection, user_id: &str) -> Result<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entry_id, kind, amount, created_at, available_at, related_entity_id, reversal_of
         FROM ledger_entries WHERE user_id = ?1 ORDER BY entry_id",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok((
                row.get::<_, i64>(0)? as u64,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)? as u64,
                row.get::<_, i64>(4)? as u64,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<i64>>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(entry_id, kind, amount, created_at, available_at, related, reversal)| {
                Ok(LedgerEntry {
                    entry_id,
                    user_id: user_id.to_string(),
                    kind: EntryKind::parse(&kind).map_err(serialization)?,
                    amount,
                    created_at,
                    available_at,
                    related_entity_id: related,
                    reversal_of: reversal.map(|v| v as u64),
                })
            },
        )
        .collect()
}

fn read_withdrawals(conn: &Connection, user_id: &str) -> Result<Vec<Withdrawal>> {
    let mut stmt = conn.prepare(
        "SELECT withdrawal_id, amount, currency, method, status, created_at,
                decided_at, decision_reason, gateway_reference
         FROM withdrawals WHERE user_id = ?1 ORDER BY created_at, withdrawal_id",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as u64,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)? as u64,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(
            |(id, amount, currency, method, status, created_at, decided, reason, reference)| {
                Ok(Withdrawal {
                    withdrawal_id: id,
                    user_id: user_id.to_string(),
                    amount,
                    currency: Currency::parse(&currency).map_err(serialization)?,
                    method,
                    status: WithdrawalStatus::parse(&status).map_err(serialization)?,
                    created_at,
                    decided_at: decided.map(|v| v as u64),
                    decision_reason: reason,
                    gateway_reference: reference,
                })
            },
        )
        .collect()
}

fn read_idempotency(conn: &Connection, user_id: &str) -> Result<Vec<IdempotencyRecord>> {
    let mut stmt = conn.prepare(
        "SELECT key, entry_id, boost_id, created_at
         FROM idempotency_keys WHERE user_id = ?1 ORDER BY created_at, key",
    )?;

    let rows = stmt
        .query_map([user_id], |row| {
            Ok(IdempotencyRecord {
                key: row.get(0)?,
                entry_id: row.get::<_, Option<i64>>(1)?.map(|v| v as u64),
                boost_id: row.get(2)?,
                created_at: row.get::<_, i64>(3)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_boost_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Boost> {
    Ok(Boost {
        boost_id: row.get(0)?,
        post_id: row.get(1)?,
        booster_user_id: row.get(2)?,
        creator_user_id: row.get(3)?,
        cost: row.get::<_, i64>(4)? as u64,
        created_at: row.get::<_, i64>(5)? as u64,
        expires_at: row.get::<_, i64>(6)? as u64,
    })
}

const BOOST_COLUMNS: &str =
    "boost_id, post_id, booster_user_id, creator_user_id, cost, created_at, expires_at";

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn load_user(&self, user_id: &str) -> Result<Option<VersionedUser>> {
        let conn = self.conn.lock().await;

        let (version, account) = match read_account(&conn, user_id)? {
            Some(found) => found,
            None => return Ok(None),
        };

        Ok(Some(VersionedUser {
            version,
            state: UserState {
                account,
                entries: read_entries(&conn, user_id)?,
                withdrawals: read_withdrawals(&conn, user_id)?,
                idempotency: read_idempotency(&conn, user_id)?,
            },
        }))
    }

    async fn commit_user(&self, commit: UserCommit) -> Result<u64> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let next_version = commit.expected_version + 1;
        let acct = &commit.account;

        if commit.expected_version == 0 {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO accounts
                     (user_id, version, total_balance, available_balance, on_hold_balance,
                      subscription_tier, subscription_expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    commit.user_id,
                    next_version as i64,
                    acct.total_balance as i64,
                    acct.available_balance as i64,
                    acct.on_hold_balance as i64,
                    acct.subscription_tier.as_str(),
                    acct.subscription_expires_at.map(|v| v as i64),
                    acct.created_at as i64,
                ],
            )?;
            if inserted == 0 {
                return Err(StoreError::VersionConflict);
            }
        } else {
            let updated = tx.execute(
                "UPDATE accounts
                 SET version = ?1, total_balance = ?2, available_balance = ?3,
                     on_hold_balance = ?4, subscription_tier = ?5, subscription_expires_at = ?6
                 WHERE user_id = ?7 AND version = ?8",
                rusqlite::params![
                    next_version as i64,
                    acct.total_balance as i64,
                    acct.available_balance as i64,
                    acct.on_hold_balance as i64,
                    acct.subscription_tier.as_str(),
                    acct.subscription_expires_at.map(|v| v as i64),
                    commit.user_id,
                    commit.expected_version as i64,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::VersionConflict);
            }
        }

        for entry in &commit.new_entries {
            tx.execute(
                "INSERT INTO ledger_entries
                     (user_id, entry_id, kind, amount, created_at, available_at,
                      related_entity_id, reversal_of)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    entry.user_id,
                    entry.entry_id as i64,
                    entry.kind.as_str(),
                    entry.amount,
                    entry.created_at as i64,
                    entry.available_at as i64,
                    entry.related_entity_id,
                    entry.reversal_of.map(|v| v as i64),
                ],
            )?;
        }

        if let Some(withdrawal) = &commit.new_withdrawal {
            tx.execute(
                "INSERT INTO withdrawals
                     (withdrawal_id, user_id, amount, currency, method, status, created_at,
                      decided_at, decision_reason, gateway_reference)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    withdrawal.withdrawal_id,
                    withdrawal.user_id,
                    withdrawal.amount as i64,
                    withdrawal.currency.as_str(),
                    withdrawal.method,
                    withdrawal.status.as_str(),
                    withdrawal.created_at as i64,
                    withdrawal.decided_at.map(|v| v as i64),
                    withdrawal.decision_reason,
                    withdrawal.gateway_reference,
                ],
            )?;
        }

        if let Some(update) = &commit.withdrawal_update {
            let updated = tx.execute(
                "UPDATE withdrawals
                 SET status = ?1,
                     decided_at = COALESCE(?2, decided_at),
                     decision_reason = COALESCE(?3, decision_reason),
                     gateway_reference = COALESCE(?4, gateway_reference)
                 WHERE withdrawal_id = ?5 AND user_id = ?6",
                rusqlite::params![
                    update.status.as_str(),
                    update.decided_at.map(|v| v as i64),
                    update.decision_reason,
                    update.gateway_reference,
                    update.withdrawal_id,
                    commit.user_id,
                ],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!(
                    "withdrawal {}",
                    update.withdrawal_id
                )));
            }
        }

        if let Some(record) = &commit.new_idempotency {
            tx.execute(
                "INSERT INTO idempotency_keys (user_id, key, entry_id, boost_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    commit.user_id,
                    record.key,
                    record.entry_id.map(|v| v as i64),
                    record.boost_id,
                    record.created_at as i64,
                ],
            )?;
        }

        tx.commit()?;
        Ok(next_version)
    }

    async fn load_reserve(&self) -> Result<VersionedReserve> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT version, total_balance, available_balance, on_hold_balance
                 FROM reserve WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get::<_, i64>(3)? as u64,
                    ))
                },
            )
            .optional()?;

        let (version, total, available, on_hold) =
            row.ok_or_else(|| StoreError::NotFound("reserve row".into()))?;

        Ok(VersionedReserve {
            version,
            reserve: ReserveAccount {
                total_balance: total,
                available_balance: available,
                on_hold_balance: on_hold,
            },
        })
    }

    async fn commit_reserve(&self, reserve: ReserveAccount, expected_version: u64) -> Result<u64> {
        let conn = self.conn.lock().await;
        let updated = conn.execute(
            "UPDATE reserve
             SET version = version + 1, total_balance = ?1, available_balance = ?2,
                 on_hold_balance = ?3
             WHERE id = 1 AND version = ?4",
            rusqlite::params![
                reserve.total_balance as i64,
                reserve.available_balance as i64,
                reserve.on_hold_balance as i64,
                expected_version as i64,
            ],
        )?;
        if updated == 0 {
            return Err(StoreError::VersionConflict);
        }
        Ok(expected_version + 1)
    }

    async fn insert_boost(&self, boost: &Boost) -> Result<()> {
        let conn = self.conn.lock().await;
        let result = conn.execute(
            "INSERT INTO boosts
                 (boost_id, post_id, booster_user_id, creator_user_id, cost, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                boost.boost_id,
                boost.post_id,
                boost.booster_user_id,
                boost.creator_user_id,
                boost.cost as i64,
                boost.created_at as i64,
                boost.expires_at as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Constraint(format!(
                    "duplicate boost {}",
                    boost.boost_id
                )))
            }
            Err(e) => Err(StoreError::Sqlite(e)),
        }
    }

    async fn active_boosts(&self, post_id: &str, now: u64) -> Result<Vec<Boost>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {BOOST_COLUMNS} FROM boosts
             WHERE post_id = ?1 AND expires_at >= ?2
             ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(rusqlite::params![post_id, now as i64], map_boost_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    async fn find_boost(&self, boost_id: &str) -> Result<Option<Boost>> {
        let conn = self.conn.lock().await;
        let boost = conn
            .query_row(
                &format!("SELECT {BOOST_COLUMNS} FROM boosts WHERE boost_id = ?1"),
                [boost_id],
                map_boost_row,
            )
            .optional()?;
        Ok(boost)
    }

    async fn owner_of_withdrawal(&self, withdrawal_id: &str) -> Result<Option<UserId>> {
        let conn = self.conn.lock().await;
        let owner = conn
            .query_row(
                "SELECT user_id FROM withdrawals WHERE withdrawal_id = ?1",
                [withdrawal_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    async fn append_audit(
        &self,
        admin_id: &str,
        action: &str,
        detail: &serde_json::Value,
        timestamp: u64,
    ) -> Result<AuditLogEntry> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO audit_log (admin_id, action, detail, timestamp)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![admin_id, action, detail.to_string(), timestamp as i64],
        )?;
        Ok(AuditLogEntry {
            seq: conn.last_insert_rowid() as u64,
            admin_id: admin_id.to_string(),
            action: action.to_string(),
            detail: detail.clone(),
            timestamp,
        })
    }

    async fn audit_log(&self, limit: u32) -> Result<Vec<AuditLogEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT seq, admin_id, action, detail, timestamp
             FROM audit_log ORDER BY seq DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)? as u64,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(seq, admin_id, action, detail, timestamp)| {
                Ok(AuditLogEntry {
                    seq,
                    admin_id,
                    action,
                    detail: serde_json::from_str(&detail).map_err(serialization)?,
                    timestamp,
                })
            })
            .collect()
    }

    async fn users_with_maturing_holds(&self, since: u64, until: u64) -> Result<Vec<UserId>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT user_id FROM ledger_entries
             WHERE amount > 0 AND available_at > ?1 AND available_at <= ?2
             ORDER BY user_id",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![since as i64, until as i64], |row| {
                row.get(0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
