//! SQL schema definitions.

/// Complete schema for the Kora v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Accounts
-- ============================================================

CREATE TABLE IF NOT EXISTS accounts (
    user_id TEXT PRIMARY KEY,
    version INTEGER NOT NULL,
    total_balance INTEGER NOT NULL DEFAULT 0,
    available_balance INTEGER NOT NULL DEFAULT 0,
    on_hold_balance INTEGER NOT NULL DEFAULT 0,
    subscription_tier TEXT NOT NULL DEFAULT 'free',
    subscription_expires_at INTEGER,
    created_at INTEGER NOT NULL
);

-- ============================================================
-- Ledger entries (append-only)
-- ============================================================

CREATE TABLE IF NOT EXISTS ledger_entries (
    user_id TEXT NOT NULL REFERENCES accounts(user_id),
    entry_id INTEGER NOT NULL,
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    available_at INTEGER NOT NULL,
    related_entity_id TEXT,
    reversal_of INTEGER,
    PRIMARY KEY (user_id, entry_id)
);

CREATE INDEX IF NOT EXISTS idx_entries_available ON ledger_entries(available_at);

-- ============================================================
-- Withdrawals
-- ============================================================

CREATE TABLE IF NOT EXISTS withdrawals (
    withdrawal_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES accounts(user_id),
    amount INTEGER NOT NULL,
    currency TEXT NOT NULL,
    method TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at INTEGER NOT NULL,
    decided_at INTEGER,
    decision_reason TEXT,
    gateway_reference TEXT
);

CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals(user_id, created_at);

-- ============================================================
-- Idempotency keys
-- ============================================================

CREATE TABLE IF NOT EXISTS idempotency_keys (
    user_id TEXT NOT NULL REFERENCES accounts(user_id),
    key TEXT NOT NULL,
    entry_id INTEGER,
    boost_id TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, key)
);

-- ============================================================
-- Boosts
-- ============================================================

CREATE TABLE IF NOT EXISTS boosts (
    boost_id TEXT PRIMARY KEY,
    post_id TEXT NOT NULL,
    booster_user_id TEXT NOT NULL,
    creator_user_id TEXT NOT NULL,
    cost INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_boosts_post ON boosts(post_id, expires_at);

-- ============================================================
-- Platform reserve (singleton row)
-- ============================================================

CREATE TABLE IF NOT EXISTS reserve (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL DEFAULT 0,
    total_balance INTEGER NOT NULL DEFAULT 0,
    available_balance INTEGER NOT NULL DEFAULT 0,
    on_hold_balance INTEGER NOT NULL DEFAULT 0
);

-- ============================================================
-- Admin audit log
-- ============================================================

CREATE TABLE IF NOT EXISTS audit_log (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    admin_id TEXT NOT NULL,
    action TEXT NOT NULL,
    detail TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);
"#;
