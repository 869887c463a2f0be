//! Persistent stores.
//!
//! Each store is a narrow trait over single-row upserts; no cross-table
//! transactions are required. Invariants live in the row shape, not in
//! locking: one account per id, one session per identity, one throttle row
//! per address, an append-only drift log. The Postgres backend is
//! [`PgStore`]; [`memory::MemoryStore`] backs tests and single-node tools.

pub mod accounts;
pub mod fingerprints;
pub mod memory;
pub mod sessions;
pub mod throttle;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use crate::account::Account;
use crate::session::Session;

/// Identity account persistence.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>>;

    /// Case-insensitive display-name lookup.
    async fn find_by_display_name(&self, name: &str) -> Result<Option<Account>>;

    /// Upsert by id; last writer wins on concurrent saves of the same id.
    async fn save(&self, account: &Account) -> Result<()>;

    /// Distinct identities with a session row from `address`, for the
    /// alt-account limit.
    async fn count_identities_by_address(&self, address: &str) -> Result<i64>;
}

/// Session persistence: at most one row per identity.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>>;
    async fn save(&self, session: &Session) -> Result<()>;
    async fn delete(&self, id: Uuid) -> Result<()>;
    async fn delete_expired(&self, now: i64) -> Result<()>;
}

/// Persisted ban state for one source address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThrottleRecord {
    pub source_address: String,
    pub failure_count: i64,
    /// Epoch millis; 0 means not banned.
    pub banned_until: i64,
}

/// Brute-force ban persistence. Attempt counters stay in memory; only bans
/// survive a restart.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    async fn find(&self, address: &str) -> Result<Option<ThrottleRecord>>;
    async fn upsert_ban(&self, address: &str, failure_count: i64, banned_until: i64) -> Result<()>;
    async fn delete(&self, address: &str) -> Result<()>;
}

/// Append-only fingerprint drift log, counted over a trailing window.
#[async_trait]
pub trait FingerprintLog: Send + Sync {
    async fn append(&self, id: Uuid, changed_at: i64) -> Result<()>;
    async fn count_since(&self, id: Uuid, since: i64) -> Result<i64>;
}

/// Postgres-backed implementation of all four store traits.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Connect a pool sized for the authority's worker traffic.
///
/// # Errors
/// Returns an error if the connection cannot be established.
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to database")
}

/// Create the schema if it does not exist yet.
///
/// Timestamps are epoch-millisecond `BIGINT` columns so rows mean the same
/// thing under every engine and timezone.
///
/// # Errors
/// Returns an error if any DDL statement fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS accounts (
            id            UUID         PRIMARY KEY,
            display_name  VARCHAR(32)  NOT NULL,
            password_hash TEXT,
            premium_state VARCHAR(20)  NOT NULL DEFAULT 'CRACKED',
            created_at    BIGINT       NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create accounts table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS sessions (
            identity_id    UUID        PRIMARY KEY,
            source_address VARCHAR(45) NOT NULL,
            fingerprint    CHAR(64),
            expires_at     BIGINT      NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create sessions table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS throttle (
            source_address VARCHAR(45) PRIMARY KEY,
            failure_count  BIGINT      NOT NULL DEFAULT 0,
            banned_until   BIGINT      NOT NULL DEFAULT 0
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create throttle table")?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS fingerprint_changes (
            identity_id UUID   NOT NULL,
            changed_at  BIGINT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("failed to create fingerprint_changes table")?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS fingerprint_changes_identity_time
        ON fingerprint_changes (identity_id, changed_at)
        ",
    )
    .execute(pool)
    .await
    .context("failed to create fingerprint_changes index")?;

    Ok(())
}
