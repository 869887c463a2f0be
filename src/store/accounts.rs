//! Postgres account store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{AccountStore, PgStore};
use crate::account::{Account, PremiumState};

fn map_row(row: &sqlx::postgres::PgRow) -> Account {
    let premium_state: String = row.get("premium_state");
    Account {
        id: row.get("id"),
        display_name: row.get("display_name"),
        password_hash: row.get("password_hash"),
        premium_state: PremiumState::parse(&premium_state),
        created_at: row.get("created_at"),
    }
}

async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Account>> {
    let query = "SELECT id, display_name, password_hash, premium_state, created_at \
                 FROM accounts WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up account by id")?;
    Ok(row.as_ref().map(map_row))
}

async fn find_by_display_name(pool: &PgPool, name: &str) -> Result<Option<Account>> {
    let query = "SELECT id, display_name, password_hash, premium_state, created_at \
                 FROM accounts WHERE LOWER(display_name) = LOWER($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(name)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up account by display name")?;
    Ok(row.as_ref().map(map_row))
}

async fn save(pool: &PgPool, account: &Account) -> Result<()> {
    // created_at is immutable after the first insert.
    let query = r"
        INSERT INTO accounts (id, display_name, password_hash, premium_state, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (id) DO UPDATE SET
            display_name  = EXCLUDED.display_name,
            password_hash = EXCLUDED.password_hash,
            premium_state = EXCLUDED.premium_state
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(account.id)
        .bind(&account.display_name)
        .bind(&account.password_hash)
        .bind(account.premium_state.as_str())
        .bind(account.created_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to save account")?;
    Ok(())
}

async fn count_identities_by_address(pool: &PgPool, address: &str) -> Result<i64> {
    // Addresses are tracked per session, so the alt limit counts there.
    let query = "SELECT COUNT(DISTINCT identity_id) FROM sessions WHERE source_address = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(address)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to count identities by address")?;
    Ok(row.get::<i64, _>(0))
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        find_by_id(self.pool(), id).await
    }

    async fn find_by_display_name(&self, name: &str) -> Result<Option<Account>> {
        find_by_display_name(self.pool(), name).await
    }

    async fn save(&self, account: &Account) -> Result<()> {
        save(self.pool(), account).await
    }

    async fn count_identities_by_address(&self, address: &str) -> Result<i64> {
        count_identities_by_address(self.pool(), address).await
    }
}
