//! Postgres session store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::{PgStore, SessionStore};
use crate::session::Session;

fn map_row(row: &sqlx::postgres::PgRow) -> Session {
    // CHAR(64) pads with spaces; trim so hash comparisons stay exact.
    let fingerprint: Option<String> = row.get("fingerprint");
    Session {
        identity_id: row.get("identity_id"),
        source_address: row.get("source_address"),
        fingerprint: fingerprint.map(|hash| hash.trim_end().to_string()),
        expires_at: row.get("expires_at"),
    }
}

async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Session>> {
    let query = "SELECT identity_id, source_address, fingerprint, expires_at \
                 FROM sessions WHERE identity_id = $1";
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
        .context("failed to look up session")?;
    Ok(row.as_ref().map(map_row))
}

async fn save(pool: &PgPool, session: &Session) -> Result<()> {
    let query = r"
        INSERT INTO sessions (identity_id, source_address, fingerprint, expires_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (identity_id) DO UPDATE SET
            source_address = EXCLUDED.source_address,
            fingerprint    = EXCLUDED.fingerprint,
            expires_at     = EXCLUDED.expires_at
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session.identity_id)
        .bind(&session.source_address)
        .bind(&session.fingerprint)
        .bind(session.expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to save session")?;
    Ok(())
}

async fn delete(pool: &PgPool, id: Uuid) -> Result<()> {
    // Idempotent; deleting an absent row is fine.
    let query = "DELETE FROM sessions WHERE identity_id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}

async fn delete_expired(pool: &PgPool, now: i64) -> Result<()> {
    let query = "DELETE FROM sessions WHERE expires_at <= $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(now)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to sweep expired sessions")?;
    Ok(())
}

#[async_trait]
impl SessionStore for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        find_by_id(self.pool(), id).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        save(self.pool(), session).await
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        delete(self.pool(), id).await
    }

    async fn delete_expired(&self, now: i64) -> Result<()> {
        delete_expired(self.pool(), now).await
    }
}
