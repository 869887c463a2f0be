//! Postgres throttle store.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;

use super::{PgStore, ThrottleRecord, ThrottleStore};

#[async_trait]
impl ThrottleStore for PgStore {
    async fn find(&self, address: &str) -> Result<Option<ThrottleRecord>> {
        let row = sqlx::query(
            "SELECT source_address, failure_count, banned_until \
             FROM throttle WHERE source_address = $1",
        )
        .bind(address)
        .fetch_optional(self.pool())
        .await
        .context("failed to look up throttle record")?;
        Ok(row.map(|row| ThrottleRecord {
            source_address: row.get("source_address"),
            failure_count: row.get("failure_count"),
            banned_until: row.get("banned_until"),
        }))
    }

    async fn upsert_ban(&self, address: &str, failure_count: i64, banned_until: i64) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO throttle (source_address, failure_count, banned_until)
            VALUES ($1, $2, $3)
            ON CONFLICT (source_address) DO UPDATE SET
                failure_count = EXCLUDED.failure_count,
                banned_until  = EXCLUDED.banned_until
            ",
        )
        .bind(address)
        .bind(failure_count)
        .bind(banned_until)
        .execute(self.pool())
        .await
        .context("failed to upsert ban")?;
        Ok(())
    }

    async fn delete(&self, address: &str) -> Result<()> {
        sqlx::query("DELETE FROM throttle WHERE source_address = $1")
            .bind(address)
            .execute(self.pool())
            .await
            .context("failed to delete throttle record")?;
        Ok(())
    }
}
