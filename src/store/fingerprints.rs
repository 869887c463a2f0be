//! Postgres fingerprint drift log.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use super::{FingerprintLog, PgStore};

#[async_trait]
impl FingerprintLog for PgStore {
    async fn append(&self, id: Uuid, changed_at: i64) -> Result<()> {
        sqlx::query("INSERT INTO fingerprint_changes (identity_id, changed_at) VALUES ($1, $2)")
            .bind(id)
            .bind(changed_at)
            .execute(self.pool())
            .await
            .context("failed to record fingerprint change")?;
        Ok(())
    }

    async fn count_since(&self, id: Uuid, since: i64) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COUNT(*) FROM fingerprint_changes WHERE identity_id = $1 AND changed_at > $2",
        )
        .bind(id)
        .bind(since)
        .fetch_one(self.pool())
        .await
        .context("failed to count fingerprint changes")?;
        Ok(row.get::<i64, _>(0))
    }
}
