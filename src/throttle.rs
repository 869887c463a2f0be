//! Brute-force throttling.
//!
//! Failed credential attempts are counted in memory per source address and
//! per identity; only bans are persisted. A restart therefore resets
//! attempt counts to zero but keeps active bans: long-term punishment
//! lives in the store, the counters exist solely to compute the
//! "remaining attempts" hint. Counter increments may race under concurrent
//! attempts from one address; a ban landing slightly above or below the
//! exact threshold under heavy races is an accepted trade for lock-free
//! counters.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::store::ThrottleStore;
use crate::time::{self, MILLIS_PER_MINUTE, MILLIS_PER_SECOND};

pub struct ThrottleGuard {
    store: Arc<dyn ThrottleStore>,
    config: Arc<AuthConfig>,
    address_attempts: RwLock<HashMap<String, u32>>,
    identity_attempts: RwLock<HashMap<Uuid, u32>>,
}

impl ThrottleGuard {
    #[must_use]
    pub fn new(store: Arc<dyn ThrottleStore>, config: Arc<AuthConfig>) -> Self {
        Self {
            store,
            config,
            address_attempts: RwLock::new(HashMap::new()),
            identity_attempts: RwLock::new(HashMap::new()),
        }
    }

    /// Whether the address currently has an active ban.
    pub async fn is_banned(&self, address: &str) -> Result<bool> {
        let record = self.store.find(address).await?;
        Ok(record.is_some_and(|record| record.banned_until > time::now_millis()))
    }

    /// Seconds until the ban lifts, or 0 when not banned.
    pub async fn ban_remaining_seconds(&self, address: &str) -> Result<i64> {
        let record = self.store.find(address).await?;
        Ok(record.map_or(0, |record| {
            let remaining = record.banned_until - time::now_millis();
            if remaining > 0 {
                remaining / MILLIS_PER_SECOND
            } else {
                0
            }
        }))
    }

    /// Record a failed attempt from `address` against `identity`.
    ///
    /// When the address counter reaches the configured maximum, the ban row
    /// is written (counter frozen at the max, `banned_until` in the future)
    /// and the in-memory address counter cleared. Returns the per-identity
    /// attempt count so the caller can compute the remaining-attempts hint.
    ///
    /// # Errors
    /// A failed ban write propagates and leaves the address counter in
    /// place, so the next failure retries the ban.
    pub async fn record_failure(&self, address: &str, identity: Uuid) -> Result<u32> {
        let address_count = {
            let mut attempts = self.address_attempts.write().expect("attempts lock");
            let count = attempts.entry(address.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let identity_count = {
            let mut attempts = self.identity_attempts.write().expect("attempts lock");
            let count = attempts.entry(identity).or_insert(0);
            *count += 1;
            *count
        };

        let max_attempts = self.config.brute_force_max_attempts();
        if address_count >= max_attempts {
            let banned_until = time::now_millis()
                + (self.config.brute_force_ban_minutes() as i64) * MILLIS_PER_MINUTE;
            self.store
                .upsert_ban(address, i64::from(max_attempts), banned_until)
                .await?;
            self.address_attempts
                .write()
                .expect("attempts lock")
                .remove(address);
            info!(address, banned_until, "address banned after repeated failures");
        }

        Ok(identity_count)
    }

    /// Remaining attempts before the identity hint hits zero. Never negative.
    #[must_use]
    pub fn remaining_attempts(&self, recorded: u32) -> u32 {
        self.config.brute_force_max_attempts().saturating_sub(recorded)
    }

    /// Reset both counters after a successful authentication.
    pub fn clear_attempts(&self, address: &str, identity: Uuid) {
        self.address_attempts
            .write()
            .expect("attempts lock")
            .remove(address);
        self.identity_attempts
            .write()
            .expect("attempts lock")
            .remove(&identity);
    }

    /// Administrative unban: drop the ban row and the address counter.
    /// Idempotent.
    pub async fn unban(&self, address: &str) -> Result<()> {
        self.store.delete(address).await?;
        self.address_attempts
            .write()
            .expect("attempts lock")
            .remove(address);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn guard(max_attempts: u32) -> (Arc<MemoryStore>, ThrottleGuard) {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(
            AuthConfig::new()
                .with_brute_force_max_attempts(max_attempts)
                .with_brute_force_ban_minutes(10),
        );
        (
            Arc::clone(&store),
            ThrottleGuard::new(store as Arc<dyn ThrottleStore>, config),
        )
    }

    #[tokio::test]
    async fn threshold_bans_and_resets_counter() -> Result<()> {
        let (store, guard) = guard(3);
        let identity = Uuid::new_v4();

        for _ in 0..2 {
            guard.record_failure("10.0.0.1", identity).await?;
            assert!(!guard.is_banned("10.0.0.1").await?);
        }
        guard.record_failure("10.0.0.1", identity).await?;
        assert!(guard.is_banned("10.0.0.1").await?);

        let record = ThrottleStore::find(&*store, "10.0.0.1").await?.expect("ban row");
        assert_eq!(record.failure_count, 3);
        assert!(record.banned_until > time::now_millis());

        // In-memory counter was reset along with the ban write.
        assert!(guard
            .address_attempts
            .read()
            .expect("attempts lock")
            .get("10.0.0.1")
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn identity_count_drives_remaining_hint() -> Result<()> {
        let (_, guard) = guard(5);
        let identity = Uuid::new_v4();

        let count = guard.record_failure("10.0.0.1", identity).await?;
        assert_eq!(guard.remaining_attempts(count), 4);

        // Hint never goes negative, even past the threshold.
        for _ in 0..9 {
            guard.record_failure("10.0.0.1", identity).await?;
        }
        let count = guard.record_failure("10.0.0.1", identity).await?;
        assert_eq!(guard.remaining_attempts(count), 0);
        Ok(())
    }

    #[tokio::test]
    async fn clear_attempts_resets_both_counters() -> Result<()> {
        let (_, guard) = guard(5);
        let identity = Uuid::new_v4();
        guard.record_failure("10.0.0.1", identity).await?;
        guard.record_failure("10.0.0.1", identity).await?;

        guard.clear_attempts("10.0.0.1", identity);
        let count = guard.record_failure("10.0.0.1", identity).await?;
        assert_eq!(count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unban_is_idempotent() -> Result<()> {
        let (store, guard) = guard(1);
        let identity = Uuid::new_v4();
        guard.record_failure("10.0.0.1", identity).await?;
        assert!(guard.is_banned("10.0.0.1").await?);

        guard.unban("10.0.0.1").await?;
        guard.unban("10.0.0.1").await?;
        assert!(!guard.is_banned("10.0.0.1").await?);
        assert!(ThrottleStore::find(&*store, "10.0.0.1").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn remaining_seconds_zero_without_ban() -> Result<()> {
        let (_, guard) = guard(5);
        assert_eq!(guard.ban_remaining_seconds("10.0.0.1").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn remaining_seconds_positive_while_banned() -> Result<()> {
        let (_, guard) = guard(1);
        guard.record_failure("10.0.0.1", Uuid::new_v4()).await?;
        let remaining = guard.ban_remaining_seconds("10.0.0.1").await?;
        assert!(remaining > 0);
        assert!(remaining <= 10 * 60);
        Ok(())
    }
}
