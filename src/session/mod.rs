//! Session model and the in-memory login authority.

pub mod validator;

use anyhow::Result;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::store::SessionStore;
use crate::time;

/// A time-bounded proof of prior authentication, bound to an address and an
/// optional device fingerprint. At most one session exists per identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub identity_id: Uuid,
    pub source_address: String,
    pub fingerprint: Option<String>,
    /// Epoch milliseconds. A past value means the session is logically
    /// absent even if the row still exists until the next sweep.
    pub expires_at: i64,
}

impl Session {
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

/// Single source of truth for "is this identity currently authenticated".
///
/// Owns the `logged_in` set every restriction decision reads and the
/// optional read-through session cache. Both are plain concurrent maps so
/// they can be touched from the main context or worker tasks without
/// marshaling; per-identity mutations are linearized by the lock.
///
/// The one ordering rule that matters: an identity is added to `logged_in`
/// only after its session has been durably persisted at least once. A
/// failed persist must leave the identity logged out, otherwise a restart
/// would strand a player whose restrictions were already lifted.
pub struct SessionAuthority {
    store: Arc<dyn SessionStore>,
    config: Arc<AuthConfig>,
    logged_in: RwLock<HashSet<Uuid>>,
    cache: RwLock<HashMap<Uuid, Session>>,
}

impl SessionAuthority {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: Arc<AuthConfig>) -> Self {
        Self {
            store,
            config,
            logged_in: RwLock::new(HashSet::new()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Load a session from cache (when enabled) or the store.
    ///
    /// A cache hit performs no I/O. Store hits populate the cache.
    pub async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        if self.config.cache_sessions() {
            if let Some(session) = self.cache.read().expect("session cache lock").get(&id) {
                return Ok(Some(session.clone()));
            }
        }
        let session = self.store.find_by_id(id).await?;
        if let Some(session) = &session {
            if self.config.cache_sessions() {
                self.cache
                    .write()
                    .expect("session cache lock")
                    .insert(id, session.clone());
            }
        }
        Ok(session)
    }

    /// Create and persist a session, then mark the identity logged in.
    ///
    /// The cache is written before the store so a concurrent `get_session`
    /// during the write already sees the new session (bounded staleness,
    /// the persist is in flight). `logged_in` is only updated after the
    /// store write succeeds; a failure propagates and leaves the identity
    /// logged out.
    pub async fn create_session(
        &self,
        id: Uuid,
        source_address: &str,
        fingerprint: Option<String>,
    ) -> Result<()> {
        let session = Session {
            identity_id: id,
            source_address: source_address.to_string(),
            fingerprint,
            expires_at: time::plus_minutes(time::now_millis(), self.config.session_timeout_minutes()),
        };
        self.cache
            .write()
            .expect("session cache lock")
            .insert(id, session.clone());
        if let Err(err) = self.store.save(&session).await {
            // Nothing durable exists; drop the optimistic cache entry so a
            // later resume cannot ride a phantom session.
            self.cache.write().expect("session cache lock").remove(&id);
            return Err(err);
        }
        self.logged_in.write().expect("logged-in lock").insert(id);
        debug!(identity = %id, "session created");
        Ok(())
    }

    /// Log the identity out and delete its session row.
    ///
    /// The in-memory removal happens before the delete is even issued, so
    /// any concurrent `is_logged_in` check during the delete already
    /// observes "logged out". Idempotent.
    pub async fn invalidate(&self, id: Uuid) -> Result<()> {
        self.logged_in.write().expect("logged-in lock").remove(&id);
        self.cache.write().expect("session cache lock").remove(&id);
        self.store.delete(id).await
    }

    /// Extend the expiry of a cached session (rolling sessions).
    ///
    /// No-op when nothing is cached for the identity.
    pub async fn update_expiry(&self, id: Uuid) -> Result<()> {
        let refreshed = {
            let mut cache = self.cache.write().expect("session cache lock");
            cache.get_mut(&id).map(|session| {
                session.expires_at =
                    time::plus_minutes(time::now_millis(), self.config.session_timeout_minutes());
                session.clone()
            })
        };
        match refreshed {
            Some(session) => self.store.save(&session).await,
            None => Ok(()),
        }
    }

    /// O(1), synchronous, never performs I/O. Every restriction decision
    /// in the game layer goes through this.
    #[must_use]
    pub fn is_logged_in(&self, id: Uuid) -> bool {
        self.logged_in.read().expect("logged-in lock").contains(&id)
    }

    /// Directly set the logged-in flag without touching the store. Used for
    /// trusted-bypass identities and externally validated resumes.
    pub fn set_logged_in(&self, id: Uuid, value: bool) {
        let mut logged_in = self.logged_in.write().expect("logged-in lock");
        if value {
            logged_in.insert(id);
        } else {
            logged_in.remove(&id);
        }
    }

    /// Sweep expired rows from the store, then expired entries from the
    /// cache. Never touches `logged_in`: rolling sessions may have
    /// refreshed an identity whose stale row just expired, and the set is
    /// the canonical runtime truth.
    pub async fn cleanup_expired(&self) -> Result<()> {
        let now = time::now_millis();
        self.store.delete_expired(now).await?;
        self.cache
            .write()
            .expect("session cache lock")
            .retain(|_, session| !session.is_expired_at(now));
        Ok(())
    }
}

/// Spawn the periodic expired-session sweep.
///
/// Runs until aborted; failures are logged and the loop keeps going. The
/// interval is jittered so multiple instances sharing a database do not
/// sweep in lockstep.
pub fn spawn_cleanup(authority: Arc<SessionAuthority>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut rng = StdRng::from_entropy();
        loop {
            let factor = rng.gen_range(90..110);
            sleep(every * factor / 100).await;
            if let Err(err) = authority.cleanup_expired().await {
                warn!("session cleanup failed: {err:#}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::store::SessionStore as _;

    fn authority(config: AuthConfig) -> (Arc<MemoryStore>, SessionAuthority) {
        let store = Arc::new(MemoryStore::new());
        let authority = SessionAuthority::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::new(config),
        );
        (store, authority)
    }

    #[tokio::test]
    async fn create_session_marks_logged_in_after_persist() -> Result<()> {
        let (store, authority) = authority(AuthConfig::new());
        let id = Uuid::new_v4();
        assert!(!authority.is_logged_in(id));

        authority.create_session(id, "10.0.0.1", Some("fp".to_string())).await?;
        assert!(authority.is_logged_in(id));
        assert!(store.find_by_id(id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn invalidate_is_idempotent() -> Result<()> {
        let (store, authority) = authority(AuthConfig::new());
        let id = Uuid::new_v4();
        authority.create_session(id, "10.0.0.1", None).await?;

        authority.invalidate(id).await?;
        authority.invalidate(id).await?;
        assert!(!authority.is_logged_in(id));
        assert!(store.find_by_id(id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn get_session_uses_cache_after_first_hit() -> Result<()> {
        let (store, authority) = authority(AuthConfig::new());
        let id = Uuid::new_v4();
        authority.create_session(id, "10.0.0.1", None).await?;

        // Delete behind the authority's back: the cached copy still serves.
        store.delete(id).await?;
        assert!(authority.get_session(id).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn cache_disabled_always_reads_store() -> Result<()> {
        let (store, authority) = authority(AuthConfig::new().with_cache_sessions(false));
        let id = Uuid::new_v4();
        authority.create_session(id, "10.0.0.1", None).await?;

        store.delete(id).await?;
        assert!(authority.get_session(id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_expiry_without_cached_session_is_noop() -> Result<()> {
        let (store, authority) = authority(AuthConfig::new());
        let id = Uuid::new_v4();
        authority.update_expiry(id).await?;
        assert!(store.find_by_id(id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn update_expiry_extends_and_persists() -> Result<()> {
        let (store, authority) = authority(AuthConfig::new().with_session_timeout_minutes(1));
        let id = Uuid::new_v4();
        authority.create_session(id, "10.0.0.1", None).await?;
        let before = store.find_by_id(id).await?.expect("session").expires_at;

        tokio::time::sleep(Duration::from_millis(5)).await;
        authority.update_expiry(id).await?;
        let after = store.find_by_id(id).await?.expect("session").expires_at;
        assert!(after >= before);
        Ok(())
    }

    #[tokio::test]
    async fn cleanup_leaves_logged_in_untouched() -> Result<()> {
        let (store, authority) = authority(AuthConfig::new());
        let id = Uuid::new_v4();

        // Expired row in store and cache, but identity authenticated this
        // runtime (rolling refresh raced the sweep).
        let session = Session {
            identity_id: id,
            source_address: "10.0.0.1".to_string(),
            fingerprint: None,
            expires_at: time::now_millis() - 1,
        };
        store.save(&session).await?;
        authority.get_session(id).await?; // populate cache
        authority.set_logged_in(id, true);

        authority.cleanup_expired().await?;
        assert!(store.find_by_id(id).await?.is_none());
        assert!(authority.is_logged_in(id));
        Ok(())
    }
}
