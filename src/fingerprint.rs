//! Device fingerprinting and drift policy.
//!
//! A fingerprint is a SHA-256 hash over client-reported signals (brand,
//! protocol version, platform). It detects session hijacking and sharing:
//! a stored session presented from a different device hashes differently.
//! Signals must be captured at the moment of the triggering event (they
//! are only reliably readable then), so the host snapshots them into
//! [`ClientSignals`] before any store lookup is issued.

use anyhow::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::account::Account;
use crate::config::AuthConfig;
use crate::store::FingerprintLog;
use crate::time;

/// Host-side capability probe for client metadata.
///
/// Game platforms differ in what they expose about a connected client; the
/// default implementation reports nothing and [`ClientSignals::capture`]
/// fills in stable fallbacks, so fingerprinting degrades gracefully on
/// hosts without the richer API surface.
pub trait ClientProbe: Send + Sync {
    fn client_brand(&self) -> Option<String> {
        None
    }

    fn protocol_version(&self) -> Option<i32> {
        None
    }

    fn platform(&self) -> Option<String> {
        None
    }
}

/// Probe for hosts that expose no client metadata.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultProbe;

impl ClientProbe for DefaultProbe {}

/// Client-reported signals snapshotted at event time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientSignals {
    pub client_brand: String,
    pub protocol_version: i32,
    pub platform: String,
}

impl ClientSignals {
    /// Snapshot a probe, substituting fallbacks for missing capabilities.
    #[must_use]
    pub fn capture(probe: &dyn ClientProbe) -> Self {
        Self {
            client_brand: probe.client_brand().unwrap_or_else(|| "vanilla".to_string()),
            protocol_version: probe.protocol_version().unwrap_or(0),
            platform: probe.platform().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Signals plus their canonical hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    signals: ClientSignals,
    hash: String,
}

impl Fingerprint {
    #[must_use]
    pub fn from_signals(signals: &ClientSignals) -> Self {
        let canonical = format!(
            "{}|{}|{}",
            signals.client_brand, signals.protocol_version, signals.platform
        );
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self {
            signals: signals.clone(),
            hash: hex::encode(hasher.finalize()),
        }
    }

    /// Lowercase hex SHA-256 of the canonical signal string.
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }

    #[must_use]
    pub fn signals(&self) -> &ClientSignals {
        &self.signals
    }
}

/// Per-identity fingerprint cache plus the append-only drift log.
pub struct FingerprintService {
    log: Arc<dyn FingerprintLog>,
    config: Arc<AuthConfig>,
    cache: RwLock<HashMap<Uuid, Fingerprint>>,
}

impl FingerprintService {
    #[must_use]
    pub fn new(log: Arc<dyn FingerprintLog>, config: Arc<AuthConfig>) -> Self {
        Self {
            log,
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Build and cache the fingerprint for an identity.
    pub fn build(&self, id: Uuid, signals: &ClientSignals) -> Fingerprint {
        let fingerprint = Fingerprint::from_signals(signals);
        self.cache
            .write()
            .expect("fingerprint cache lock")
            .insert(id, fingerprint.clone());
        fingerprint
    }

    #[must_use]
    pub fn cached(&self, id: Uuid) -> Option<Fingerprint> {
        self.cache
            .read()
            .expect("fingerprint cache lock")
            .get(&id)
            .cloned()
    }

    /// Drop the cache entry. Called on disconnect.
    pub fn remove(&self, id: Uuid) {
        self.cache.write().expect("fingerprint cache lock").remove(&id);
    }

    /// Append a drift event for an identity.
    ///
    /// # Errors
    /// Propagates the storage failure; callers decide whether the flow
    /// continues (drift recording is advisory, not gating).
    pub async fn record_change(&self, id: Uuid) -> Result<()> {
        debug!(identity = %id, "recording fingerprint change");
        self.log.append(id, time::now_millis()).await
    }

    /// Drift events in the trailing 7-day window ending at `now`.
    ///
    /// Recounted from the log on every check; an indexed time-bucketed
    /// counter may replace this as long as the ≥-threshold semantics at
    /// the window boundary are preserved.
    pub async fn count_changes_7d(&self, id: Uuid, now: i64) -> Result<i64> {
        self.log.count_since(id, time::seven_days_before(now)).await
    }

    /// Whether the identity has used up its allowed drift budget.
    pub async fn exceeds_max_changes(&self, id: Uuid, now: i64) -> Result<bool> {
        let count = self.count_changes_7d(id, now).await?;
        Ok(count >= self.config.max_fingerprint_changes_7d())
    }
}

/// Decides whether a fingerprint mismatch forces re-authentication.
#[derive(Clone)]
pub struct FingerprintPolicy {
    config: Arc<AuthConfig>,
    service: Arc<FingerprintService>,
}

impl FingerprintPolicy {
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, service: Arc<FingerprintService>) -> Self {
        Self { config, service }
    }

    /// Whether a stored/current hash mismatch requires a fresh login.
    ///
    /// Premium-locked accounts under strict mode always re-authenticate;
    /// everyone else is allowed the configured number of drift events per
    /// trailing 7-day window before a mismatch bites.
    pub async fn requires_relogin(
        &self,
        account: &Account,
        stored: Option<&str>,
        current: &str,
        now: i64,
    ) -> Result<bool> {
        if !self.config.fingerprint_enabled() {
            return Ok(false);
        }
        let Some(stored) = stored else {
            return Ok(false);
        };
        if stored == current {
            return Ok(false);
        }
        if self.config.strict_fingerprint_for_premium() && account.is_premium_locked() {
            return Ok(true);
        }
        self.service.exceeds_max_changes(account.id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::PremiumState;
    use crate::store::memory::MemoryStore;

    fn signals(brand: &str) -> ClientSignals {
        ClientSignals {
            client_brand: brand.to_string(),
            protocol_version: 767,
            platform: "linux".to_string(),
        }
    }

    fn account(premium_state: PremiumState) -> Account {
        Account {
            id: Uuid::new_v4(),
            display_name: "alex".to_string(),
            password_hash: None,
            premium_state,
            created_at: 0,
        }
    }

    fn service() -> (Arc<FingerprintService>, Arc<AuthConfig>) {
        let config = Arc::new(AuthConfig::new().with_max_fingerprint_changes_7d(1));
        let store = Arc::new(MemoryStore::new());
        (
            Arc::new(FingerprintService::new(store, Arc::clone(&config))),
            config,
        )
    }

    #[test]
    fn capture_falls_back_for_silent_probe() {
        let captured = ClientSignals::capture(&DefaultProbe);
        assert_eq!(captured.client_brand, "vanilla");
        assert_eq!(captured.protocol_version, 0);
        assert_eq!(captured.platform, "unknown");
    }

    #[test]
    fn hash_is_stable_and_signal_sensitive() {
        let first = Fingerprint::from_signals(&signals("vanilla"));
        let second = Fingerprint::from_signals(&signals("vanilla"));
        let other = Fingerprint::from_signals(&signals("fabric"));
        assert_eq!(first.hash(), second.hash());
        assert_ne!(first.hash(), other.hash());
        assert_eq!(first.hash().len(), 64);
    }

    #[test]
    fn cache_tracks_last_build_and_clears() {
        let (service, _) = service();
        let id = Uuid::new_v4();
        assert!(service.cached(id).is_none());
        let built = service.build(id, &signals("vanilla"));
        assert_eq!(service.cached(id).map(|f| f.hash().to_string()), Some(built.hash().to_string()));
        service.remove(id);
        assert!(service.cached(id).is_none());
    }

    #[tokio::test]
    async fn mismatch_allowed_until_drift_budget_spent() -> Result<()> {
        let (service, config) = service();
        let policy = FingerprintPolicy::new(config, Arc::clone(&service));
        let account = account(PremiumState::Cracked);
        let now = time::now_millis();

        // No drift events yet: within budget, mismatch tolerated.
        assert!(!policy.requires_relogin(&account, Some("aaa"), "bbb", now).await?);

        service.record_change(account.id).await?;
        assert!(policy.requires_relogin(&account, Some("aaa"), "bbb", now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn strict_premium_bites_on_first_mismatch() -> Result<()> {
        let (service, config) = service();
        let policy = FingerprintPolicy::new(config, service);
        let account = account(PremiumState::PremiumLocked);
        let now = time::now_millis();
        assert!(policy.requires_relogin(&account, Some("aaa"), "bbb", now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn equal_or_absent_hashes_never_require_relogin() -> Result<()> {
        let (service, config) = service();
        let policy = FingerprintPolicy::new(config, service);
        let account = account(PremiumState::PremiumLocked);
        let now = time::now_millis();
        assert!(!policy.requires_relogin(&account, Some("aaa"), "aaa", now).await?);
        assert!(!policy.requires_relogin(&account, None, "aaa", now).await?);
        Ok(())
    }

    #[tokio::test]
    async fn disabled_fingerprinting_short_circuits() -> Result<()> {
        let config = Arc::new(AuthConfig::new().with_fingerprint_enabled(false));
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(FingerprintService::new(store, Arc::clone(&config)));
        let policy = FingerprintPolicy::new(config, service);
        let account = account(PremiumState::PremiumLocked);
        let now = time::now_millis();
        assert!(!policy.requires_relogin(&account, Some("aaa"), "bbb", now).await?);
        Ok(())
    }
}
