//! Stored-session validation.

use anyhow::Result;
use std::sync::Arc;

use crate::account::Account;
use crate::config::AuthConfig;
use crate::fingerprint::FingerprintPolicy;
use crate::session::Session;

/// Outcome of validating a stored session against the current context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Resume silently.
    Valid,
    Expired,
    /// Address changed and the IP-invalidation policy is on.
    IpMismatch,
    /// Device fingerprint changed and the drift policy demands re-login.
    FingerprintMismatch,
    /// No session row exists.
    NoSession,
}

/// Pure decision function over (session, account, current context).
///
/// First match wins, in this order: no session, expired, IP mismatch,
/// fingerprint mismatch, valid. Deterministic for fixed inputs including
/// the drift-count state; recording a new drift event is the caller's
/// responsibility, never the validator's.
#[derive(Clone)]
pub struct SessionValidator {
    config: Arc<AuthConfig>,
    fingerprint_policy: FingerprintPolicy,
}

impl SessionValidator {
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, fingerprint_policy: FingerprintPolicy) -> Self {
        Self {
            config,
            fingerprint_policy,
        }
    }

    /// Validate `session` for `account` connecting from `current_address`
    /// with `current_fingerprint`, as of `now` (epoch millis).
    ///
    /// # Errors
    /// Only the drift-count lookup can fail; everything else is pure.
    pub async fn validate(
        &self,
        session: Option<&Session>,
        account: &Account,
        current_address: &str,
        current_fingerprint: &str,
        now: i64,
    ) -> Result<Verdict> {
        let Some(session) = session else {
            return Ok(Verdict::NoSession);
        };
        if session.is_expired_at(now) {
            return Ok(Verdict::Expired);
        }

        if self.config.invalidate_on_ip_change() && session.source_address != current_address {
            return Ok(Verdict::IpMismatch);
        }

        if self.config.fingerprint_enabled()
            && self.config.invalidate_on_fingerprint_change()
            && session.fingerprint.is_some()
            && session.fingerprint.as_deref() != Some(current_fingerprint)
            && self
                .fingerprint_policy
                .requires_relogin(account, session.fingerprint.as_deref(), current_fingerprint, now)
                .await?
        {
            return Ok(Verdict::FingerprintMismatch);
        }

        Ok(Verdict::Valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::PremiumState;
    use crate::fingerprint::FingerprintService;
    use crate::store::memory::MemoryStore;
    use crate::time;
    use uuid::Uuid;

    const NOW: i64 = 1_700_000_000_000;

    fn validator_with(config: AuthConfig) -> (SessionValidator, Arc<FingerprintService>) {
        let config = Arc::new(config);
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(FingerprintService::new(store, Arc::clone(&config)));
        let policy = FingerprintPolicy::new(Arc::clone(&config), Arc::clone(&service));
        (SessionValidator::new(config, policy), service)
    }

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            display_name: "alex".to_string(),
            password_hash: Some("hash".to_string()),
            premium_state: PremiumState::Cracked,
            created_at: 0,
        }
    }

    fn session(account: &Account) -> Session {
        Session {
            identity_id: account.id,
            source_address: "10.0.0.1".to_string(),
            fingerprint: Some("fp-stored".to_string()),
            expires_at: NOW + time::MILLIS_PER_MINUTE,
        }
    }

    #[tokio::test]
    async fn missing_session_wins_over_everything() -> Result<()> {
        let (validator, _) = validator_with(AuthConfig::new());
        let verdict = validator
            .validate(None, &account(), "10.0.0.1", "fp-stored", NOW)
            .await?;
        assert_eq!(verdict, Verdict::NoSession);
        Ok(())
    }

    #[tokio::test]
    async fn expiry_checked_before_address() -> Result<()> {
        let (validator, _) = validator_with(AuthConfig::new());
        let account = account();
        let mut stored = session(&account);
        stored.expires_at = NOW; // boundary: expires_at <= now is expired
        let verdict = validator
            .validate(Some(&stored), &account, "10.9.9.9", "other", NOW)
            .await?;
        assert_eq!(verdict, Verdict::Expired);
        Ok(())
    }

    #[tokio::test]
    async fn address_change_bites_when_policy_on() -> Result<()> {
        let (validator, _) = validator_with(AuthConfig::new());
        let account = account();
        let stored = session(&account);
        let verdict = validator
            .validate(Some(&stored), &account, "10.9.9.9", "fp-stored", NOW)
            .await?;
        assert_eq!(verdict, Verdict::IpMismatch);
        Ok(())
    }

    #[tokio::test]
    async fn address_change_ignored_when_policy_off() -> Result<()> {
        let (validator, _) = validator_with(AuthConfig::new().with_invalidate_on_ip_change(false));
        let account = account();
        let stored = session(&account);
        let verdict = validator
            .validate(Some(&stored), &account, "10.9.9.9", "fp-stored", NOW)
            .await?;
        assert_eq!(verdict, Verdict::Valid);
        Ok(())
    }

    #[tokio::test]
    async fn fingerprint_mismatch_after_drift_budget_spent() -> Result<()> {
        let (validator, service) =
            validator_with(AuthConfig::new().with_max_fingerprint_changes_7d(1));
        let account = account();
        let stored = session(&account);

        let within_budget = validator
            .validate(Some(&stored), &account, "10.0.0.1", "fp-new", time::now_millis())
            .await?;
        assert_eq!(within_budget, Verdict::Valid);

        service.record_change(account.id).await?;
        let spent = validator
            .validate(Some(&stored), &account, "10.0.0.1", "fp-new", time::now_millis())
            .await?;
        assert_eq!(spent, Verdict::FingerprintMismatch);
        Ok(())
    }

    #[tokio::test]
    async fn sessions_without_fingerprint_resume_freely() -> Result<()> {
        let (validator, _) = validator_with(AuthConfig::new());
        let account = account();
        let mut stored = session(&account);
        stored.fingerprint = None;
        let verdict = validator
            .validate(Some(&stored), &account, "10.0.0.1", "anything", NOW)
            .await?;
        assert_eq!(verdict, Verdict::Valid);
        Ok(())
    }

    #[tokio::test]
    async fn validate_is_deterministic_for_fixed_state() -> Result<()> {
        let (validator, _) = validator_with(AuthConfig::new());
        let account = account();
        let stored = session(&account);
        let first = validator
            .validate(Some(&stored), &account, "10.0.0.1", "fp-stored", NOW)
            .await?;
        let second = validator
            .validate(Some(&stored), &account, "10.0.0.1", "fp-stored", NOW)
            .await?;
        assert_eq!(first, second);
        assert_eq!(first, Verdict::Valid);
        Ok(())
    }
}
