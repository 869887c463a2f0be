//! The authentication orchestrator.
//!
//! Composes the account store, session authority, validator, throttle
//! guard, fingerprint service, and external directory into the join /
//! login / register / logout / change-password flows. Every user-visible
//! consequence is delivered through the [`EventSink`]; every method returns
//! `Err` only for transient storage failures, and a failed step never
//! advances the state machine. In particular, a failed session persist
//! never marks an identity logged in.
//!
//! Flows are driven by the host: one join XOR login XOR register XOR
//! logout call is in flight per identity at a time (the host allows one
//! connection per identity), so per-identity ordering comes from the state
//! machine rather than locks. The one exception, duplicate concurrent
//! register submissions, is serialized explicitly through the pending
//! registration set.

mod timeout;

use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, RwLock};
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::account::{Account, PremiumState};
use crate::config::AuthConfig;
use crate::events::{AuthMethod, AuthMode, DenyReason, EventSink, RejectReason};
use crate::fingerprint::{ClientSignals, FingerprintPolicy, FingerprintService};
use crate::password::{self, PasswordPolicy};
use crate::premium::IdentityDirectory;
use crate::session::validator::{SessionValidator, Verdict};
use crate::session::{self, SessionAuthority};
use crate::store::{AccountStore, FingerprintLog, SessionStore, ThrottleStore};
use crate::throttle::ThrottleGuard;
use crate::time;
use timeout::LoginTimeouts;

/// How long a just-verified premium player has to reconnect through
/// platform authentication.
const RECONNECT_DELAY_SECONDS: u64 = 3;

/// Connection context snapshotted by the host at the moment of the
/// triggering event. Client signals are only reliably readable then, so
/// they are captured into this struct before any store lookup is issued.
#[derive(Clone, Debug)]
pub struct ConnectContext {
    pub identity_id: Uuid,
    pub display_name: String,
    pub source_address: String,
    pub signals: ClientSignals,
}

pub struct AuthOrchestrator {
    config: Arc<AuthConfig>,
    accounts: Arc<dyn AccountStore>,
    authority: Arc<SessionAuthority>,
    validator: SessionValidator,
    fingerprints: Arc<FingerprintService>,
    throttle: Arc<ThrottleGuard>,
    directory: Arc<dyn IdentityDirectory>,
    sink: Arc<dyn EventSink>,
    password_policy: PasswordPolicy,
    timeouts: Arc<LoginTimeouts>,
    connected: Arc<RwLock<HashSet<Uuid>>>,
    /// Guards against concurrent duplicate registrations per identity.
    pending_registration: Mutex<HashSet<Uuid>>,
}

impl AuthOrchestrator {
    pub fn new(
        config: Arc<AuthConfig>,
        accounts: Arc<dyn AccountStore>,
        sessions: Arc<dyn SessionStore>,
        throttle_store: Arc<dyn ThrottleStore>,
        fingerprint_log: Arc<dyn FingerprintLog>,
        directory: Arc<dyn IdentityDirectory>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let authority = Arc::new(SessionAuthority::new(sessions, Arc::clone(&config)));
        let fingerprints = Arc::new(FingerprintService::new(fingerprint_log, Arc::clone(&config)));
        let fingerprint_policy =
            FingerprintPolicy::new(Arc::clone(&config), Arc::clone(&fingerprints));
        let validator = SessionValidator::new(Arc::clone(&config), fingerprint_policy);
        let throttle = Arc::new(ThrottleGuard::new(throttle_store, Arc::clone(&config)));
        let password_policy = PasswordPolicy::new(Arc::clone(&config));
        Self {
            config,
            accounts,
            authority,
            validator,
            fingerprints,
            throttle,
            directory,
            sink,
            password_policy,
            timeouts: Arc::new(LoginTimeouts::new()),
            connected: Arc::new(RwLock::new(HashSet::new())),
            pending_registration: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn authority(&self) -> &Arc<SessionAuthority> {
        &self.authority
    }

    #[must_use]
    pub fn throttle(&self) -> &Arc<ThrottleGuard> {
        &self.throttle
    }

    #[must_use]
    pub fn fingerprints(&self) -> &Arc<FingerprintService> {
        &self.fingerprints
    }

    #[must_use]
    pub fn config(&self) -> &Arc<AuthConfig> {
        &self.config
    }

    /// Spawn the periodic expired-session sweep for this orchestrator's
    /// authority.
    pub fn spawn_session_cleanup(&self) -> tokio::task::JoinHandle<()> {
        session::spawn_cleanup(
            Arc::clone(&self.authority),
            Duration::from_secs(self.config.cleanup_interval_minutes() * 60),
        )
    }

    /// A new connection for `ctx.identity_id`.
    ///
    /// Decides between silent resume, a login prompt, a register prompt,
    /// premium auto-login, and terminal rejection, per the stored account
    /// and session state.
    pub async fn handle_join(&self, ctx: &ConnectContext) -> Result<()> {
        let id = ctx.identity_id;
        self.connected.write().expect("connected lock").insert(id);
        // Snapshot the fingerprint before the first store call; the signals
        // in ctx were captured at join time and this keeps the cache warm
        // for the credential flows.
        let fingerprint = self.fingerprints.build(id, &ctx.signals);

        if self.authority.is_logged_in(id) {
            // Re-entrant join for an authenticated identity: nothing to do,
            // and no second timeout may be started.
            return Ok(());
        }

        let Some(account) = self.accounts.find_by_id(id).await? else {
            // No account for this identity. A premium-locked account owning
            // the same display name means an impersonation attempt.
            if self.config.kick_cracked_on_premium_name() {
                let named = self.accounts.find_by_display_name(&ctx.display_name).await?;
                if named.is_some_and(|named| named.is_premium_locked()) {
                    self.sink.rejected(id, RejectReason::PremiumNameConflict);
                    return Ok(());
                }
            }
            self.sink.must_authenticate(id, AuthMode::Register);
            self.start_timeout(id);
            return Ok(());
        };

        if account.is_premium_locked()
            && self.config.premium_enabled()
            && self.config.premium_auto_login()
        {
            return self.premium_auto_login(ctx, fingerprint.hash()).await;
        }

        let session = self.authority.get_session(id).await?;
        let verdict = self
            .validator
            .validate(
                session.as_ref(),
                &account,
                &ctx.source_address,
                fingerprint.hash(),
                time::now_millis(),
            )
            .await?;

        match verdict {
            Verdict::Valid => {
                // A tolerated drift still consumes budget: the trailing
                // window must count every device change, including the ones
                // the policy let through.
                if self.config.fingerprint_enabled() {
                    if let Some(session) = &session {
                        if session.fingerprint.is_some()
                            && session.fingerprint.as_deref() != Some(fingerprint.hash())
                        {
                            match self.fingerprints.record_change(id).await {
                                Ok(()) => self.sink.drift_recorded(id),
                                Err(err) => {
                                    warn!(identity = %id, "failed to record fingerprint change: {err:#}");
                                }
                            }
                        }
                    }
                }
                self.authority.set_logged_in(id, true);
                if self.config.rolling_session() {
                    // Best effort: the resume already stands; a failed
                    // refresh only shortens the stored session.
                    if let Err(err) = self.authority.update_expiry(id).await {
                        warn!(identity = %id, "failed to refresh session expiry: {err:#}");
                    }
                }
                debug!(identity = %id, "session resumed");
                self.sink.authenticated(id, AuthMethod::Resume);
            }
            Verdict::FingerprintMismatch => {
                match self.fingerprints.record_change(id).await {
                    Ok(()) => self.sink.drift_recorded(id),
                    Err(err) => {
                        warn!(identity = %id, "failed to record fingerprint change: {err:#}");
                    }
                }
                self.sink.must_authenticate(id, AuthMode::Login);
                self.start_timeout(id);
            }
            Verdict::Expired | Verdict::IpMismatch | Verdict::NoSession => {
                self.sink.must_authenticate(id, AuthMode::Login);
                self.start_timeout(id);
            }
        }
        Ok(())
    }

    async fn premium_auto_login(&self, ctx: &ConnectContext, fingerprint: &str) -> Result<()> {
        let id = ctx.identity_id;
        match self.directory.lookup(&ctx.display_name).await {
            Ok(Some(identity)) => {
                debug!(identity = %id, external_id = %identity.external_id, "premium identity verified");
                if let Err(err) = self
                    .authority
                    .create_session(id, &ctx.source_address, Some(fingerprint.to_string()))
                    .await
                {
                    // The verification stands but nothing durable exists;
                    // fall back to credentials rather than ghost-login.
                    self.sink.must_authenticate(id, AuthMode::Login);
                    self.start_timeout(id);
                    return Err(err);
                }
                self.sink.authenticated(id, AuthMethod::Premium);
                return Ok(());
            }
            Ok(None) => {
                debug!(identity = %id, "premium identity not found, falling back to login");
            }
            Err(err) => {
                warn!(identity = %id, "premium verification unavailable: {err:#}");
            }
        }
        self.sink.must_authenticate(id, AuthMode::Login);
        self.start_timeout(id);
        Ok(())
    }

    /// A login submission from an identity awaiting credentials.
    pub async fn login(&self, ctx: &ConnectContext, password: &str) -> Result<()> {
        let id = ctx.identity_id;
        if self.authority.is_logged_in(id) {
            self.sink.denied(id, DenyReason::AlreadyAuthenticated);
            return Ok(());
        }
        let fingerprint = self.fingerprints.build(id, &ctx.signals);

        // The guard runs before password verification: a banned address
        // gets no oracle, not even for the right password.
        if self.throttle.is_banned(&ctx.source_address).await? {
            let remaining_seconds = self.throttle.ban_remaining_seconds(&ctx.source_address).await?;
            self.sink.rejected(id, RejectReason::Banned { remaining_seconds });
            return Ok(());
        }

        let Some(account) = self.accounts.find_by_id(id).await? else {
            self.sink.denied(id, DenyReason::RegistrationRequired);
            return Ok(());
        };

        if !password::verify_password(password, account.password_hash.as_deref()) {
            let count = self.throttle.record_failure(&ctx.source_address, id).await?;
            let remaining_attempts = self.throttle.remaining_attempts(count);
            if remaining_attempts == 0 {
                let ban_seconds = self.config.brute_force_ban_minutes() as i64 * 60;
                self.sink.rejected(id, RejectReason::TooManyAttempts { ban_seconds });
            } else {
                self.sink.denied(id, DenyReason::WrongPassword { remaining_attempts });
            }
            return Ok(());
        }

        self.throttle.clear_attempts(&ctx.source_address, id);
        self.authority
            .create_session(id, &ctx.source_address, Some(fingerprint.hash().to_string()))
            .await?;
        self.timeouts.cancel(id);
        info!(identity = %id, "password login succeeded");
        self.sink.authenticated(id, AuthMethod::Password);
        Ok(())
    }

    /// A registration submission from an identity with no account.
    pub async fn register(&self, ctx: &ConnectContext, password: &str, confirm: &str) -> Result<()> {
        let id = ctx.identity_id;
        if self.authority.is_logged_in(id) {
            self.sink.denied(id, DenyReason::AlreadyAuthenticated);
            return Ok(());
        }
        if !self
            .pending_registration
            .lock()
            .expect("pending registration lock")
            .insert(id)
        {
            self.sink.denied(id, DenyReason::RegistrationInProgress);
            return Ok(());
        }
        let result = self.register_pending(ctx, password, confirm).await;
        self.pending_registration
            .lock()
            .expect("pending registration lock")
            .remove(&id);
        result
    }

    async fn register_pending(
        &self,
        ctx: &ConnectContext,
        password: &str,
        confirm: &str,
    ) -> Result<()> {
        let id = ctx.identity_id;
        if !self.password_policy.meets_min_length(password) {
            self.sink.denied(
                id,
                DenyReason::PasswordTooShort {
                    min: self.password_policy.min_length(),
                },
            );
            return Ok(());
        }
        if password != confirm {
            self.sink.denied(id, DenyReason::PasswordMismatch);
            return Ok(());
        }

        let fingerprint = self.fingerprints.build(id, &ctx.signals);

        let existing_here = self
            .accounts
            .count_identities_by_address(&ctx.source_address)
            .await?;
        if existing_here >= self.config.max_accounts_per_address() {
            self.sink.denied(id, DenyReason::AltLimitExceeded);
            return Ok(());
        }

        if self.accounts.find_by_id(id).await?.is_some() {
            self.sink.denied(id, DenyReason::AccountExists);
            return Ok(());
        }

        let account = Account {
            id,
            display_name: ctx.display_name.clone(),
            password_hash: Some(password::hash_password(password)?),
            premium_state: PremiumState::Cracked,
            created_at: time::now_millis(),
        };
        self.accounts.save(&account).await?;
        self.authority
            .create_session(id, &ctx.source_address, Some(fingerprint.hash().to_string()))
            .await?;
        self.timeouts.cancel(id);
        info!(identity = %id, name = %account.display_name, "account registered");
        self.sink.authenticated(id, AuthMethod::Registration);
        Ok(())
    }

    /// Explicit logout: the identity stays connected but must
    /// re-authenticate.
    pub async fn logout(&self, id: Uuid) -> Result<()> {
        if !self.authority.is_logged_in(id) {
            self.sink.denied(id, DenyReason::NotAuthenticated);
            return Ok(());
        }
        self.authority.invalidate(id).await?;
        self.sink.must_authenticate(id, AuthMode::Login);
        self.start_timeout(id);
        Ok(())
    }

    /// Change the local password; the session is invalidated and the
    /// identity returned to the login prompt.
    pub async fn change_password(
        &self,
        id: Uuid,
        old_password: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<()> {
        if !self.authority.is_logged_in(id) {
            self.sink.denied(id, DenyReason::NotAuthenticated);
            return Ok(());
        }
        if new_password != confirm {
            self.sink.denied(id, DenyReason::PasswordMismatch);
            return Ok(());
        }
        if !self.password_policy.meets_min_length(new_password) {
            self.sink.denied(
                id,
                DenyReason::PasswordTooShort {
                    min: self.password_policy.min_length(),
                },
            );
            return Ok(());
        }

        let Some(mut account) = self.accounts.find_by_id(id).await? else {
            self.sink.denied(id, DenyReason::RegistrationRequired);
            return Ok(());
        };
        if !password::verify_password(old_password, account.password_hash.as_deref()) {
            self.sink.denied(id, DenyReason::OldPasswordIncorrect);
            return Ok(());
        }
        if password::verify_password(new_password, account.password_hash.as_deref()) {
            self.sink.denied(id, DenyReason::SamePassword);
            return Ok(());
        }

        account.password_hash = Some(password::hash_password(new_password)?);
        self.accounts.save(&account).await?;
        self.authority.invalidate(id).await?;
        info!(identity = %id, "password changed, session invalidated");
        self.sink.must_authenticate(id, AuthMode::Login);
        self.start_timeout(id);
        Ok(())
    }

    /// Verify the identity against the external directory and lock the
    /// account to it. The client must reconnect through platform auth.
    pub async fn verify_premium(&self, ctx: &ConnectContext) -> Result<()> {
        let id = ctx.identity_id;
        if !self.config.premium_enabled() {
            self.sink.denied(id, DenyReason::PremiumNotVerifiable);
            return Ok(());
        }
        if !self.authority.is_logged_in(id) {
            self.sink.denied(id, DenyReason::NotAuthenticated);
            return Ok(());
        }
        let Some(mut account) = self.accounts.find_by_id(id).await? else {
            self.sink.denied(id, DenyReason::NotAuthenticated);
            return Ok(());
        };
        if account.is_premium_locked() {
            self.sink.denied(id, DenyReason::PremiumAlreadyVerified);
            return Ok(());
        }

        match self.directory.lookup(&ctx.display_name).await {
            Ok(Some(identity)) => {
                info!(
                    identity = %id,
                    external_id = %identity.external_id,
                    "locking account to verified external identity"
                );
                account.premium_state = PremiumState::PremiumLocked;
                self.accounts.save(&account).await?;
                self.authority.invalidate(id).await?;
                self.sink.rejected(
                    id,
                    RejectReason::PremiumVerified {
                        reconnect_seconds: RECONNECT_DELAY_SECONDS,
                    },
                );
            }
            Ok(None) => self.sink.denied(id, DenyReason::PremiumNotVerifiable),
            Err(err) => {
                // "Not verifiable now": degraded directory, never fatal.
                warn!(identity = %id, "premium verification unavailable: {err:#}");
                self.sink.denied(id, DenyReason::PremiumNotVerifiable);
            }
        }
        Ok(())
    }

    /// The connection closed. Clears every piece of per-identity runtime
    /// state; the stored session (if any) survives for the next resume.
    pub fn handle_disconnect(&self, id: Uuid) {
        self.connected.write().expect("connected lock").remove(&id);
        self.timeouts.cancel(id);
        self.fingerprints.remove(id);
        self.authority.set_logged_in(id, false);
    }

    /// Administrative unban for a source address. Idempotent.
    pub async fn unban(&self, address: &str) -> Result<()> {
        self.throttle.unban(address).await
    }

    /// Administrative premium lock without external verification.
    ///
    /// Returns whether an account was locked. The stored session is
    /// invalidated so the next connection goes through platform auth.
    pub async fn force_premium(&self, display_name: &str) -> Result<bool> {
        let Some(mut account) = self.accounts.find_by_display_name(display_name).await? else {
            return Ok(false);
        };
        if account.is_premium_locked() {
            return Ok(false);
        }
        account.premium_state = PremiumState::PremiumLocked;
        self.accounts.save(&account).await?;
        self.authority.invalidate(account.id).await?;
        info!(identity = %account.id, name = %account.display_name, "account premium-locked by admin");
        Ok(true)
    }

    /// Start (or restart) the credential timeout for an identity. Any
    /// previous timer is replaced; the timer re-checks connection and
    /// authentication state when it fires.
    fn start_timeout(&self, id: Uuid) {
        let generation = self.timeouts.next_generation();
        let timeout_seconds = self.config.login_timeout_seconds();
        let authority = Arc::clone(&self.authority);
        let sink = Arc::clone(&self.sink);
        let timeouts = Arc::clone(&self.timeouts);
        let connected = Arc::clone(&self.connected);
        let handle = tokio::spawn(async move {
            sleep(Duration::from_secs(timeout_seconds)).await;
            if !timeouts.claim(id, generation) {
                return;
            }
            // Fire-time checks: the identity may have authenticated or
            // disconnected since the timer was scheduled.
            if !connected.read().expect("connected lock").contains(&id) {
                return;
            }
            if authority.is_logged_in(id) {
                return;
            }
            info!(identity = %id, timeout_seconds, "credential timeout fired");
            sink.rejected(id, RejectReason::LoginTimeout { timeout_seconds });
        });
        self.timeouts.install(id, generation, handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopSink;
    use crate::premium::StaticDirectory;
    use crate::store::memory::MemoryStore;

    fn orchestrator() -> AuthOrchestrator {
        let store = Arc::new(MemoryStore::new());
        AuthOrchestrator::new(
            Arc::new(AuthConfig::new()),
            Arc::clone(&store) as Arc<dyn AccountStore>,
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&store) as Arc<dyn ThrottleStore>,
            store as Arc<dyn FingerprintLog>,
            Arc::new(StaticDirectory::new()),
            Arc::new(NoopSink),
        )
    }

    fn ctx(id: Uuid) -> ConnectContext {
        ConnectContext {
            identity_id: id,
            display_name: "alex".to_string(),
            source_address: "10.0.0.1".to_string(),
            signals: ClientSignals {
                client_brand: "vanilla".to_string(),
                protocol_version: 767,
                platform: "linux".to_string(),
            },
        }
    }

    #[tokio::test]
    async fn logout_without_login_is_denied_not_an_error() -> Result<()> {
        let orchestrator = orchestrator();
        orchestrator.logout(Uuid::new_v4()).await?;
        Ok(())
    }

    #[tokio::test]
    async fn disconnect_clears_runtime_state() -> Result<()> {
        let orchestrator = orchestrator();
        let id = Uuid::new_v4();
        let ctx = ctx(id);
        orchestrator.handle_join(&ctx).await?;
        assert!(orchestrator.fingerprints().cached(id).is_some());

        orchestrator.handle_disconnect(id);
        assert!(orchestrator.fingerprints().cached(id).is_none());
        assert!(!orchestrator.authority().is_logged_in(id));
        Ok(())
    }

    #[tokio::test]
    async fn force_premium_unknown_name_is_noop() -> Result<()> {
        let orchestrator = orchestrator();
        assert!(!orchestrator.force_premium("nobody").await?);
        Ok(())
    }
}
