//! Typed authority configuration.
//!
//! Resolved once at startup and shared behind an `Arc`; hot reload builds a
//! fresh value and swaps the `Arc`, never mutating fields under concurrent
//! readers. Every knob has a safe default so the authority operates
//! out-of-the-box.

const DEFAULT_MIN_PASSWORD_LENGTH: usize = 8;
const DEFAULT_LOGIN_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_SESSION_TIMEOUT_MINUTES: u64 = 30;
const DEFAULT_MAX_FINGERPRINT_CHANGES_7D: i64 = 1;
const DEFAULT_MAX_ACCOUNTS_PER_ADDRESS: i64 = 3;
const DEFAULT_BRUTE_FORCE_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BRUTE_FORCE_BAN_MINUTES: u64 = 10;
const DEFAULT_CLEANUP_INTERVAL_MINUTES: u64 = 10;
const DEFAULT_DIRECTORY_URL: &str = "https://api.mojang.com/users/profiles/minecraft";
const DEFAULT_DIRECTORY_TIMEOUT_SECONDS: u64 = 5;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    min_password_length: usize,
    login_timeout_seconds: u64,
    session_timeout_minutes: u64,
    rolling_session: bool,
    invalidate_on_ip_change: bool,
    invalidate_on_fingerprint_change: bool,
    fingerprint_enabled: bool,
    strict_fingerprint_for_premium: bool,
    max_fingerprint_changes_7d: i64,
    premium_enabled: bool,
    premium_auto_login: bool,
    kick_cracked_on_premium_name: bool,
    directory_url: String,
    directory_timeout_seconds: u64,
    max_accounts_per_address: i64,
    brute_force_max_attempts: u32,
    brute_force_ban_minutes: u64,
    cache_sessions: bool,
    cleanup_interval_minutes: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_password_length: DEFAULT_MIN_PASSWORD_LENGTH,
            login_timeout_seconds: DEFAULT_LOGIN_TIMEOUT_SECONDS,
            session_timeout_minutes: DEFAULT_SESSION_TIMEOUT_MINUTES,
            rolling_session: true,
            invalidate_on_ip_change: true,
            invalidate_on_fingerprint_change: true,
            fingerprint_enabled: true,
            strict_fingerprint_for_premium: true,
            max_fingerprint_changes_7d: DEFAULT_MAX_FINGERPRINT_CHANGES_7D,
            premium_enabled: true,
            premium_auto_login: true,
            kick_cracked_on_premium_name: true,
            directory_url: DEFAULT_DIRECTORY_URL.to_string(),
            directory_timeout_seconds: DEFAULT_DIRECTORY_TIMEOUT_SECONDS,
            max_accounts_per_address: DEFAULT_MAX_ACCOUNTS_PER_ADDRESS,
            brute_force_max_attempts: DEFAULT_BRUTE_FORCE_MAX_ATTEMPTS,
            brute_force_ban_minutes: DEFAULT_BRUTE_FORCE_BAN_MINUTES,
            cache_sessions: true,
            cleanup_interval_minutes: DEFAULT_CLEANUP_INTERVAL_MINUTES,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_min_password_length(mut self, length: usize) -> Self {
        self.min_password_length = length;
        self
    }

    #[must_use]
    pub fn with_login_timeout_seconds(mut self, seconds: u64) -> Self {
        self.login_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_timeout_minutes(mut self, minutes: u64) -> Self {
        self.session_timeout_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_rolling_session(mut self, enabled: bool) -> Self {
        self.rolling_session = enabled;
        self
    }

    #[must_use]
    pub fn with_invalidate_on_ip_change(mut self, enabled: bool) -> Self {
        self.invalidate_on_ip_change = enabled;
        self
    }

    #[must_use]
    pub fn with_invalidate_on_fingerprint_change(mut self, enabled: bool) -> Self {
        self.invalidate_on_fingerprint_change = enabled;
        self
    }

    #[must_use]
    pub fn with_fingerprint_enabled(mut self, enabled: bool) -> Self {
        self.fingerprint_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_strict_fingerprint_for_premium(mut self, enabled: bool) -> Self {
        self.strict_fingerprint_for_premium = enabled;
        self
    }

    #[must_use]
    pub fn with_max_fingerprint_changes_7d(mut self, max: i64) -> Self {
        self.max_fingerprint_changes_7d = max;
        self
    }

    #[must_use]
    pub fn with_premium_enabled(mut self, enabled: bool) -> Self {
        self.premium_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_premium_auto_login(mut self, enabled: bool) -> Self {
        self.premium_auto_login = enabled;
        self
    }

    #[must_use]
    pub fn with_kick_cracked_on_premium_name(mut self, enabled: bool) -> Self {
        self.kick_cracked_on_premium_name = enabled;
        self
    }

    #[must_use]
    pub fn with_directory_url(mut self, url: String) -> Self {
        self.directory_url = url;
        self
    }

    #[must_use]
    pub fn with_directory_timeout_seconds(mut self, seconds: u64) -> Self {
        self.directory_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_accounts_per_address(mut self, max: i64) -> Self {
        self.max_accounts_per_address = max;
        self
    }

    #[must_use]
    pub fn with_brute_force_max_attempts(mut self, max: u32) -> Self {
        self.brute_force_max_attempts = max;
        self
    }

    #[must_use]
    pub fn with_brute_force_ban_minutes(mut self, minutes: u64) -> Self {
        self.brute_force_ban_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_cache_sessions(mut self, enabled: bool) -> Self {
        self.cache_sessions = enabled;
        self
    }

    #[must_use]
    pub fn with_cleanup_interval_minutes(mut self, minutes: u64) -> Self {
        self.cleanup_interval_minutes = minutes;
        self
    }

    #[must_use]
    pub fn min_password_length(&self) -> usize {
        self.min_password_length
    }

    #[must_use]
    pub fn login_timeout_seconds(&self) -> u64 {
        self.login_timeout_seconds
    }

    #[must_use]
    pub fn session_timeout_minutes(&self) -> u64 {
        self.session_timeout_minutes
    }

    #[must_use]
    pub fn rolling_session(&self) -> bool {
        self.rolling_session
    }

    #[must_use]
    pub fn invalidate_on_ip_change(&self) -> bool {
        self.invalidate_on_ip_change
    }

    #[must_use]
    pub fn invalidate_on_fingerprint_change(&self) -> bool {
        self.invalidate_on_fingerprint_change
    }

    #[must_use]
    pub fn fingerprint_enabled(&self) -> bool {
        self.fingerprint_enabled
    }

    #[must_use]
    pub fn strict_fingerprint_for_premium(&self) -> bool {
        self.strict_fingerprint_for_premium
    }

    #[must_use]
    pub fn max_fingerprint_changes_7d(&self) -> i64 {
        self.max_fingerprint_changes_7d
    }

    #[must_use]
    pub fn premium_enabled(&self) -> bool {
        self.premium_enabled
    }

    #[must_use]
    pub fn premium_auto_login(&self) -> bool {
        self.premium_auto_login
    }

    #[must_use]
    pub fn kick_cracked_on_premium_name(&self) -> bool {
        self.kick_cracked_on_premium_name
    }

    #[must_use]
    pub fn directory_url(&self) -> &str {
        &self.directory_url
    }

    #[must_use]
    pub fn directory_timeout_seconds(&self) -> u64 {
        self.directory_timeout_seconds
    }

    #[must_use]
    pub fn max_accounts_per_address(&self) -> i64 {
        self.max_accounts_per_address
    }

    #[must_use]
    pub fn brute_force_max_attempts(&self) -> u32 {
        self.brute_force_max_attempts
    }

    #[must_use]
    pub fn brute_force_ban_minutes(&self) -> u64 {
        self.brute_force_ban_minutes
    }

    #[must_use]
    pub fn cache_sessions(&self) -> bool {
        self.cache_sessions
    }

    #[must_use]
    pub fn cleanup_interval_minutes(&self) -> u64 {
        self.cleanup_interval_minutes
    }
}
