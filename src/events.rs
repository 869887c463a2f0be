//! Outbound events to the surrounding game layer.
//!
//! The authority never talks to clients directly. Every user-visible
//! consequence of an authentication decision is delivered through
//! [`EventSink`], which the host game server implements (apply/lift
//! restrictions, send chat messages, disconnect). Sink methods are called
//! from async tasks; implementations must be cheap and non-blocking, and
//! marshal onto the game's main context themselves if they touch
//! non-thread-safe state.

use uuid::Uuid;

/// Which credential flow the client must complete.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode {
    Login,
    Register,
}

/// How an identity became authenticated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMethod {
    /// Silent resume from a still-valid stored session.
    Resume,
    Password,
    Registration,
    Premium,
}

/// Terminal outcomes. The host must disconnect the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// A premium-locked account already owns this display name.
    PremiumNameConflict,
    /// The source address has an active brute-force ban.
    Banned { remaining_seconds: i64 },
    /// This failure consumed the last allowed attempt; the address is now banned.
    TooManyAttempts { ban_seconds: i64 },
    /// The credential timeout fired before authentication completed.
    LoginTimeout { timeout_seconds: u64 },
    /// The account was just premium-locked; the client must reconnect
    /// through platform authentication.
    PremiumVerified { reconnect_seconds: u64 },
}

/// Non-terminal policy refusals. The identity stays in its current state
/// and may retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    AlreadyAuthenticated,
    NotAuthenticated,
    /// A registration for this identity is already in flight.
    RegistrationInProgress,
    /// No account exists; the identity must register, not log in.
    RegistrationRequired,
    PasswordTooShort { min: usize },
    PasswordMismatch,
    WrongPassword { remaining_attempts: u32 },
    /// Old password supplied to a password change did not verify.
    OldPasswordIncorrect,
    /// The new password equals the current one.
    SamePassword,
    /// An account already exists for this identity.
    AccountExists,
    /// Too many accounts already registered from this address.
    AltLimitExceeded,
    PremiumAlreadyVerified,
    /// The external directory could not verify the name right now.
    PremiumNotVerifiable,
}

/// Host-implemented receiver for authority decisions.
pub trait EventSink: Send + Sync {
    /// The identity is authenticated; lift restrictions.
    fn authenticated(&self, id: Uuid, method: AuthMethod);

    /// The identity must submit credentials; apply restrictions.
    fn must_authenticate(&self, id: Uuid, mode: AuthMode);

    /// Terminal rejection; disconnect with a message for `reason`.
    fn rejected(&self, id: Uuid, reason: RejectReason);

    /// Policy refusal; show the reason, keep the connection.
    fn denied(&self, id: Uuid, reason: DenyReason);

    /// A fingerprint drift event was recorded. Informational.
    fn drift_recorded(&self, _id: Uuid) {}
}

/// Sink that drops every event. Useful for tools and tests that only care
/// about return values.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn authenticated(&self, _id: Uuid, _method: AuthMethod) {}
    fn must_authenticate(&self, _id: Uuid, _mode: AuthMode) {}
    fn rejected(&self, _id: Uuid, _reason: RejectReason) {}
    fn denied(&self, _id: Uuid, _reason: DenyReason) {}
}
