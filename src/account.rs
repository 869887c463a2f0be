//! Identity account model.

use uuid::Uuid;

/// Whether an account authenticates with a local password or is bound to an
/// externally verified identity.
///
/// The transition is one-way: `Cracked → PremiumLocked`. A locked account
/// never goes back to password login.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PremiumState {
    /// Local password authentication.
    Cracked,
    /// Bound to a verified external identity; local passwords are disabled.
    PremiumLocked,
}

impl PremiumState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cracked => "CRACKED",
            Self::PremiumLocked => "PREMIUM_LOCKED",
        }
    }

    /// Parse the persisted representation. Unknown values fall back to
    /// `Cracked` so a schema widened by a newer version never locks anyone
    /// out of password login.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "PREMIUM_LOCKED" => Self::PremiumLocked,
            _ => Self::Cracked,
        }
    }
}

/// A player identity record.
///
/// `id` is the stable key; `display_name` is mutable and only unique
/// case-insensitively at a point in time. `password_hash` is absent for
/// accounts created through premium verification alone.
#[derive(Clone, Debug)]
pub struct Account {
    pub id: Uuid,
    pub display_name: String,
    pub password_hash: Option<String>,
    pub premium_state: PremiumState,
    /// Epoch milliseconds.
    pub created_at: i64,
}

impl Account {
    #[must_use]
    pub fn is_premium_locked(&self) -> bool {
        self.premium_state == PremiumState::PremiumLocked
    }

    #[must_use]
    pub fn is_cracked(&self) -> bool {
        self.premium_state == PremiumState::Cracked
    }
}
