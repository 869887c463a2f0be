//! Password hashing and policy.
//!
//! Hashes are Argon2id in PHC string format, so parameters travel with the
//! hash and can be tightened later without invalidating stored credentials.

use anyhow::Result;
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use std::sync::Arc;

use crate::config::AuthConfig;

/// Hash a password with Argon2id and a fresh random salt.
///
/// # Errors
/// Returns an error if hashing fails (effectively only on parameter or
/// allocation problems).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("failed to hash password: {err}"))?
        .to_string();
    Ok(hash)
}

/// Verify a password against a stored PHC hash.
///
/// A missing or malformed stored hash verifies as `false`; premium-locked
/// accounts carry no hash and must never pass password login.
#[must_use]
pub fn verify_password(password: &str, stored_hash: Option<&str>) -> bool {
    let Some(stored_hash) = stored_hash else {
        return false;
    };
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Minimum-length policy for new passwords.
#[derive(Clone)]
pub struct PasswordPolicy {
    config: Arc<AuthConfig>,
}

impl PasswordPolicy {
    #[must_use]
    pub fn new(config: Arc<AuthConfig>) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn meets_min_length(&self, password: &str) -> bool {
        password.chars().count() >= self.config.min_password_length()
    }

    #[must_use]
    pub fn min_length(&self) -> usize {
        self.config.min_password_length()
    }
}
