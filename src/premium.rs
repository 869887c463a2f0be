//! External premium-identity verification.
//!
//! Verification asks a third-party directory whether a display name belongs
//! to a verified (paid) platform account. The call is fallible and
//! timeout-bounded; any failure means "not verifiable now" and the caller
//! falls back to password login, never a hard error for the player.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::AuthConfig;

/// A confirmed external identity for a display name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedIdentity {
    /// Canonical identifier assigned by the external directory.
    pub external_id: String,
    /// The name as the directory spells it.
    pub name: String,
}

/// Directory of externally verified identities.
///
/// `Ok(None)` means the name is not a verified account (or the directory
/// does not support it); `Err` means the directory could not answer right
/// now. Callers treat both as "fall back to password login", but only the
/// latter is logged as a failure.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn lookup(&self, display_name: &str) -> Result<Option<VerifiedIdentity>>;
}

#[derive(Debug, Deserialize)]
struct DirectoryProfile {
    id: String,
    name: String,
}

/// HTTP directory client (`GET {base}/{display_name}`).
pub struct HttpIdentityDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityDirectory {
    /// Build a client with the configured timeout and the crate user agent.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.directory_timeout_seconds());
        let client = reqwest::Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .context("failed to build directory HTTP client")?;
        Ok(Self {
            client,
            base_url: config.directory_url().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityDirectory for HttpIdentityDirectory {
    async fn lookup(&self, display_name: &str) -> Result<Option<VerifiedIdentity>> {
        let url = format!("{}/{display_name}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("directory request failed")?;

        let status = response.status();
        // The directory answers 204/404 for names it does not know.
        if status == reqwest::StatusCode::NO_CONTENT || status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            warn!(%status, "directory returned unexpected status");
            anyhow::bail!("directory returned status {status}");
        }

        let profile: DirectoryProfile = response
            .json()
            .await
            .context("failed to parse directory response")?;
        if profile.id.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(VerifiedIdentity {
            external_id: profile.id,
            name: profile.name,
        }))
    }
}

/// Fixed-answer directory for tests and offline setups.
#[derive(Clone, Debug, Default)]
pub struct StaticDirectory {
    entries: HashMap<String, String>,
}

impl StaticDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entry(mut self, display_name: &str, external_id: &str) -> Self {
        self.entries
            .insert(display_name.to_lowercase(), external_id.to_string());
        self
    }
}

#[async_trait]
impl IdentityDirectory for StaticDirectory {
    async fn lookup(&self, display_name: &str) -> Result<Option<VerifiedIdentity>> {
        Ok(self
            .entries
            .get(&display_name.to_lowercase())
            .map(|external_id| VerifiedIdentity {
                external_id: external_id.clone(),
                name: display_name.to_string(),
            }))
    }
}

/// Convenience alias used when wiring the orchestrator.
pub type SharedDirectory = Arc<dyn IdentityDirectory>;
