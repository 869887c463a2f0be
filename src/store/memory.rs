//! In-memory store backing tests and single-node tools.
//!
//! One [`MemoryStore`] implements all four store traits over shared maps so
//! cross-table queries (the alt-account count over sessions) see one
//! consistent world, mirroring how the tables relate in Postgres.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, FingerprintLog, SessionStore, ThrottleRecord, ThrottleStore};
use crate::account::Account;
use crate::session::Session;

#[derive(Default)]
pub struct MemoryStore {
    accounts: RwLock<HashMap<Uuid, Account>>,
    sessions: RwLock<HashMap<Uuid, Session>>,
    throttle: RwLock<HashMap<String, ThrottleRecord>>,
    changes: RwLock<Vec<(Uuid, i64)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        Ok(self.accounts.read().expect("accounts lock").get(&id).cloned())
    }

    async fn find_by_display_name(&self, name: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().expect("accounts lock");
        Ok(accounts
            .values()
            .find(|account| account.display_name.eq_ignore_ascii_case(name))
            .cloned())
    }

    async fn save(&self, account: &Account) -> Result<()> {
        self.accounts
            .write()
            .expect("accounts lock")
            .insert(account.id, account.clone());
        Ok(())
    }

    async fn count_identities_by_address(&self, address: &str) -> Result<i64> {
        let sessions = self.sessions.read().expect("sessions lock");
        Ok(sessions
            .values()
            .filter(|session| session.source_address == address)
            .count() as i64)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>> {
        Ok(self.sessions.read().expect("sessions lock").get(&id).cloned())
    }

    async fn save(&self, session: &Session) -> Result<()> {
        self.sessions
            .write()
            .expect("sessions lock")
            .insert(session.identity_id, session.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        self.sessions.write().expect("sessions lock").remove(&id);
        Ok(())
    }

    async fn delete_expired(&self, now: i64) -> Result<()> {
        self.sessions
            .write()
            .expect("sessions lock")
            .retain(|_, session| session.expires_at > now);
        Ok(())
    }
}

#[async_trait]
impl ThrottleStore for MemoryStore {
    async fn find(&self, address: &str) -> Result<Option<ThrottleRecord>> {
        Ok(self.throttle.read().expect("throttle lock").get(address).cloned())
    }

    async fn upsert_ban(&self, address: &str, failure_count: i64, banned_until: i64) -> Result<()> {
        self.throttle.write().expect("throttle lock").insert(
            address.to_string(),
            ThrottleRecord {
                source_address: address.to_string(),
                failure_count,
                banned_until,
            },
        );
        Ok(())
    }

    async fn delete(&self, address: &str) -> Result<()> {
        self.throttle.write().expect("throttle lock").remove(address);
        Ok(())
    }
}

#[async_trait]
impl FingerprintLog for MemoryStore {
    async fn append(&self, id: Uuid, changed_at: i64) -> Result<()> {
        self.changes.write().expect("changes lock").push((id, changed_at));
        Ok(())
    }

    async fn count_since(&self, id: Uuid, since: i64) -> Result<i64> {
        let changes = self.changes.read().expect("changes lock");
        Ok(changes
            .iter()
            .filter(|(identity, changed_at)| *identity == id && *changed_at > since)
            .count() as i64)
    }
}
