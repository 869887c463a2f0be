//! # Authgate (Authentication & Session Authority)
//!
//! `authgate` decides, for any player connecting to a game server, whether
//! they are authenticated, whether a previously stored session may be
//! silently resumed, and whether their address is currently throttled. The
//! surrounding game server owns transport, UI, and commands; it calls into
//! this crate and receives decisions back through an event sink.
//!
//! ## Login state
//!
//! The [`session::SessionAuthority`] owns the in-memory logged-in set (the
//! O(1), never-blocking check every restricted action depends on) and an
//! optional read-through session cache. An identity is marked logged in
//! only after its session has been durably persisted; a failed persist
//! leaves it logged out, so a restart can never strand a player whose
//! restrictions were already lifted.
//!
//! ## Storage
//!
//! Accounts, sessions, brute-force bans, and fingerprint drift events are
//! persisted through narrow async store traits with single-row upsert
//! semantics; no cross-table transactions. The production backend is
//! Postgres ([`store::PgStore`]); an in-memory implementation backs tests.
//!
//! ## Flows
//!
//! The [`auth::AuthOrchestrator`] runs the join / login / register /
//! logout / change-password state machine, throttling failed credential
//! attempts per source address and verifying premium identities against an
//! external directory. All outcomes flow through [`events::EventSink`].

pub mod account;
pub mod auth;
pub mod config;
pub mod events;
pub mod fingerprint;
pub mod password;
pub mod premium;
pub mod session;
pub mod store;
pub mod throttle;
pub mod time;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
