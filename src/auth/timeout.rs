//! Per-identity credential timeout timers.
//!
//! Each identity has at most one pending timer; starting a new one replaces
//! (and aborts) the old. Timers are identified by a generation number so a
//! task that fires concurrently with its own replacement can detect it is
//! stale and do nothing: whether a timeout still applies is always decided
//! at fire time, never at schedule time.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

struct Entry {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct LoginTimeouts {
    next_generation: AtomicU64,
    tasks: Mutex<HashMap<Uuid, Entry>>,
}

impl LoginTimeouts {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a generation for a timer about to be spawned.
    pub(crate) fn next_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// Install a spawned timer, aborting any previous one for the identity.
    pub(crate) fn install(&self, id: Uuid, generation: u64, handle: JoinHandle<()>) {
        let previous = self
            .tasks
            .lock()
            .expect("timeout table lock")
            .insert(id, Entry { generation, handle });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    /// Cancel and forget the pending timer, if any.
    pub(crate) fn cancel(&self, id: Uuid) {
        let removed = self.tasks.lock().expect("timeout table lock").remove(&id);
        if let Some(removed) = removed {
            removed.handle.abort();
        }
    }

    /// Called by a firing task to claim its entry. Returns `false` when the
    /// entry was already cancelled or replaced by a newer generation; the
    /// task must then do nothing.
    pub(crate) fn claim(&self, id: Uuid, generation: u64) -> bool {
        let mut tasks = self.tasks.lock().expect("timeout table lock");
        match tasks.get(&id) {
            Some(entry) if entry.generation == generation => {
                tasks.remove(&id);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn pending(&self, id: Uuid) -> bool {
        self.tasks.lock().expect("timeout table lock").contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_replaces_previous_timer() {
        let timeouts = LoginTimeouts::new();
        let id = Uuid::new_v4();

        let first = timeouts.next_generation();
        timeouts.install(id, first, tokio::spawn(async {}));
        let second = timeouts.next_generation();
        timeouts.install(id, second, tokio::spawn(async {}));

        // The replaced generation can no longer claim its slot.
        assert!(!timeouts.claim(id, first));
        assert!(timeouts.claim(id, second));
        assert!(!timeouts.pending(id));
    }

    #[tokio::test]
    async fn cancelled_timer_cannot_claim() {
        let timeouts = LoginTimeouts::new();
        let id = Uuid::new_v4();

        let generation = timeouts.next_generation();
        timeouts.install(id, generation, tokio::spawn(async {}));
        timeouts.cancel(id);
        assert!(!timeouts.claim(id, generation));
    }

    #[tokio::test]
    async fn claim_is_single_shot() {
        let timeouts = LoginTimeouts::new();
        let id = Uuid::new_v4();
        let generation = timeouts.next_generation();
        timeouts.install(id, generation, tokio::spawn(async {}));
        assert!(timeouts.claim(id, generation));
        assert!(!timeouts.claim(id, generation));
    }
}
