use super::store::WindowStore;
use super::types::WindowState;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// In-process window store.
///
/// Used when no shared store is configured. Entries are keyed by
/// `(namespace, key)`; `consume` runs under the entry's shard lock so it is atomic
/// within the process.
///
/// Expired windows are swept from `consume` at most once per window length, so
/// keys that stop arriving do not accumulate.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<(String, String), String>>,
    /// Epoch milliseconds before which no sweep runs
    next_sweep: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Create an empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored windows (for testing/monitoring)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop windows that ended before `now`, along with unreadable values.
    ///
    /// Returns the number of entries removed.
    pub fn prune_expired(&self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, value| {
            WindowState::parse(Some(value.as_str())).is_some_and(|state| !state.is_expired(now))
        });
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!("Pruned {} expired windows", removed);
        }
        removed
    }

    /// Sweep if the previous sweep is at least one window old
    fn maybe_prune(&self, expire_ms: u64, now: u64) {
        let due = self.next_sweep.load(Ordering::Acquire);
        if now < due {
            return;
        }

        // One caller wins the sweep; the others carry on
        if self
            .next_sweep
            .compare_exchange(
                due,
                now.saturating_add(expire_ms),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.prune_expired(now);
        }
    }
}

#[async_trait]
impl WindowStore for MemoryStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|entry| entry.value().clone()))
    }

    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()> {
        self.entries
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn consume(
        &self,
        namespace: &str,
        key: &str,
        count: u32,
        expire_ms: u64,
        now: u64,
    ) -> Result<WindowState> {
        let state = {
            let mut entry = self
                .entries
                .entry((namespace.to_string(), key.to_string()))
                .or_insert_with(|| {
                    debug!("Creating window for key: {}", key);
                    String::new()
                });

            let existing = WindowState::parse(Some(entry.value().as_str()));
            let state = WindowState::consume(existing, count, expire_ms, now);
            *entry.value_mut() = serde_json::to_string(&state)?;
            state
        };

        // The entry guard is released above; retain needs every shard lock
        self.maybe_prune(expire_ms, now);

        Ok(state)
    }
}
