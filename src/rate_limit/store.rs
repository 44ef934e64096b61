//! Storage capability for window state.
//!
//! Values live under a `(namespace, key)` pair with hash-map semantics and are the
//! JSON encoding of [`WindowState`].

use super::types::WindowState;
use crate::error::Result;
use async_trait::async_trait;

/// Namespaced key-value store holding serialized window state
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Fetch the raw value stored under `key` in `namespace`
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` in `namespace`
    async fn set(&self, namespace: &str, key: &str, value: String) -> Result<()>;

    /// Consume one request from the window under `key` and return the new state.
    ///
    /// The default is a plain get/advance/set round trip, which is not atomic:
    /// concurrent callers on the same key may overwrite each other and under-count.
    /// Backends with server-side scripting or per-key locking should override it.
    async fn consume(
        &self,
        namespace: &str,
        key: &str,
        count: u32,
        expire_ms: u64,
        now: u64,
    ) -> Result<WindowState> {
        let raw = self.get(namespace, key).await?;
        let state = WindowState::consume(WindowState::parse(raw.as_deref()), count, expire_ms, now);
        self.set(namespace, key, serde_json::to_string(&state)?).await?;
        Ok(state)
    }
}
