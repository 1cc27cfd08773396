//! The server's canonical in-memory state: a mutex-guarded map from opaque
//! key bytes to opaque value bytes.
//!
//! Every operation holds the mutex only for the duration of the map access
//! and never performs I/O, so lookups stay O(hash) and the store can be
//! called from transport completion paths without nesting into transport
//! locks. `get` hands back an owning copy so callers serialise after the
//! mutex is released.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

/// Concurrent mapping from key bytes to value bytes.
///
/// Values are immutable once stored and replaced wholesale on re-write;
/// concurrent puts on the same key linearise on the internal mutex.
#[derive(Debug, Default)]
pub struct Store {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `key`, overwriting unconditionally.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        debug!(key_len = key.len(), value_len = value.len(), "store put");
        entries.insert(key, value);
    }

    /// Returns an owning copy of the value under `key`, if present.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(key).cloned()
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn exists(&self, key: &[u8]) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(key)
    }

    /// Removes `key`, reporting whether it was present.
    pub fn erase(&self, key: &[u8]) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).is_some()
    }

    /// Snapshot of every stored key.
    #[must_use]
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.keys().cloned().collect()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
