//! Storage backends for the persistent and custom cache tiers.
//!
//! This module defines the trait that decouples the cache store from
//! specific storage. The same contract serves two roles: the secondary
//! persistent tier (entries written with `persist`), and caller-injected
//! custom storage that replaces the primary tier entirely.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// An entry as held by a storage backend.
#[derive(Debug, Clone)]
pub struct PersistedEntry {
    /// The stored value.
    pub value: Value,

    /// When the entry expires (`None` means it never expires).
    pub expires_at: Option<DateTime<Utc>>,
}

impl PersistedEntry {
    /// Check whether the entry has expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(deadline) => Utc::now() > deadline,
        }
    }
}

/// Counts reported by a backend that supports status queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BackendStatus {
    /// Number of stored entries.
    pub entries: usize,

    /// Number of entries that carry an expiry.
    pub expiring: usize,
}

/// Trait for cache storage backends.
///
/// Implementations must be cheap to call from async code; the store invokes
/// them while holding its write lock. `cleanup`, `clear`, and `status` are
/// optional capabilities: the defaults report them as unsupported and the
/// store degrades accordingly.
///
/// Backend errors are never surfaced to resolution callers. The store logs
/// them and continues with the in-memory tier alone.
pub trait StorageBackend: Send + Sync {
    /// Load an entry.
    ///
    /// Return `Ok(None)` if the key is absent. Implementations should drop
    /// entries they can no longer decode rather than erroring.
    fn get(&self, key: &str) -> Result<Option<PersistedEntry>>;

    /// Store an entry, replacing any previous value for the key.
    ///
    /// `persist` is forwarded for custom backends that distinguish durable
    /// writes; the shipped backends treat every write the same. Writes to
    /// the secondary tier always arrive with `persist` set.
    fn set(
        &self,
        key: &str,
        value: &Value,
        expires_at: Option<DateTime<Utc>>,
        persist: bool,
    ) -> Result<()>;

    /// Delete an entry. Deleting an absent key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// Remove expired entries, returning how many were removed.
    ///
    /// Return `Ok(None)` if the backend cannot enumerate expired entries.
    fn cleanup(&self) -> Result<Option<usize>> {
        Ok(None)
    }

    /// Remove all entries, returning whether the backend supports this.
    fn clear(&self) -> Result<bool> {
        Ok(false)
    }

    /// Entry counts, if the backend can report them.
    fn status(&self) -> Option<BackendStatus> {
        None
    }
}

/// In-memory storage backend.
///
/// Useful in tests and as a reference implementation of the full backend
/// contract.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, PersistedEntry>>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Check if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<PersistedEntry>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn set(
        &self,
        key: &str,
        value: &Value,
        expires_at: Option<DateTime<Utc>>,
        _persist: bool,
    ) -> Result<()> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            PersistedEntry {
                value: value.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn cleanup(&self) -> Result<Option<usize>> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        Ok(Some(before - entries.len()))
    }

    fn clear(&self) -> Result<bool> {
        self.entries.lock().unwrap().clear();
        Ok(true)
    }

    fn status(&self) -> Option<BackendStatus> {
        let entries = self.entries.lock().unwrap();
        Some(BackendStatus {
            entries: entries.len(),
            expiring: entries.values().filter(|e| e.expires_at.is_some()).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_backend_roundtrip() {
        let backend = MemoryBackend::new();
        backend.set("k", &json!({"a": 1}), None, true).unwrap();

        let entry = backend.get("k").unwrap().unwrap();
        assert_eq!(entry.value, json!({"a": 1}));
        assert!(entry.expires_at.is_none());

        backend.delete("k").unwrap();
        assert!(backend.get("k").unwrap().is_none());
    }

    #[test]
    fn test_memory_backend_cleanup_removes_expired() {
        let backend = MemoryBackend::new();
        let past = Utc::now() - chrono::Duration::seconds(1);
        backend.set("old", &json!(1), Some(past), true).unwrap();
        backend.set("live", &json!(2), None, true).unwrap();

        assert_eq!(backend.cleanup().unwrap(), Some(1));
        assert_eq!(backend.len(), 1);
        assert!(backend.get("live").unwrap().is_some());
    }

    #[test]
    fn test_memory_backend_status() {
        let backend = MemoryBackend::new();
        let future = Utc::now() + chrono::Duration::seconds(60);
        backend.set("a", &json!(1), Some(future), true).unwrap();
        backend.set("b", &json!(2), None, true).unwrap();

        let status = backend.status().unwrap();
        assert_eq!(status.entries, 2);
        assert_eq!(status.expiring, 1);
    }
}
