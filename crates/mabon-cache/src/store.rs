//! Tiered cache store with TTL, versioning, and LRU eviction.
//!
//! The store keeps a primary in-memory tier and an optional persistent
//! secondary tier behind a [`StorageBackend`]. A caller-installed custom
//! backend replaces both tiers and receives every operation. All reads
//! purge expired entries eagerly, and inserts evict least-recently-used
//! entries until the configured byte and entry-count bounds hold.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::backend::StorageBackend;
use crate::config::CacheConfig;
use crate::entry::CacheEntry;
use crate::tracker::AccessTracker;

/// A snapshot of the store's contents and configuration.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    /// Number of tracked entries.
    pub entries: usize,

    /// Number of tracked entries that carry an expiry.
    pub expiring_entries: usize,

    /// Estimated total size of tracked values in bytes.
    pub total_bytes: u64,

    /// Configured byte bound, if any.
    pub max_bytes: Option<u64>,

    /// Configured entry-count bound, if any.
    pub max_entries: Option<usize>,

    /// Number of entries in the persistent tier, if it can report them.
    pub persistent_entries: Option<usize>,

    /// Whether a custom backend has replaced the default tiers.
    pub custom_backend: bool,
}

struct StoreInner {
    /// Primary in-memory tier.
    entries: HashMap<String, CacheEntry>,
    /// Recency and size bookkeeping for bound enforcement.
    tracker: AccessTracker,
    /// Last reconciled version per key.
    versions: HashMap<String, u64>,
    /// Persistent secondary tier.
    secondary: Option<Arc<dyn StorageBackend>>,
    /// Custom backend replacing both tiers when installed.
    custom: Option<Arc<dyn StorageBackend>>,
    max_bytes: Option<u64>,
    max_entries: Option<usize>,
}

impl StoreInner {
    fn new(config: &CacheConfig, secondary: Option<Arc<dyn StorageBackend>>) -> Self {
        Self {
            entries: HashMap::new(),
            tracker: AccessTracker::new(),
            versions: HashMap::new(),
            secondary,
            custom: None,
            max_bytes: config.max_bytes,
            max_entries: config.max_entries,
        }
    }

    /// Remove an entry from the in-memory bookkeeping only.
    fn purge_local(&mut self, key: &str) {
        self.entries.remove(key);
        self.tracker.remove(key);
    }

    /// Remove an entry from every tier.
    fn purge_everywhere(&mut self, key: &str) {
        self.purge_local(key);
        if let Some(backend) = self.custom.as_ref().or(self.secondary.as_ref()) {
            if let Err(e) = backend.delete(key) {
                warn!(key = %key, error = %e, "Failed to delete stored entry");
            }
        }
    }

    /// Evict least-recently-used entries until `incoming` more bytes and one
    /// more entry fit within the configured bounds.
    ///
    /// Any existing entry under `key` is removed first so a replacement does
    /// not count against the bounds twice. A single entry larger than the
    /// byte bound is still admitted once everything else is gone.
    fn make_room(&mut self, key: &str, incoming: usize) {
        self.purge_local(key);

        loop {
            let within_entries = self
                .max_entries
                .map(|max| self.tracker.len() + 1 <= max)
                .unwrap_or(true);
            let within_bytes = self
                .max_bytes
                .map(|max| self.tracker.total_bytes() + incoming as u64 <= max)
                .unwrap_or(true);
            if within_entries && within_bytes {
                break;
            }

            let Some(victim) = self.tracker.lru_key().map(str::to_string) else {
                break;
            };
            debug!(key = %victim, "Evicting least recently used entry");
            self.purge_everywhere(&victim);
        }
    }

    /// Shared write path for `set` and `rewrite`.
    fn store_entry(&mut self, key: &str, value: Value, ttl: Option<Duration>, persist: bool) {
        let entry = CacheEntry::new(value, expiry_from_ttl(ttl), persist);
        let size = entry.size_bytes;
        self.make_room(key, size);

        if let Some(custom) = self.custom.clone() {
            if let Err(e) = custom.set(key, &entry.value, entry.expires_at, persist) {
                warn!(key = %key, error = %e, "Custom backend rejected entry");
                return;
            }
            self.tracker.record_size(key, size);
            self.tracker.touch(key);
            return;
        }

        if persist {
            if let Some(secondary) = &self.secondary {
                if let Err(e) = secondary.set(key, &entry.value, entry.expires_at, true) {
                    warn!(key = %key, error = %e, "Failed to persist entry");
                }
            }
        } else if let Some(secondary) = &self.secondary {
            // A previously persisted copy must not resurface after the key
            // is rewritten as memory-only.
            if let Err(e) = secondary.delete(key) {
                warn!(key = %key, error = %e, "Failed to delete stale persisted entry");
            }
        }

        self.tracker.record_size(key, size);
        self.tracker.touch(key);
        self.entries.insert(key.to_string(), entry);
    }

    /// Read the current unexpired value for a key without touching recency.
    /// Expired values found along the way are purged.
    fn live_value(&mut self, key: &str) -> Option<Value> {
        if let Some(custom) = self.custom.clone() {
            return match custom.get(key) {
                Ok(Some(entry)) if entry.is_expired() => {
                    self.purge_everywhere(key);
                    None
                }
                Ok(Some(entry)) => Some(entry.value),
                Ok(None) => None,
                Err(e) => {
                    warn!(key = %key, error = %e, "Custom backend read failed");
                    None
                }
            };
        }

        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                self.purge_everywhere(key);
                return None;
            }
            return Some(entry.value.clone());
        }

        let secondary = self.secondary.clone()?;
        match secondary.get(key) {
            Ok(Some(persisted)) if persisted.is_expired() => {
                self.purge_everywhere(key);
                None
            }
            Ok(Some(persisted)) => Some(persisted.value),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read persisted entry");
                None
            }
        }
    }
}

/// The tiered cache store.
///
/// Cheap to clone; clones share the same underlying state.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").finish_non_exhaustive()
    }
}

impl CacheStore {
    /// Create a memory-only store.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::new(&config, None))),
        }
    }

    /// Create a store with a persistent secondary tier.
    pub fn with_persistence(config: CacheConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner::new(&config, Some(backend)))),
        }
    }

    /// Store a value under a key.
    ///
    /// `ttl` of `None` means the entry never expires. With `persist` the
    /// value is also written to the secondary tier; without it any persisted
    /// copy for the key is removed. Blank keys are ignored.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>, persist: bool) {
        if !usable_key(key) {
            debug!("Ignoring cache set for blank key");
            return;
        }

        let mut inner = self.inner.write().await;
        inner.store_entry(key, value, ttl, persist);
        debug!(key = %key, ttl = ?ttl, persist, "Cached value");
    }

    /// Retrieve a value, refreshing its recency.
    ///
    /// Expired entries are purged from every tier on the way. A hit in the
    /// secondary tier promotes the entry back into memory.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if !usable_key(key) {
            return None;
        }

        let mut inner = self.inner.write().await;

        if let Some(custom) = inner.custom.clone() {
            return match custom.get(key) {
                Ok(Some(entry)) if entry.is_expired() => {
                    debug!(key = %key, "Entry expired");
                    inner.purge_everywhere(key);
                    None
                }
                Ok(Some(entry)) => {
                    inner.tracker.touch(key);
                    Some(entry.value)
                }
                Ok(None) => {
                    // The backend dropped it on its own; forget the
                    // bookkeeping as well.
                    inner.tracker.remove(key);
                    None
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Custom backend read failed");
                    None
                }
            };
        }

        if let Some(entry) = inner.entries.get(key) {
            if entry.is_expired() {
                debug!(key = %key, "Entry expired");
                inner.purge_everywhere(key);
                return None;
            }
            let value = entry.value.clone();
            inner.tracker.touch(key);
            return Some(value);
        }

        let secondary = inner.secondary.clone()?;
        match secondary.get(key) {
            Ok(Some(persisted)) if persisted.is_expired() => {
                debug!(key = %key, "Persisted entry expired");
                inner.purge_everywhere(key);
                None
            }
            Ok(Some(persisted)) => {
                debug!(key = %key, "Promoting persisted entry");
                let entry = CacheEntry::new(persisted.value.clone(), persisted.expires_at, true);
                let size = entry.size_bytes;
                inner.make_room(key, size);
                inner.tracker.record_size(key, size);
                inner.tracker.touch(key);
                inner.entries.insert(key.to_string(), entry);
                Some(persisted.value)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read persisted entry");
                None
            }
        }
    }

    /// Remove a key from every tier along with its version record.
    pub async fn delete(&self, key: &str) {
        if !usable_key(key) {
            return;
        }

        let mut inner = self.inner.write().await;
        inner.versions.remove(key);
        inner.purge_everywhere(key);
    }

    /// Reconcile the caller-supplied version for a key.
    ///
    /// Any change from the previously recorded version drops the cached
    /// value. A key without a prior record counts as changed, and `None`
    /// removes the record without touching the value.
    pub async fn reconcile_version(&self, key: &str, version: Option<u64>) {
        if !usable_key(key) {
            return;
        }

        let mut inner = self.inner.write().await;
        match version {
            None => {
                inner.versions.remove(key);
            }
            Some(version) => {
                let previous = inner.versions.insert(key.to_string(), version);
                if previous != Some(version) {
                    debug!(key = %key, version, "Version changed, dropping cached value");
                    inner.purge_everywhere(key);
                }
            }
        }
    }

    /// Re-store an existing value with a fresh TTL and persistence flag.
    ///
    /// Returns whether a live value existed to rewrite.
    pub async fn rewrite(&self, key: &str, ttl: Option<Duration>, persist: bool) -> bool {
        if !usable_key(key) {
            return false;
        }

        let mut inner = self.inner.write().await;
        let Some(value) = inner.live_value(key) else {
            return false;
        };
        inner.store_entry(key, value, ttl, persist);
        debug!(key = %key, ttl = ?ttl, persist, "Rewrote entry");
        true
    }

    /// Remove every entry and version record.
    ///
    /// The persistent tier is cleared only when `persist_too` is set. An
    /// installed custom backend is always asked to clear.
    pub async fn clear(&self, persist_too: bool) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.tracker.clear();
        inner.versions.clear();

        if let Some(custom) = inner.custom.clone() {
            match custom.clear() {
                Ok(true) => {}
                Ok(false) => debug!("Custom backend does not support clear"),
                Err(e) => warn!(error = %e, "Custom backend clear failed"),
            }
            return;
        }

        if persist_too {
            if let Some(secondary) = inner.secondary.clone() {
                match secondary.clear() {
                    Ok(true) => {}
                    Ok(false) => debug!("Persistent tier does not support clear"),
                    Err(e) => warn!(error = %e, "Failed to clear persistent tier"),
                }
            }
        }
    }

    /// Remove expired entries from every tier, returning how many were
    /// removed.
    pub async fn cleanup(&self) -> usize {
        let mut inner = self.inner.write().await;

        if let Some(custom) = inner.custom.clone() {
            return match custom.cleanup() {
                Ok(Some(removed)) => removed,
                Ok(None) => {
                    debug!("Custom backend does not support cleanup");
                    0
                }
                Err(e) => {
                    warn!(error = %e, "Custom backend cleanup failed");
                    0
                }
            };
        }

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        let mut removed = expired.len();
        for key in &expired {
            inner.purge_everywhere(key);
        }

        if let Some(secondary) = inner.secondary.clone() {
            match secondary.cleanup() {
                Ok(Some(n)) => removed += n,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Persistent tier cleanup failed"),
            }
        }

        if removed > 0 {
            debug!(removed, "Removed expired cache entries");
        }
        removed
    }

    /// Replace the size bounds.
    ///
    /// New bounds apply from the next insert; nothing is evicted
    /// retroactively.
    pub async fn set_limits(&self, max_bytes: Option<u64>, max_entries: Option<usize>) {
        let mut inner = self.inner.write().await;
        inner.max_bytes = max_bytes;
        inner.max_entries = max_entries;
        debug!(?max_bytes, ?max_entries, "Updated cache size bounds");
    }

    /// Install a custom storage backend replacing both default tiers, or
    /// restore the default tiers with `None`.
    ///
    /// Entries are never migrated: in-memory state and version records are
    /// dropped on every swap, and the persistent tier keeps its contents
    /// but is not consulted while a custom backend is installed.
    pub async fn set_custom_backend(&self, backend: Option<Arc<dyn StorageBackend>>) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.tracker.clear();
        inner.versions.clear();
        match &backend {
            Some(_) => debug!("Installed custom storage backend"),
            None => debug!("Restored default storage tiers"),
        }
        inner.custom = backend;
    }

    /// Check whether a key holds an unexpired value, without refreshing
    /// recency or purging.
    pub async fn contains(&self, key: &str) -> bool {
        if !usable_key(key) {
            return false;
        }

        let inner = self.inner.read().await;

        if let Some(custom) = &inner.custom {
            return matches!(custom.get(key), Ok(Some(entry)) if !entry.is_expired());
        }
        if let Some(entry) = inner.entries.get(key) {
            return !entry.is_expired();
        }
        if let Some(secondary) = &inner.secondary {
            return matches!(secondary.get(key), Ok(Some(entry)) if !entry.is_expired());
        }
        false
    }

    /// Number of tracked entries.
    pub async fn len(&self) -> usize {
        self.inner.read().await.tracker.len()
    }

    /// Check whether the store tracks no entries.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.tracker.is_empty()
    }

    /// Snapshot of contents and configuration.
    pub async fn status(&self) -> StoreStatus {
        let inner = self.inner.read().await;

        if let Some(custom) = &inner.custom {
            let backend = custom.status();
            return StoreStatus {
                entries: backend
                    .as_ref()
                    .map(|s| s.entries)
                    .unwrap_or_else(|| inner.tracker.len()),
                expiring_entries: backend.as_ref().map(|s| s.expiring).unwrap_or(0),
                total_bytes: inner.tracker.total_bytes(),
                max_bytes: inner.max_bytes,
                max_entries: inner.max_entries,
                persistent_entries: None,
                custom_backend: true,
            };
        }

        StoreStatus {
            entries: inner.entries.len(),
            expiring_entries: inner
                .entries
                .values()
                .filter(|entry| entry.expires_at.is_some())
                .count(),
            total_bytes: inner.tracker.total_bytes(),
            max_bytes: inner.max_bytes,
            max_entries: inner.max_entries,
            persistent_entries: inner
                .secondary
                .as_ref()
                .and_then(|backend| backend.status())
                .map(|s| s.entries),
            custom_backend: false,
        }
    }
}

fn usable_key(key: &str) -> bool {
    !key.trim().is_empty()
}

fn expiry_from_ttl(ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok())
        .map(|ttl| Utc::now() + ttl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = CacheStore::new(CacheConfig::default());
        store.set("k", json!({"n": 1}), None, false).await;

        assert_eq!(store.get("k").await, Some(json!({"n": 1})));
        assert!(store.contains("k").await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_on_never_set_key() {
        let store = CacheStore::new(CacheConfig::default());
        assert_eq!(store.get("missing").await, None);
        assert!(!store.contains("missing").await);
    }

    #[tokio::test]
    async fn test_expired_entry_is_purged_on_read() {
        let store = CacheStore::new(CacheConfig::default());
        store
            .set("k", json!(1), Some(Duration::from_millis(30)), false)
            .await;

        // Fresh within the TTL.
        assert_eq!(store.get("k").await, Some(json!(1)));

        sleep(Duration::from_millis(60)).await;

        assert_eq!(store.get("k").await, None);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_blank_keys_are_ignored() {
        let store = CacheStore::new(CacheConfig::default());
        store.set("", json!(1), None, false).await;
        store.set("   ", json!(2), None, false).await;

        assert!(store.is_empty().await);
        assert_eq!(store.get("").await, None);
        assert!(!store.contains("   ").await);
        assert!(!store.rewrite("", None, false).await);
    }

    #[tokio::test]
    async fn test_delete_removes_entry() {
        let store = CacheStore::new(CacheConfig::default());
        store.set("k", json!(1), None, false).await;
        store.delete("k").await;

        assert_eq!(store.get("k").await, None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_version_change_drops_entry() {
        let store = CacheStore::new(CacheConfig::default());

        // First reconciliation records the version; the key has no prior
        // record so any cached value would be dropped.
        store.reconcile_version("k", Some(1)).await;
        store.set("k", json!("v1"), None, false).await;

        // Same version keeps the value.
        store.reconcile_version("k", Some(1)).await;
        assert_eq!(store.get("k").await, Some(json!("v1")));

        // A bump drops it.
        store.reconcile_version("k", Some(2)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_unreconciled_key_counts_as_changed() {
        let store = CacheStore::new(CacheConfig::default());
        store.set("k", json!("v"), None, false).await;

        store.reconcile_version("k", Some(7)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_version_record_cleared_with_none() {
        let store = CacheStore::new(CacheConfig::default());
        store.reconcile_version("k", Some(1)).await;
        store.set("k", json!("v"), None, false).await;

        // Clearing the record leaves the value alone.
        store.reconcile_version("k", None).await;
        assert_eq!(store.get("k").await, Some(json!("v")));

        // But the next versioned reconciliation starts from scratch.
        store.reconcile_version("k", Some(1)).await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_rewrite_extends_ttl() {
        let store = CacheStore::new(CacheConfig::default());
        store
            .set("k", json!("v"), Some(Duration::from_millis(30)), false)
            .await;

        assert!(store.rewrite("k", Some(Duration::from_secs(60)), false).await);

        // Past the original deadline the value is still there.
        sleep(Duration::from_millis(60)).await;
        assert_eq!(store.get("k").await, Some(json!("v")));
    }

    #[tokio::test]
    async fn test_rewrite_missing_key_returns_false() {
        let store = CacheStore::new(CacheConfig::default());
        assert!(!store.rewrite("missing", None, false).await);
    }

    #[tokio::test]
    async fn test_entry_bound_evicts_least_recently_used() {
        let store = CacheStore::new(CacheConfig::new().with_max_entries(2));
        store.set("a", json!(1), None, false).await;
        store.set("b", json!(2), None, false).await;

        // Reading "a" makes "b" the eviction candidate.
        store.get("a").await;
        store.set("c", json!(3), None, false).await;

        assert_eq!(store.get("b").await, None);
        assert_eq!(store.get("a").await, Some(json!(1)));
        assert_eq!(store.get("c").await, Some(json!(3)));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_byte_bound_evicts_until_fit() {
        // "xxxxxxxxxx" serializes to 12 bytes with quotes.
        let store = CacheStore::new(CacheConfig::new().with_max_bytes(30));
        store.set("a", json!("xxxxxxxxxx"), None, false).await;
        store.set("b", json!("xxxxxxxxxx"), None, false).await;
        store.set("c", json!("xxxxxxxxxx"), None, false).await;

        assert_eq!(store.get("a").await, None);
        assert!(store.contains("b").await);
        assert!(store.contains("c").await);

        let status = store.status().await;
        assert!(status.total_bytes <= 30);
    }

    #[tokio::test]
    async fn test_oversized_entry_is_still_admitted() {
        let store = CacheStore::new(CacheConfig::new().with_max_bytes(4));
        store.set("big", json!("far too large to fit"), None, false).await;

        assert!(store.contains("big").await);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_replacing_entry_does_not_count_twice() {
        let store = CacheStore::new(CacheConfig::new().with_max_entries(1));
        store.set("k", json!("first"), None, false).await;
        store.set("k", json!("second"), None, false).await;

        assert_eq!(store.get("k").await, Some(json!("second")));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_persisted_entry_survives_new_store() {
        let backend = Arc::new(MemoryBackend::new());
        let store =
            CacheStore::with_persistence(CacheConfig::default(), backend.clone());
        store.set("k", json!("durable"), None, true).await;
        drop(store);

        let revived =
            CacheStore::with_persistence(CacheConfig::default(), backend.clone());
        assert_eq!(revived.get("k").await, Some(json!("durable")));
        // The promotion lands it back in the in-memory tier.
        assert_eq!(revived.len().await, 1);
    }

    #[tokio::test]
    async fn test_non_persisted_entry_stays_in_memory() {
        let backend = Arc::new(MemoryBackend::new());
        let store =
            CacheStore::with_persistence(CacheConfig::default(), backend.clone());
        store.set("k", json!("ephemeral"), None, false).await;

        assert!(backend.is_empty());
        assert_eq!(store.get("k").await, Some(json!("ephemeral")));
    }

    #[tokio::test]
    async fn test_set_without_persist_drops_stale_persisted_copy() {
        let backend = Arc::new(MemoryBackend::new());
        let store =
            CacheStore::with_persistence(CacheConfig::default(), backend.clone());
        store.set("k", json!("old"), None, true).await;
        assert_eq!(backend.len(), 1);

        store.set("k", json!("new"), None, false).await;
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_expired_persisted_entry_is_deleted() {
        let backend = Arc::new(MemoryBackend::new());
        let past = Utc::now() - chrono::Duration::seconds(1);
        backend.set("k", &json!("stale"), Some(past), true).unwrap();

        let store =
            CacheStore::with_persistence(CacheConfig::default(), backend.clone());
        assert_eq!(store.get("k").await, None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_clear_scopes_persistent_tier() {
        let backend = Arc::new(MemoryBackend::new());
        let store =
            CacheStore::with_persistence(CacheConfig::default(), backend.clone());
        store.set("k", json!(1), None, true).await;

        store.clear(false).await;
        assert_eq!(backend.len(), 1);
        // The persisted copy is promoted back on the next read.
        assert_eq!(store.get("k").await, Some(json!(1)));

        store.clear(true).await;
        assert!(backend.is_empty());
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_cleanup_reports_removed_entries() {
        let store = CacheStore::new(CacheConfig::default());
        store
            .set("old", json!(1), Some(Duration::from_millis(10)), false)
            .await;
        store.set("live", json!(2), None, false).await;

        sleep(Duration::from_millis(30)).await;

        assert_eq!(store.cleanup().await, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.contains("live").await);
    }

    #[tokio::test]
    async fn test_custom_backend_receives_operations() {
        let store = CacheStore::new(CacheConfig::default());
        store.set("before", json!(1), None, false).await;

        let custom = Arc::new(MemoryBackend::new());
        store
            .set_custom_backend(Some(custom.clone() as Arc<dyn StorageBackend>))
            .await;

        // Installing the backend drops prior state.
        assert_eq!(store.get("before").await, None);

        store.set("k", json!("routed"), None, false).await;
        assert_eq!(custom.len(), 1);
        assert_eq!(store.get("k").await, Some(json!("routed")));

        store.delete("k").await;
        assert!(custom.is_empty());
    }

    #[tokio::test]
    async fn test_removing_custom_backend_restores_default_tiers() {
        let store = CacheStore::new(CacheConfig::default());
        let custom = Arc::new(MemoryBackend::new());
        store
            .set_custom_backend(Some(custom.clone() as Arc<dyn StorageBackend>))
            .await;
        store.set("k", json!(1), None, false).await;

        store.set_custom_backend(None).await;

        // Entries are not migrated back; the default tier starts empty.
        assert_eq!(store.get("k").await, None);
        store.set("k2", json!(2), None, false).await;
        assert_eq!(store.get("k2").await, Some(json!(2)));
        assert_eq!(custom.len(), 1);
    }

    #[tokio::test]
    async fn test_bounds_apply_to_custom_backend() {
        let store = CacheStore::new(CacheConfig::new().with_max_entries(2));
        let custom = Arc::new(MemoryBackend::new());
        store
            .set_custom_backend(Some(custom.clone() as Arc<dyn StorageBackend>))
            .await;

        store.set("a", json!(1), None, false).await;
        store.set("b", json!(2), None, false).await;
        store.set("c", json!(3), None, false).await;

        assert_eq!(custom.len(), 2);
        assert_eq!(store.get("a").await, None);
    }

    #[tokio::test]
    async fn test_status_reflects_contents() {
        let backend = Arc::new(MemoryBackend::new());
        let store = CacheStore::with_persistence(
            CacheConfig::new().with_max_entries(10).with_max_bytes(1024),
            backend.clone(),
        );
        store.set("a", json!(1), Some(Duration::from_secs(60)), true).await;
        store.set("b", json!(2), None, false).await;

        let status = store.status().await;
        assert_eq!(status.entries, 2);
        assert_eq!(status.expiring_entries, 1);
        assert!(status.total_bytes > 0);
        assert_eq!(status.max_entries, Some(10));
        assert_eq!(status.max_bytes, Some(1024));
        assert_eq!(status.persistent_entries, Some(1));
        assert!(!status.custom_backend);
    }
}
