//! Cache controller owning the store and its background cleanup task.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::backend::StorageBackend;
use crate::config::CacheConfig;
use crate::store::{CacheStore, StoreStatus};

/// Handle to the spawned cleanup loop.
struct CleanupTask {
    token: CancellationToken,
    #[allow(dead_code)]
    task: tokio::task::JoinHandle<()>,
}

/// Combined status of the store and the cleanup task.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    #[serde(flatten)]
    pub store: StoreStatus,

    /// Whether the automatic cleanup task is running.
    pub cleanup_running: bool,
}

/// Owns a [`CacheStore`] and schedules expired-entry cleanup.
///
/// Cheap to clone; clones share the store and the cleanup task.
#[derive(Clone)]
pub struct CacheController {
    store: CacheStore,
    config: CacheConfig,
    cleanup: Arc<Mutex<Option<CleanupTask>>>,
}

impl std::fmt::Debug for CacheController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CacheController {
    /// Create a controller over a memory-only store.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: CacheStore::new(config.clone()),
            config,
            cleanup: Arc::new(Mutex::new(None)),
        }
    }

    /// Create a controller over a store with a persistent secondary tier.
    pub fn with_persistence(config: CacheConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            store: CacheStore::with_persistence(config.clone(), backend),
            config,
            cleanup: Arc::new(Mutex::new(None)),
        }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Start the periodic cleanup task.
    ///
    /// Without an explicit interval the configured default applies. A zero
    /// interval is rejected, and a second start while the task is running
    /// does nothing.
    pub async fn start_automatic_cleanup(&self, interval: Option<Duration>) {
        let interval = interval.unwrap_or(self.config.cleanup_interval);
        if interval.is_zero() {
            debug!("Ignoring cleanup start with zero interval");
            return;
        }

        let mut slot = self.cleanup.lock().await;
        if slot.is_some() {
            debug!("Cleanup task already running");
            return;
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let store = self.store.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; consume it so the first
            // sweep happens one full interval from now.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = store.cleanup().await;
                        if removed > 0 {
                            debug!(removed, "Cleanup sweep removed expired entries");
                        }
                    }
                }
            }
            debug!("Cleanup task stopped");
        });

        *slot = Some(CleanupTask { token, task });
        info!(interval = ?interval, "Started automatic cache cleanup");
    }

    /// Stop the cleanup task if it is running.
    pub async fn stop_automatic_cleanup(&self) {
        let mut slot = self.cleanup.lock().await;
        if let Some(cleanup) = slot.take() {
            cleanup.token.cancel();
            info!("Stopped automatic cache cleanup");
        }
    }

    /// Whether the cleanup task is currently running.
    pub async fn cleanup_running(&self) -> bool {
        self.cleanup.lock().await.is_some()
    }

    /// Combined status of the store and the cleanup task.
    pub async fn status(&self) -> CacheStatus {
        CacheStatus {
            store: self.store.status().await,
            cleanup_running: self.cleanup_running().await,
        }
    }

    // Data operations forward to the store.

    /// See [`CacheStore::set`].
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>, persist: bool) {
        self.store.set(key, value, ttl, persist).await;
    }

    /// See [`CacheStore::get`].
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.store.get(key).await
    }

    /// See [`CacheStore::delete`].
    pub async fn delete(&self, key: &str) {
        self.store.delete(key).await;
    }

    /// See [`CacheStore::reconcile_version`].
    pub async fn reconcile_version(&self, key: &str, version: Option<u64>) {
        self.store.reconcile_version(key, version).await;
    }

    /// See [`CacheStore::rewrite`].
    pub async fn rewrite(&self, key: &str, ttl: Option<Duration>, persist: bool) -> bool {
        self.store.rewrite(key, ttl, persist).await
    }

    /// See [`CacheStore::clear`].
    pub async fn clear(&self, persist_too: bool) {
        self.store.clear(persist_too).await;
    }

    /// See [`CacheStore::cleanup`].
    pub async fn cleanup(&self) -> usize {
        self.store.cleanup().await
    }

    /// See [`CacheStore::set_limits`].
    pub async fn set_limits(&self, max_bytes: Option<u64>, max_entries: Option<usize>) {
        self.store.set_limits(max_bytes, max_entries).await;
    }

    /// See [`CacheStore::set_custom_backend`].
    pub async fn set_custom_backend(&self, backend: Option<Arc<dyn StorageBackend>>) {
        self.store.set_custom_backend(backend).await;
    }

    /// See [`CacheStore::contains`].
    pub async fn contains(&self, key: &str) -> bool {
        self.store.contains(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_forwards_data_operations() {
        let cache = CacheController::new(CacheConfig::default());
        cache.set("k", json!(1), None, false).await;

        assert_eq!(cache.get("k").await, Some(json!(1)));
        assert!(cache.contains("k").await);

        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_cleanup_task_removes_expired_entries() {
        let cache = CacheController::new(CacheConfig::default());
        cache
            .set("k", json!(1), Some(Duration::from_millis(10)), false)
            .await;

        cache
            .start_automatic_cleanup(Some(Duration::from_millis(20)))
            .await;
        assert!(cache.cleanup_running().await);

        sleep(Duration::from_millis(60)).await;
        assert!(cache.store().is_empty().await);

        cache.stop_automatic_cleanup().await;
        assert!(!cache.cleanup_running().await);
    }

    #[tokio::test]
    async fn test_second_start_is_a_no_op() {
        let cache = CacheController::new(CacheConfig::default());
        cache
            .start_automatic_cleanup(Some(Duration::from_millis(50)))
            .await;
        cache
            .start_automatic_cleanup(Some(Duration::from_millis(50)))
            .await;

        assert!(cache.cleanup_running().await);

        // A single stop ends the single task.
        cache.stop_automatic_cleanup().await;
        assert!(!cache.cleanup_running().await);
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let cache = CacheController::new(CacheConfig::default());
        cache.start_automatic_cleanup(Some(Duration::ZERO)).await;

        assert!(!cache.cleanup_running().await);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_harmless() {
        let cache = CacheController::new(CacheConfig::default());
        cache.stop_automatic_cleanup().await;
        cache.stop_automatic_cleanup().await;
        assert!(!cache.cleanup_running().await);
    }

    #[tokio::test]
    async fn test_default_interval_comes_from_config() {
        let config = CacheConfig::new().with_cleanup_interval(Duration::from_millis(20));
        let cache = CacheController::new(config);
        cache
            .set("k", json!(1), Some(Duration::from_millis(10)), false)
            .await;

        cache.start_automatic_cleanup(None).await;
        sleep(Duration::from_millis(60)).await;

        assert!(cache.store().is_empty().await);
        cache.stop_automatic_cleanup().await;
    }

    #[tokio::test]
    async fn test_status_includes_cleanup_state() {
        let cache = CacheController::new(CacheConfig::default());
        cache.set("k", json!(1), None, false).await;

        let status = cache.status().await;
        assert_eq!(status.store.entries, 1);
        assert!(!status.cleanup_running);

        cache
            .start_automatic_cleanup(Some(Duration::from_secs(60)))
            .await;
        assert!(cache.status().await.cleanup_running);
        cache.stop_automatic_cleanup().await;
    }
}
