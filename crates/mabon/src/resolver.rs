//! The resolver facade: resolve, sessions, and the admin surface.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use mabon_cache::{CacheConfig, CacheController, CacheStatus, StorageBackend};
use mabon_retry::{RetryError, RetryHandle};

use crate::error::ResolveError;
use crate::options::{CacheParams, ResolveOptions};
use crate::pending::{Pending, PendingState, Resolution};
use crate::session::{Execution, ResourceSession};

/// Configuration for a [`Resolver`].
#[derive(Clone, Default)]
pub struct ResolverConfig {
    /// Cache store configuration.
    pub cache: CacheConfig,

    /// Persistent secondary tier for the cache, if any.
    pub storage: Option<Arc<dyn StorageBackend>>,
}

impl std::fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("cache", &self.cache)
            .field("storage", &self.storage.is_some())
            .finish()
    }
}

impl ResolverConfig {
    /// Create a configuration with cache defaults and no persistence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the persistent secondary tier.
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }
}

struct ResolverInner {
    sessions: RwLock<HashMap<String, ResourceSession>>,
    cache: CacheController,
    /// Monotonic counter distinguishing executions across the resolver.
    epochs: AtomicU64,
}

/// Entry point for resource resolution.
///
/// Mediates between callers requesting possibly-expensive async
/// computations and their eventual results, adding caching, retries,
/// deduplication of in-flight work, and cancellation. Cheap to clone;
/// clones share all state.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    /// Create a resolver with default configuration.
    pub fn new() -> Self {
        Self::with_config(ResolverConfig::default())
    }

    /// Create a resolver from a configuration.
    pub fn with_config(config: ResolverConfig) -> Self {
        let cache = match config.storage {
            Some(backend) => CacheController::with_persistence(config.cache, backend),
            None => CacheController::new(config.cache),
        };

        Self {
            inner: Arc::new(ResolverInner {
                sessions: RwLock::new(HashMap::new()),
                cache,
                epochs: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide default resolver, created on first use.
    ///
    /// Nothing requires the global instance; call sites that prefer
    /// explicit ownership can construct and pass their own.
    pub fn global() -> &'static Resolver {
        static GLOBAL: OnceLock<Resolver> = OnceLock::new();
        GLOBAL.get_or_init(Resolver::new)
    }

    /// Resolve a value for a resource.
    ///
    /// With a usable `resource_id`, the id doubles as the cache key and
    /// the dedup identity: a cached value resolves immediately without
    /// invoking the supplier, and concurrent resolves for one identity
    /// share a single execution. Without an id (or with a blank one) the
    /// call runs as a one-shot: no caching, no cross-call dedup, retry
    /// still honored.
    ///
    /// Returns immediately with a [`Resolution`]; the supplier runs on a
    /// spawned task.
    pub async fn resolve<V, F, Fut>(
        &self,
        resource_id: Option<&str>,
        supplier: F,
        options: ResolveOptions,
    ) -> Resolution<V>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        match resource_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.resolve_keyed(id, supplier, options).await,
            None => self.resolve_anonymous(supplier, options),
        }
    }

    async fn resolve_keyed<V, F, Fut>(
        &self,
        key: &str,
        supplier: F,
        options: ResolveOptions,
    ) -> Resolution<V>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let identity = options.identity(key);
        let params = options.cache_params();

        let mut sessions = self.inner.sessions.write().await;
        let session = sessions
            .entry(key.to_string())
            .or_insert_with(|| ResourceSession::new(identity, params.clone()));

        if session.identity != identity {
            if let Some(execution) = session.execution.take() {
                debug!(resource = %key, "Superseding execution after identity change");
                execution.token.cancel();
            }

            let refresh = params.enabled
                && session.cache_params.enabled
                && session.cache_params.version == params.version
                && (session.cache_params.ttl != params.ttl
                    || session.cache_params.persist != params.persist);
            session.identity = identity;
            session.cache_params = params.clone();

            if refresh {
                // The new TTL and persistence apply to the stored entry
                // now rather than after the old expiry.
                self.inner.cache.rewrite(key, params.ttl, params.persist).await;
            }
        }

        if params.enabled {
            self.inner.cache.reconcile_version(key, params.version).await;
            if let Some(value) = self.inner.cache.get(key).await {
                debug!(resource = %key, "Resolved from cache");
                let (state_rx, attempt_rx) = settled_channels(PendingState::Ready(value));
                return Resolution::new(Pending::new(state_rx), attempt_rx);
            }
        }

        if let Some(execution) = &session.execution {
            debug!(resource = %key, "Joining in-flight resolution");
            return Resolution::new(
                Pending::new(execution.state_rx.clone()),
                execution.attempt_rx.clone(),
            );
        }

        let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed);
        let (state_tx, state_rx) = watch::channel(PendingState::Pending);
        let handle = mabon_retry::spawn(options.retry_policy(), supplier);
        let attempt_rx = handle.watch_attempt();

        session.execution = Some(Execution {
            state_rx: state_rx.clone(),
            attempt_rx: attempt_rx.clone(),
            token: handle.cancellation_token(),
            epoch,
            cancelled: false,
        });
        drop(sessions);

        debug!(resource = %key, "Started resolution");
        let inner = self.inner.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            finish_keyed(inner, key, params, epoch, state_tx, handle).await;
        });

        Resolution::new(Pending::new(state_rx), attempt_rx)
    }

    fn resolve_anonymous<V, F, Fut>(&self, supplier: F, options: ResolveOptions) -> Resolution<V>
    where
        V: Serialize + DeserializeOwned + Send + 'static,
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        debug!("Started anonymous resolution");
        let (state_tx, state_rx) = watch::channel(PendingState::Pending);
        let handle = mabon_retry::spawn(options.retry_policy(), supplier);
        let attempt_rx = handle.watch_attempt();

        tokio::spawn(async move {
            let state = match handle.join().await {
                Ok(value) => match serde_json::to_value(value) {
                    Ok(value) => PendingState::Ready(value),
                    Err(e) => {
                        warn!(error = %e, "Resolved value is not JSON-representable");
                        PendingState::Failed(ResolveError::Deserialize(e.to_string()))
                    }
                },
                Err(error) => PendingState::Failed(retry_error(error)),
            };
            let _ = state_tx.send(state);
        });

        Resolution::new(Pending::new(state_rx), attempt_rx)
    }

    /// Cancel the in-flight resolution for a resource.
    ///
    /// Cancellation is monotonic: the execution never publishes a further
    /// result and its value is never cached. Later resolves for the same
    /// identity observe the cancelled handle until [`Resolver::teardown`]
    /// or an identity change.
    pub async fn cancel(&self, resource_id: &str) {
        let mut sessions = self.inner.sessions.write().await;
        if let Some(session) = sessions.get_mut(resource_id.trim()) {
            if let Some(execution) = &mut session.execution {
                if !execution.cancelled {
                    debug!(resource = %resource_id, "Cancelling resolution");
                    execution.cancelled = true;
                    execution.token.cancel();
                }
            }
        }
    }

    /// Destroy the session for a resource, cancelling any in-flight
    /// execution. The next resolve starts from scratch.
    pub async fn teardown(&self, resource_id: &str) {
        let mut sessions = self.inner.sessions.write().await;
        if let Some(session) = sessions.remove(resource_id.trim()) {
            if let Some(execution) = session.execution {
                execution.token.cancel();
            }
            debug!(resource = %resource_id, "Session torn down");
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    /// Whether a session exists for a resource id.
    pub async fn has_session(&self, resource_id: &str) -> bool {
        self.inner
            .sessions
            .read()
            .await
            .contains_key(resource_id.trim())
    }

    // Administrative surface, forwarded to the cache controller.

    /// Reconfigure the cache size bounds.
    pub async fn set_size_limit(&self, max_bytes: Option<u64>, max_entries: Option<usize>) {
        self.inner.cache.set_limits(max_bytes, max_entries).await;
    }

    /// Install a custom cache storage backend, or restore the defaults
    /// with `None`.
    pub async fn set_custom_storage(&self, backend: Option<Arc<dyn StorageBackend>>) {
        self.inner.cache.set_custom_backend(backend).await;
    }

    /// Purge expired cache entries now, returning how many were removed.
    pub async fn cleanup(&self) -> usize {
        self.inner.cache.cleanup().await
    }

    /// Start periodic cache cleanup; `None` uses the configured interval.
    pub async fn start_automatic_cleanup(&self, interval: Option<Duration>) {
        self.inner.cache.start_automatic_cleanup(interval).await;
    }

    /// Stop periodic cache cleanup.
    pub async fn stop_automatic_cleanup(&self) {
        self.inner.cache.stop_automatic_cleanup().await;
    }

    /// Cache status snapshot.
    pub async fn status(&self) -> CacheStatus {
        self.inner.cache.status().await
    }

    /// Clear cached values; include the persistent tier when
    /// `persist_too`.
    pub async fn clear(&self, persist_too: bool) {
        self.inner.cache.clear(persist_too).await;
    }

    /// Access the cache controller directly.
    pub fn cache(&self) -> &CacheController {
        &self.inner.cache
    }
}

/// Publish a finished keyed execution.
///
/// The cancelled check, cache write, publish, and untrack all happen under
/// the session lock, so a concurrent cancel cannot slip a stale result
/// through: a result that loses the race is discarded, never cached, never
/// published.
async fn finish_keyed<V>(
    inner: Arc<ResolverInner>,
    key: String,
    params: CacheParams,
    epoch: u64,
    state_tx: watch::Sender<PendingState>,
    handle: RetryHandle<V>,
) where
    V: Serialize + Send + 'static,
{
    let outcome = handle.join().await;

    let mut sessions = inner.sessions.write().await;
    let live = sessions
        .get(&key)
        .and_then(|session| session.execution.as_ref())
        .is_some_and(|execution| execution.epoch == epoch && !execution.cancelled);

    if !live {
        debug!(resource = %key, "Discarding result of superseded execution");
        let _ = state_tx.send(PendingState::Failed(ResolveError::Cancelled));
        return;
    }

    match outcome {
        Ok(value) => match serde_json::to_value(value) {
            Ok(value) => {
                if params.enabled {
                    inner
                        .cache
                        .set(&key, value.clone(), params.ttl, params.persist)
                        .await;
                }
                let _ = state_tx.send(PendingState::Ready(value));
                untrack(&mut sessions, &key, epoch);
            }
            Err(e) => {
                warn!(resource = %key, error = %e, "Resolved value is not JSON-representable");
                let _ = state_tx.send(PendingState::Failed(ResolveError::Deserialize(
                    e.to_string(),
                )));
                untrack(&mut sessions, &key, epoch);
            }
        },
        Err(RetryError::Cancelled) => {
            let _ = state_tx.send(PendingState::Failed(ResolveError::Cancelled));
        }
        Err(RetryError::Exhausted { attempts, error }) => {
            warn!(resource = %key, attempts, "Resolution failed");
            let _ = state_tx.send(PendingState::Failed(ResolveError::Supplier {
                attempts,
                error: Arc::new(error),
            }));
            untrack(&mut sessions, &key, epoch);
        }
    }
}

/// Remove a finished execution, leaving the session in place.
fn untrack(sessions: &mut HashMap<String, ResourceSession>, key: &str, epoch: u64) {
    if let Some(session) = sessions.get_mut(key) {
        if session
            .execution
            .as_ref()
            .is_some_and(|execution| execution.epoch == epoch)
        {
            session.execution = None;
        }
    }
}

fn retry_error(error: RetryError) -> ResolveError {
    match error {
        RetryError::Cancelled => ResolveError::Cancelled,
        RetryError::Exhausted { attempts, error } => ResolveError::Supplier {
            attempts,
            error: Arc::new(error),
        },
    }
}

/// Channels for an already-settled resolution, such as a cache hit.
fn settled_channels(
    state: PendingState,
) -> (watch::Receiver<PendingState>, watch::Receiver<u32>) {
    let (state_tx, state_rx) = watch::channel(state);
    let (attempt_tx, attempt_rx) = watch::channel(0);
    drop(state_tx);
    drop(attempt_tx);
    (state_rx, attempt_rx)
}
