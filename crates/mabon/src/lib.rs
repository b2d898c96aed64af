//! Resource resolution with caching, retries, dedup, and cancellation.
//!
//! The [`Resolver`] sits between callers and their async suppliers. A
//! resolve names a resource, hands over a supplier closure, and gets back
//! a [`Resolution`] immediately; the work runs on a spawned task. Along
//! the way the resolver:
//! - Serves cached values without invoking the supplier, honoring TTL,
//!   version invalidation, and size-bounded LRU eviction
//! - Retries failing suppliers on a configurable backoff schedule
//! - Deduplicates concurrent resolves for the same resource identity
//!   into a single execution
//! - Cancels in-flight work on request, monotonically
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use mabon::{ResolveOptions, Resolver};
//!
//! let resolver = Resolver::new();
//! let options = ResolveOptions::new()
//!     .with_retry(3)
//!     .with_retry_delay(Duration::from_millis(250))
//!     .with_cache_ttl(Duration::from_secs(300));
//!
//! let resolution = resolver
//!     .resolve(Some("user:42"), || async { fetch_user(42).await }, options)
//!     .await;
//! let user: User = resolution.wait().await?;
//! ```

mod error;
mod options;
mod pending;
mod resolver;
mod session;

pub use error::{ResolveError, Result};
pub use options::ResolveOptions;
pub use pending::{Pending, Resolution};
pub use resolver::{Resolver, ResolverConfig};

// Re-export the cache surface reachable through the resolver.
pub use mabon_cache::{
    BackendStatus, CacheConfig, CacheController, CacheStatus, MemoryBackend, PersistedEntry,
    SqliteBackend, StorageBackend, StoreStatus,
};

// Re-export the retry types used in resolve options.
pub use mabon_retry::{Backoff, BackoffFn, RetryPolicy};
