//! Tiered value cache with TTL, versioning, and size-bounded eviction.
//!
//! This crate provides the caching layer for resource resolution with:
//! - A primary in-memory tier plus an optional persistent secondary tier
//! - Per-entry TTL with eager purging on read
//! - Version reconciliation that drops stale entries atomically
//! - Least-recently-used eviction under byte and entry-count bounds
//! - Pluggable storage backends and a scheduled cleanup task
//!
//! # Example
//!
//! ```rust,ignore
//! use mabon_cache::{CacheConfig, CacheController};
//!
//! let config = CacheConfig::new()
//!     .with_max_entries(10_000)
//!     .with_max_bytes(64 * 1024 * 1024);
//!
//! let cache = CacheController::new(config);
//! cache.set("user:42", value, Some(Duration::from_secs(300)), false).await;
//! ```

mod backend;
mod config;
mod controller;
mod entry;
mod error;
mod sqlite;
mod store;
mod tracker;

pub use backend::{BackendStatus, MemoryBackend, PersistedEntry, StorageBackend};
pub use config::{CacheConfig, DEFAULT_CLEANUP_INTERVAL};
pub use controller::{CacheController, CacheStatus};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use sqlite::SqliteBackend;
pub use store::{CacheStore, StoreStatus};
pub use tracker::AccessTracker;
