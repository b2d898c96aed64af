//! Configuration for the cache store.

use std::time::Duration;

/// Default interval for the automatic cleanup task.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the cache store.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum total size of cached values in bytes.
    /// `None` disables the byte bound.
    pub max_bytes: Option<u64>,

    /// Maximum number of cached entries.
    /// `None` disables the entry-count bound.
    pub max_entries: Option<usize>,

    /// Interval for the automatic cleanup task when started without an
    /// explicit interval.
    pub cleanup_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: None,
            max_entries: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum total size of cached values in bytes.
    pub fn with_max_bytes(mut self, max: u64) -> Self {
        self.max_bytes = Some(max);
        self
    }

    /// Set the maximum number of cached entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max);
        self
    }

    /// Remove both size bounds (the default).
    pub fn without_limits(mut self) -> Self {
        self.max_bytes = None;
        self.max_entries = None;
        self
    }

    /// Set the default cleanup interval.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }
}
