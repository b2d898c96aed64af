//! Per-resolve options for retries and caching.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use mabon_retry::{Backoff, RetryPolicy};

/// Options for a single resolve call.
///
/// The default is no retries and no caching; builder methods opt in. The
/// cache setters all imply `cache = true`.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Re-run a failing supplier per the retry fields below.
    pub retry: bool,

    /// Number of retries after the initial attempt. Defaults to 1 so that
    /// enabling `retry` without a count allows a single retry.
    pub retry_count: u32,

    /// Base delay between attempts.
    pub retry_delay: Duration,

    /// Backoff schedule applied to the base delay.
    pub backoff: Backoff,

    /// Cache successful results under the resource id.
    pub cache: bool,

    /// Time-to-live for the cached result; `None` caches without expiry.
    pub cache_ttl: Option<Duration>,

    /// Caller-managed version; any change drops the cached result before
    /// the next lookup.
    pub cache_version: Option<u64>,

    /// Mirror the cached result to the persistent tier.
    pub cache_persist: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            retry: false,
            retry_count: 1,
            retry_delay: Duration::ZERO,
            backoff: Backoff::Fixed,
            cache: false,
            cache_ttl: None,
            cache_version: None,
            cache_persist: false,
        }
    }
}

impl ResolveOptions {
    /// Create options with retries and caching disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable retries with the given count after the initial attempt.
    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry = true;
        self.retry_count = count;
        self
    }

    /// Set the base delay between retry attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the backoff schedule.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enable caching of successful results.
    pub fn with_cache(mut self) -> Self {
        self.cache = true;
        self
    }

    /// Cache successful results with a time-to-live.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = true;
        self.cache_ttl = Some(ttl);
        self
    }

    /// Set the caller-managed cache version.
    pub fn with_cache_version(mut self, version: u64) -> Self {
        self.cache = true;
        self.cache_version = Some(version);
        self
    }

    /// Mirror cached results to the persistent tier.
    pub fn with_cache_persist(mut self) -> Self {
        self.cache = true;
        self.cache_persist = true;
        self
    }

    /// The retry policy for this resolve. Single-attempt when retries are
    /// disabled, so every execution flows through the same runner.
    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        if !self.retry {
            return RetryPolicy::new();
        }
        RetryPolicy::new()
            .with_count(self.retry_count)
            .with_delay(self.retry_delay)
            .with_backoff(self.backoff.clone())
    }

    /// The cache-relevant subset of these options.
    pub(crate) fn cache_params(&self) -> CacheParams {
        CacheParams {
            enabled: self.cache,
            ttl: self.cache_ttl,
            version: self.cache_version,
            persist: self.cache_persist,
        }
    }

    /// Identity hash for deduplication: the resource id plus every option
    /// that changes execution or caching behavior.
    ///
    /// A custom backoff hashes by function pointer identity, so two
    /// resolves share an identity only when they share the same `Arc`.
    pub(crate) fn identity(&self, resource_id: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        resource_id.hash(&mut hasher);
        self.retry.hash(&mut hasher);
        self.retry_count.hash(&mut hasher);
        self.retry_delay.hash(&mut hasher);
        backoff_tag(&self.backoff).hash(&mut hasher);
        if let Backoff::Custom(f) = &self.backoff {
            (Arc::as_ptr(f) as *const () as usize).hash(&mut hasher);
        }
        self.cache.hash(&mut hasher);
        self.cache_ttl.hash(&mut hasher);
        self.cache_version.hash(&mut hasher);
        self.cache_persist.hash(&mut hasher);
        hasher.finish()
    }
}

/// Cache parameters carried by a session, compared across resolves to
/// detect TTL/persistence/version changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CacheParams {
    pub enabled: bool,
    pub ttl: Option<Duration>,
    pub version: Option<u64>,
    pub persist: bool,
}

fn backoff_tag(backoff: &Backoff) -> u8 {
    match backoff {
        Backoff::Fixed => 0,
        Backoff::Linear => 1,
        Backoff::Exponential => 2,
        Backoff::Custom(_) => 3,
    }
}
