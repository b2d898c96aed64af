//! Cache entry representation and size estimation.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Entry stored in the primary cache tier.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached value.
    pub value: Value,

    /// When this entry expires (`None` means it never expires).
    ///
    /// Stored as a wall-clock timestamp so persisted deadlines remain
    /// meaningful across process restarts.
    pub expires_at: Option<DateTime<Utc>>,

    /// Whether this entry is mirrored to the persistent tier.
    pub persist: bool,

    /// Estimated size of the serialized value in bytes.
    pub size_bytes: usize,
}

impl CacheEntry {
    /// Create a new entry, computing its size estimate.
    pub fn new(value: Value, expires_at: Option<DateTime<Utc>>, persist: bool) -> Self {
        let size_bytes = estimate_size(&value);
        Self {
            value,
            expires_at,
            persist,
            size_bytes,
        }
    }

    /// Check whether the entry has expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(deadline) => Utc::now() > deadline,
        }
    }
}

/// Estimate the serialized size of a value in bytes.
///
/// Values that fail to serialize count as zero bytes.
pub fn estimate_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}
