//! Access-order and size bookkeeping for eviction.

use std::collections::HashMap;

/// Tracks access order and value sizes for least-recently-used eviction.
///
/// Access order uses a logical counter instead of wall-clock timestamps so
/// back-to-back accesses always rank distinctly.
#[derive(Debug, Default)]
pub struct AccessTracker {
    /// Logical access stamp for each key.
    stamps: HashMap<String, u64>,

    /// Estimated value size for each key.
    sizes: HashMap<String, usize>,

    /// Running total of all tracked sizes.
    total_bytes: u64,

    /// Next stamp to hand out.
    next_stamp: u64,
}

impl AccessTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access for a key, making it the most recently used.
    pub fn touch(&mut self, key: &str) {
        self.next_stamp += 1;
        self.stamps.insert(key.to_string(), self.next_stamp);
    }

    /// Record the size of a key's value, replacing any previous size.
    pub fn record_size(&mut self, key: &str, size: usize) {
        if let Some(old) = self.sizes.insert(key.to_string(), size) {
            self.total_bytes = self.total_bytes.saturating_sub(old as u64);
        }
        self.total_bytes = self.total_bytes.saturating_add(size as u64);
    }

    /// Remove all bookkeeping for a key.
    pub fn remove(&mut self, key: &str) {
        self.stamps.remove(key);
        if let Some(size) = self.sizes.remove(key) {
            self.total_bytes = self.total_bytes.saturating_sub(size as u64);
        }
    }

    /// The least-recently-used key, if any are tracked.
    pub fn lru_key(&self) -> Option<&str> {
        self.stamps
            .iter()
            .min_by_key(|(_, stamp)| **stamp)
            .map(|(key, _)| key.as_str())
    }

    /// Total tracked bytes.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    /// Check if no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    /// Clear all bookkeeping.
    pub fn clear(&mut self) {
        self.stamps.clear();
        self.sizes.clear();
        self.total_bytes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_orders_by_recency() {
        let mut tracker = AccessTracker::new();
        tracker.touch("a");
        tracker.touch("b");
        tracker.touch("c");

        assert_eq!(tracker.lru_key(), Some("a"));

        // Re-touching moves a key to the back of the eviction order.
        tracker.touch("a");
        assert_eq!(tracker.lru_key(), Some("b"));
    }

    #[test]
    fn test_record_size_totals() {
        let mut tracker = AccessTracker::new();
        tracker.record_size("a", 100);
        tracker.record_size("b", 50);
        assert_eq!(tracker.total_bytes(), 150);

        // Replacing a size subtracts the old one first.
        tracker.record_size("a", 30);
        assert_eq!(tracker.total_bytes(), 80);
    }

    #[test]
    fn test_remove_reclaims_size() {
        let mut tracker = AccessTracker::new();
        tracker.touch("a");
        tracker.record_size("a", 100);
        tracker.touch("b");
        tracker.record_size("b", 50);

        tracker.remove("a");
        assert_eq!(tracker.total_bytes(), 50);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.lru_key(), Some("b"));
    }

    #[test]
    fn test_clear() {
        let mut tracker = AccessTracker::new();
        tracker.touch("a");
        tracker.record_size("a", 100);

        tracker.clear();
        assert!(tracker.is_empty());
        assert_eq!(tracker.total_bytes(), 0);
        assert_eq!(tracker.lru_key(), None);
    }
}
