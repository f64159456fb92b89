//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions and expirations.

use serde::Serialize;

// == Cache Stats ==
/// Counters and occupancy figures for a cache instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful reads
    pub hits: u64,
    /// Number of failed reads (key absent or expired)
    pub misses: u64,
    /// Number of entries evicted to make room under the byte capacity
    pub evictions: u64,
    /// Number of entries dropped for being past their TTL, lazily or by the reaper
    pub expirations: u64,
    /// Stores rejected because the value alone exceeded capacity
    pub rejections: u64,
    /// Current number of resident entries
    pub total_entries: usize,
    /// Current sum of resident value sizes, in bytes
    pub total_bytes: usize,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no reads have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_evictions(&mut self, count: usize) {
        self.evictions += count as u64;
    }

    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    pub fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    // == Occupancy ==
    /// Updates the entry count and byte total snapshot.
    pub fn set_occupancy(&mut self, entries: usize, bytes: usize) {
        self.total_entries = entries;
        self.total_bytes = bytes;
    }
}
