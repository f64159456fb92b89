//! Cache Store Module
//!
//! Admission and eviction engine: the public cache API layered over the
//! ledger, with one lock guarding all cache state.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::{CacheEntry, CacheStats, Ledger};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::tasks::Reaper;

// == Cache State ==
/// Everything the cache lock protects.
#[derive(Debug)]
pub(crate) struct CacheState {
    pub(crate) ledger: Ledger,
    pub(crate) stats: CacheStats,
}

impl CacheState {
    pub(crate) fn new(capacity_bytes: usize) -> Self {
        Self {
            ledger: Ledger::new(capacity_bytes),
            stats: CacheStats::new(),
        }
    }

    /// Drops every entry past its deadline and returns how many went.
    pub(crate) fn purge_expired(&mut self, now: Instant) -> usize {
        let removed = self.ledger.sweep_expired(now).len();
        self.stats.record_expirations(removed);
        removed
    }
}

// == LRU Cache ==
/// Byte-bounded key/value cache with LRU eviction and per-entry TTL.
///
/// All operations are blocking and serialize on a single lock. Share an
/// instance between threads with `Arc<LruCache>`.
#[derive(Debug)]
pub struct LruCache {
    state: Arc<Mutex<CacheState>>,
    /// TTL for entries stored without one
    default_ttl: Option<Duration>,
    /// Background expiry sweeper, None when disabled or closed
    reaper: Mutex<Option<Reaper>>,
}

impl LruCache {
    // == Constructor ==
    /// Creates a cache from `config`, starting the reaper if it has an interval.
    ///
    /// Fails only when the reaper thread cannot be started.
    pub fn new(config: Config) -> Result<Self> {
        let state = Arc::new(Mutex::new(CacheState::new(config.effective_max_size())));

        let reaper = match config.reaper_interval() {
            Some(interval) => Some(Reaper::spawn(Arc::clone(&state), interval)?),
            None => None,
        };

        Ok(Self {
            state,
            default_ttl: config.default_ttl(),
            reaper: Mutex::new(reaper),
        })
    }

    // == Store ==
    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// The entry expires `ttl` from now, or after the configured default TTL
    /// when `ttl` is None; without either it never expires. Least recently
    /// used entries are evicted until the value fits. A value larger than the
    /// whole capacity is rejected and the cache is left unchanged.
    pub fn store(
        &self,
        key: impl Into<String>,
        value: impl Into<Bytes>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let key = key.into();
        let value = value.into();

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let capacity = state.ledger.capacity_bytes();
        if value.len() > capacity {
            state.stats.record_rejection();
            debug!(
                "Rejected store of '{}': {} bytes exceeds capacity of {} bytes",
                key,
                value.len(),
                capacity
            );
            return Err(CacheError::ValueTooLarge {
                size: value.len(),
                capacity,
            });
        }

        let entry = CacheEntry::new(key, value, ttl.or(self.default_ttl), Instant::now());

        // Release the bytes of the value being overwritten before making room.
        state.ledger.remove(&entry.key);

        let mut evicted = 0;
        while state.ledger.total_bytes() + entry.size() > capacity {
            match state.ledger.evict_oldest() {
                Some(victim) => {
                    debug!("Evicted '{}' ({} bytes)", victim.key, victim.size());
                    evicted += 1;
                }
                None => break,
            }
        }
        state.stats.record_evictions(evicted);

        state.ledger.insert_or_replace(entry);
        Ok(())
    }

    // == Get ==
    /// Returns the bytes stored under `key` and marks it most recently used.
    ///
    /// An expired entry is removed on the spot and reported as `NotFound`.
    /// The returned buffer is an immutable snapshot; later stores do not
    /// affect it.
    pub fn get(&self, key: &str) -> Result<Bytes> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let now = Instant::now();

        let found = state
            .ledger
            .lookup(key)
            .map(|entry| (entry.is_expired_at(now), entry.value.clone()));

        match found {
            Some((false, value)) => {
                state.ledger.touch(key);
                state.stats.record_hit();
                trace!("Cache hit for '{}'", key);
                Ok(value)
            }
            Some((true, _)) => {
                state.ledger.remove(key);
                state.stats.record_expirations(1);
                state.stats.record_miss();
                trace!("Cache miss for '{}': expired", key);
                Err(CacheError::NotFound(key.to_string()))
            }
            None => {
                state.stats.record_miss();
                trace!("Cache miss for '{}'", key);
                Err(CacheError::NotFound(key.to_string()))
            }
        }
    }

    /// Like [`get`](Self::get), presenting the bytes as a reader.
    pub fn get_reader(&self, key: &str) -> Result<impl Read> {
        self.get(key).map(Buf::reader)
    }

    // == Contains ==
    /// Checks whether `key` holds a live entry, without touching recency.
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.state
            .lock()
            .ledger
            .lookup(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    // == Remove ==
    /// Removes `key`, returning whether anything was stored under it.
    pub fn remove(&self, key: &str) -> bool {
        self.state.lock().ledger.remove(key).is_some()
    }

    // == Clear ==
    /// Drops every entry. Statistics counters are kept.
    pub fn clear(&self) {
        self.state.lock().ledger.clear();
    }

    // == Purge Expired ==
    /// Runs one expiry sweep now and returns the number of entries removed.
    pub fn purge_expired(&self) -> usize {
        self.state.lock().purge_expired(Instant::now())
    }

    // == Occupancy ==
    /// Number of resident entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.state.lock().ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().ledger.is_empty()
    }

    /// Sum of resident value sizes, in bytes.
    pub fn size_bytes(&self) -> usize {
        self.state.lock().ledger.total_bytes()
    }

    pub fn capacity_bytes(&self) -> usize {
        self.state.lock().ledger.capacity_bytes()
    }

    // == Stats ==
    /// Returns a snapshot of the cache statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.set_occupancy(state.ledger.len(), state.ledger.total_bytes());
        stats
    }

    // == Close ==
    /// Stops the reaper and waits for it to exit.
    ///
    /// Idempotent. The cache stays fully usable; expired entries are then
    /// only reclaimed lazily or through [`purge_expired`](Self::purge_expired).
    pub fn close(&self) {
        let reaper = self.reaper.lock().take();
        if let Some(reaper) = reaper {
            reaper.shutdown();
        }
    }

    /// Whether a reaper is currently attached to this cache.
    pub fn has_reaper(&self) -> bool {
        self.reaper.lock().is_some()
    }

    /// Asserts ledger consistency; test support only.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let state = self.state.lock();
        state.ledger.assert_invariants();
        assert!(state.ledger.total_bytes() <= state.ledger.capacity_bytes());
    }

    #[cfg(test)]
    pub(crate) fn recency(&self) -> Vec<String> {
        self.state.lock().ledger.keys().map(str::to_string).collect()
    }
}

impl Drop for LruCache {
    fn drop(&mut self) {
        self.close();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    fn cache(max_size: usize) -> LruCache {
        LruCache::new(Config::new().with_max_size(max_size)).unwrap()
    }

    #[test]
    fn test_cache_new() {
        let cache = cache(100);
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        assert_eq!(cache.capacity_bytes(), 100);
        assert!(!cache.has_reaper());
    }

    #[test]
    fn test_zero_max_size_uses_default() {
        let cache = LruCache::new(Config::default()).unwrap();
        assert_eq!(cache.capacity_bytes(), crate::config::DEFAULT_MAX_SIZE);
    }

    #[test]
    fn test_store_and_get() {
        let cache = cache(100);

        cache.store("key1", "value1", None).unwrap();
        let value = cache.get("key1").unwrap();

        assert_eq!(value, "value1");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 6);
    }

    #[test]
    fn test_get_nonexistent() {
        let cache = cache(100);

        let result = cache.get("nonexistent");
        assert!(matches!(result, Err(CacheError::NotFound(_))));
    }

    #[test]
    fn test_get_reader() {
        let cache = cache(100);
        cache.store("key1", vec![1u8, 2, 3], None).unwrap();

        let mut buf = Vec::new();
        cache.get_reader("key1").unwrap().read_to_end(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 2, 3]);

        assert!(matches!(
            cache.get_reader("missing").map(|_| ()),
            Err(CacheError::NotFound(_))
        ));
    }

    #[test]
    fn test_overwrite() {
        let cache = cache(100);

        cache.store("key1", "value1", None).unwrap();
        cache.store("key1", "v2", None).unwrap();

        assert_eq!(cache.get("key1").unwrap(), "v2");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size_bytes(), 2);
        cache.assert_invariants();
    }

    #[test]
    fn test_overwrite_does_not_evict_for_its_own_old_value() {
        let cache = cache(100);

        cache.store("a", vec![0u8; 30], None).unwrap();
        cache.store("b", vec![0u8; 60], None).unwrap();
        // 30 + 60 + 50 would overflow, but 50 replaces the 60 held by "b".
        cache.store("b", vec![0u8; 50], None).unwrap();

        assert!(cache.contains("a"));
        assert_eq!(cache.size_bytes(), 80);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_returned_value_is_a_snapshot() {
        let cache = cache(100);

        cache.store("key1", "old", None).unwrap();
        let before = cache.get("key1").unwrap();
        cache.store("key1", "new", None).unwrap();

        assert_eq!(before, "old");
        assert_eq!(cache.get("key1").unwrap(), "new");
    }

    #[test]
    fn test_scenario_evicts_older_entry() {
        let cache = cache(100);

        cache.store("a", vec![b'a'; 60], None).unwrap();
        cache.store("b", vec![b'b'; 60], None).unwrap();

        assert!(matches!(cache.get("a"), Err(CacheError::NotFound(_))));
        assert_eq!(cache.get("b").unwrap(), vec![b'b'; 60]);
        assert_eq!(cache.size_bytes(), 60);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_lru_touch_on_get() {
        let cache = cache(30);

        cache.store("a", vec![0u8; 10], None).unwrap();
        cache.store("b", vec![0u8; 10], None).unwrap();
        cache.store("c", vec![0u8; 10], None).unwrap();

        // Reading "a" makes "b" the oldest.
        cache.get("a").unwrap();
        cache.store("d", vec![0u8; 10], None).unwrap();

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert!(cache.contains("d"));
        assert_eq!(cache.recency(), vec!["d", "a", "c"]);
        cache.assert_invariants();
    }

    #[test]
    fn test_eviction_frees_several_entries() {
        let cache = cache(30);

        cache.store("a", vec![0u8; 10], None).unwrap();
        cache.store("b", vec![0u8; 10], None).unwrap();
        cache.store("c", vec![0u8; 10], None).unwrap();
        cache.store("big", vec![0u8; 25], None).unwrap();

        assert_eq!(cache.recency(), vec!["big"]);
        assert_eq!(cache.stats().evictions, 3);
        cache.assert_invariants();
    }

    #[test]
    fn test_value_too_large_leaves_cache_unchanged() {
        let cache = cache(100);
        cache.store("a", vec![0u8; 40], None).unwrap();
        cache.store("b", vec![0u8; 40], None).unwrap();

        let result = cache.store("huge", vec![0u8; 101], None);
        assert!(matches!(
            result,
            Err(CacheError::ValueTooLarge {
                size: 101,
                capacity: 100
            })
        ));

        assert_eq!(cache.recency(), vec!["b", "a"]);
        assert_eq!(cache.size_bytes(), 80);
        assert_eq!(cache.stats().rejections, 1);
    }

    #[test]
    fn test_oversized_overwrite_keeps_old_value() {
        let cache = cache(10);
        cache.store("a", "small", None).unwrap();

        assert!(cache.store("a", vec![0u8; 11], None).is_err());
        assert_eq!(cache.get("a").unwrap(), "small");
    }

    #[test]
    fn test_value_exactly_capacity_is_accepted() {
        let cache = cache(10);
        cache.store("a", vec![0u8; 4], None).unwrap();
        cache.store("b", vec![0u8; 10], None).unwrap();

        assert_eq!(cache.recency(), vec!["b"]);
        assert_eq!(cache.size_bytes(), 10);
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = cache(100);

        cache
            .store("key1", "value1", Some(Duration::from_millis(10)))
            .unwrap();
        assert!(cache.get("key1").is_ok());

        sleep(Duration::from_millis(20));

        // Still resident until read, then dropped lazily.
        assert_eq!(cache.len(), 1);
        assert!(!cache.contains("key1"));
        assert!(matches!(cache.get("key1"), Err(CacheError::NotFound(_))));
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.size_bytes(), 0);

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_default_ttl_applies_without_explicit_ttl() {
        let config = Config::new()
            .with_max_size(100)
            .with_default_expire(Duration::from_millis(10));
        let cache = LruCache::new(config).unwrap();

        cache.store("short", "v", None).unwrap();
        cache
            .store("long", "v", Some(Duration::from_secs(60)))
            .unwrap();

        sleep(Duration::from_millis(20));

        assert!(cache.get("short").is_err());
        assert!(cache.get("long").is_ok());
    }

    #[test]
    fn test_overwrite_resets_ttl() {
        let cache = cache(100);

        cache.store("k", "v1", Some(Duration::from_millis(10))).unwrap();
        cache.store("k", "v2", None).unwrap();
        sleep(Duration::from_millis(20));

        assert_eq!(cache.get("k").unwrap(), "v2");
    }

    #[test]
    fn test_store_with_unbounded_ttl() {
        let cache = cache(100);

        cache.store("k", "v", Some(Duration::MAX)).unwrap();
        assert_eq!(cache.get("k").unwrap(), "v");
        assert_eq!(cache.purge_expired(), 0);

        let config = Config::new()
            .with_max_size(100)
            .with_default_expire(Duration::from_secs(u64::MAX));
        let cache = LruCache::new(config).unwrap();

        cache.store("k", "v", None).unwrap();
        assert_eq!(cache.get("k").unwrap(), "v");
    }

    #[test]
    fn test_unbounded_clean_interval_keeps_cache_working() {
        let config = Config::new()
            .with_max_size(100)
            .with_clean_interval(Duration::MAX);
        let cache = LruCache::new(config).unwrap();
        assert!(cache.has_reaper());

        cache.store("k", "v", None).unwrap();
        assert_eq!(cache.get("k").unwrap(), "v");

        // Returns promptly instead of waiting out the clamped interval.
        cache.close();
        assert!(!cache.has_reaper());
    }

    #[test]
    fn test_purge_expired() {
        let cache = cache(100);

        cache.store("k1", "value1", Some(Duration::from_millis(10))).unwrap();
        cache.store("k2", "value2", Some(Duration::from_secs(10))).unwrap();
        cache.store("k3", "value3", None).unwrap();

        sleep(Duration::from_millis(20));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("k2").is_ok());
        assert_eq!(cache.stats().expirations, 1);
        cache.assert_invariants();
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = cache(100);

        cache.store("a", "1", None).unwrap();
        cache.store("b", "2", None).unwrap();

        assert!(cache.remove("a"));
        assert!(!cache.remove("a"));
        assert_eq!(cache.size_bytes(), 1);

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.size_bytes(), 0);
        assert!(cache.get("b").is_err());
    }

    #[test]
    fn test_stats() {
        let cache = cache(100);

        cache.store("key1", "value1", None).unwrap();
        cache.get("key1").unwrap();
        let _ = cache.get("nonexistent");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_bytes, 6);
    }

    #[test]
    fn test_close_without_reaper_is_noop() {
        let cache = cache(100);
        cache.close();
        cache.close();
        cache.store("a", "1", None).unwrap();
        assert!(cache.get("a").is_ok());
    }
}
