//! Bounded memoizing cache storage.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use metrics::counter;
use serde::Serialize;
use tracing::debug;

use super::flight::{InFlight, Role};
use crate::lock::mutex_lock;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "memopool_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "memopool_cache_miss_total";
pub(crate) const METRIC_CACHE_EVICT: &str = "memopool_cache_evict_total";

/// Point-in-time counters for one [`MemoCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, `0.0` before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Key → value memoization with a fixed capacity and strict LRU eviction.
///
/// One mutex guards the entry table and its recency order together. The lock
/// is held only while the table is read or updated; `compute` always runs
/// with the lock released, so a slow miss never blocks hits on other keys.
///
/// Without single flight, two threads missing the same key concurrently both
/// run their computation and the later insert refreshes the earlier one.
/// With single flight, the first miss computes and the others wait for it
/// and then read its stored value.
pub struct MemoCache<K, V> {
    name: &'static str,
    capacity: NonZeroUsize,
    entries: Mutex<LruCache<K, V>>,
    inflight: Option<InFlight<K>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create a cache that may redundantly compute under concurrent misses.
    pub fn new(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self::build(name, capacity, None)
    }

    /// Create a cache that coalesces concurrent misses on the same key.
    ///
    /// `compute` must not call back into this cache for the key it is
    /// computing; that call would wait on its own flight forever.
    pub fn single_flight(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self::build(name, capacity, Some(InFlight::new()))
    }

    fn build(name: &'static str, capacity: NonZeroUsize, inflight: Option<InFlight<K>>) -> Self {
        Self {
            name,
            capacity,
            entries: Mutex::new(LruCache::new(capacity)),
            inflight,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the memoized value for `key`, computing and storing it on a miss.
    ///
    /// A failed computation is returned to the caller unchanged and leaves the
    /// cache exactly as it was, apart from the miss counter.
    pub fn get_or_compute<F, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        let Some(inflight) = &self.inflight else {
            if let Some(value) = self.lookup(&key) {
                return Ok(value);
            }
            return self.compute_and_store(key, compute);
        };

        loop {
            if let Some(value) = self.lookup(&key) {
                return Ok(value);
            }
            match inflight.join(&key) {
                Role::Leader(_guard) => {
                    // Another leader may have landed between the lookup and the join.
                    if let Some(value) = self.lookup(&key) {
                        return Ok(value);
                    }
                    return self.compute_and_store(key, compute);
                }
                Role::Follower(flight) => flight.wait(),
            }
        }
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let value = mutex_lock(&self.entries, SOURCE, "lookup")
            .get(key)
            .cloned()?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_HIT, "cache" => self.name).increment(1);
        debug!(cache = self.name, "Cache hit");
        Some(value)
    }

    fn compute_and_store<F, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_CACHE_MISS, "cache" => self.name).increment(1);

        let value = compute()?;

        let displaced =
            mutex_lock(&self.entries, SOURCE, "insert").push(key.clone(), value.clone());
        if let Some((displaced_key, _)) = displaced
            && displaced_key != key
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            counter!(METRIC_CACHE_EVICT, "cache" => self.name).increment(1);
            debug!(cache = self.name, "Evicted least recently used entry");
        }

        Ok(value)
    }

    /// Remove every entry. Hit, miss and eviction counters are kept.
    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }

    /// Whether `key` is currently stored. Does not refresh its recency.
    pub fn contains(&self, key: &K) -> bool {
        mutex_lock(&self.entries, SOURCE, "contains").contains(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
            capacity: self.capacity.get(),
        }
    }

    /// Get the number of stored entries.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> NonZeroUsize {
        self.capacity
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).expect("non-zero capacity")
    }

    fn times_ten(key: u32, calls: &AtomicUsize) -> Result<u32, String> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(key * 10)
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = MemoCache::new("test", capacity(4));
        let calls = AtomicUsize::new(0);

        assert_eq!(cache.get_or_compute(5, || times_ten(5, &calls)), Ok(50));
        assert_eq!(cache.get_or_compute(5, || times_ten(5, &calls)), Ok(50));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn refreshed_key_survives_overflow() {
        let cache = MemoCache::new("test", capacity(2));
        let calls = AtomicUsize::new(0);

        for key in [1, 2, 1, 3, 2] {
            cache
                .get_or_compute(key, || times_ten(key, &calls))
                .expect("compute succeeds");
        }

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 4);
        assert_eq!(stats.evictions, 2);
        assert_eq!(stats.len, 2);
        assert!(cache.contains(&2));
        assert!(cache.contains(&3));
        assert!(!cache.contains(&1));
    }

    #[test]
    fn failed_compute_is_not_stored() {
        let cache: MemoCache<u32, u32> = MemoCache::new("test", capacity(2));
        cache.get_or_compute(1, || Ok::<_, String>(10)).expect("ok");

        let err = cache
            .get_or_compute(2, || Err("backend down".to_string()))
            .expect_err("error propagates");
        assert_eq!(err, "backend down");

        assert!(!cache.contains(&2));
        assert!(cache.contains(&1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn clear_keeps_counters_and_is_idempotent() {
        let cache = MemoCache::new("test", capacity(2));
        cache.get_or_compute(1, || Ok::<_, String>(10)).expect("ok");
        cache.get_or_compute(1, || Ok::<_, String>(10)).expect("ok");

        cache.clear();
        let after_first = cache.stats();
        cache.clear();
        let after_second = cache.stats();

        assert!(cache.is_empty());
        assert_eq!(after_first, after_second);
        assert_eq!((after_second.hits, after_second.misses), (1, 1));
    }

    #[test]
    fn hit_ratio_handles_empty_cache() {
        let cache: MemoCache<u32, u32> = MemoCache::new("test", capacity(1));
        assert_eq!(cache.stats().hit_ratio(), 0.0);

        cache.get_or_compute(1, || Ok::<_, String>(1)).expect("ok");
        cache.get_or_compute(1, || Ok::<_, String>(1)).expect("ok");
        assert!((cache.stats().hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn single_flight_compute_may_look_up_other_keys() {
        let cache: MemoCache<u32, u32> = MemoCache::single_flight("nested", capacity(4));

        let value: Result<u32, String> = cache.get_or_compute(2, || {
            let base = cache.get_or_compute(1, || Ok::<_, String>(10))?;
            Ok(base * 2)
        });

        assert_eq!(value, Ok(20));
        assert!(cache.contains(&1));
        assert!(cache.contains(&2));
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn single_flight_computes_once_under_contention() {
        let cache = Arc::new(MemoCache::single_flight("test", capacity(8)));
        let calls = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                thread::spawn(move || {
                    cache.get_or_compute(42u32, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok::<_, String>(420u32)
                    })
                })
            })
            .collect();

        for worker in workers {
            assert_eq!(worker.join().expect("worker joins"), Ok(420));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 7);
    }

    #[test]
    fn single_flight_follower_retries_after_leader_failure() {
        let cache: MemoCache<u32, u32> = MemoCache::single_flight("test", capacity(2));

        assert!(cache.get_or_compute(1, || Err::<u32, _>("nope")).is_err());
        assert_eq!(cache.get_or_compute(1, || Ok::<_, &str>(10)), Ok(10));
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn cache_recovers_from_poisoned_lock() {
        let cache: MemoCache<u32, u32> = MemoCache::new("test", capacity(2));

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .entries
                .lock()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.get_or_compute(1, || Ok::<_, String>(10)).expect("ok");
        assert!(cache.contains(&1));
    }
}
