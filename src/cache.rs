//! Per-function memoization of successful results.
//!
//! A [`ResultCache`] maps a [`CallKey`] to the value a wrapped operation
//! produced for it. Each wrapped function owns its own cache; nothing is
//! shared between distinct functions and nothing is global.
//!
//! Entries move `Absent -> Computing -> Present` exactly once. There is no
//! eviction, TTL or refresh: once present, a key is served from memory for the
//! lifetime of the cache. Only wrap read-only, side-effect-free operations.
//!
//! ```rust
//! use querywell::{Args, ResultCache};
//!
//! let cache = ResultCache::new();
//! let key = Args::query("SELECT 1").key().unwrap();
//!
//! let first: Result<_, ()> = cache.get_or_try_insert_with(&key, || Ok(vec![1]));
//! let second: Result<_, ()> = cache.get_or_try_insert_with(&key, || unreachable!());
//! assert_eq!(first, second);
//! assert_eq!(cache.stats().hits, 1);
//! ```
//!
//! # Concurrency
//!
//! The check-then-populate sequence runs under a per-key lock. Concurrent
//! misses on the same key compute once; the others wait and then read the
//! stored value. Different keys never contend beyond the short map lookup.
//! The compute closure must not call back into the same cache with the same
//! key, which would deadlock.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::key::CallKey;

type Slot<V> = Arc<Mutex<Option<V>>>;

/// Memoized results for one wrapped function.
pub struct ResultCache<V> {
    slots: Mutex<HashMap<CallKey, Slot<V>>>,
    stored: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Lookup counters of a [`ResultCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups served from a stored value.
    pub hits: u64,
    /// Lookups that ran the compute closure (successful or not).
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of lookups that were hits, or `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl<V> ResultCache<V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        ResultCache {
            slots: Mutex::new(HashMap::new()),
            stored: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return the stored value for `key`, or run `compute` and store its
    /// success.
    ///
    /// A failed computation stores nothing; the key stays absent and the next
    /// call computes again.
    pub fn get_or_try_insert_with<E, F>(&self, key: &CallKey, compute: F) -> Result<V, E>
    where
        V: Clone,
        F: FnOnce() -> Result<V, E>,
    {
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut entry = lock(&slot);
        if let Some(value) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "served from cache");
            return Ok(value.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key = %key, "cache miss");
        match compute() {
            Ok(value) => {
                *entry = Some(value.clone());
                self.stored.fetch_add(1, Ordering::Release);
                Ok(value)
            }
            Err(e) => {
                drop(entry);
                drop(slot);
                self.discard_empty(key);
                Err(e)
            }
        }
    }

    /// The stored value for `key`, if present.
    ///
    /// Waits for an in-flight computation of the same key to finish.
    pub fn get(&self, key: &CallKey) -> Option<V>
    where
        V: Clone,
    {
        let slot = lock(&self.slots).get(key).cloned()?;
        let entry = lock(&slot);
        entry.clone()
    }

    /// True once a successful result for `key` has been stored.
    ///
    /// Waits for an in-flight computation of the same key to finish.
    pub fn contains(&self, key: &CallKey) -> bool {
        let Some(slot) = lock(&self.slots).get(key).cloned() else {
            return false;
        };
        let present = lock(&slot).is_some();
        present
    }

    /// Number of stored results.
    ///
    /// Never waits on in-flight computations; a key still being computed is
    /// not counted.
    pub fn len(&self) -> usize {
        self.stored.load(Ordering::Acquire)
    }

    /// True when no result is stored. Never waits, like [`len`](Self::len).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // Drop the slot for `key` if it is still empty and nobody else holds it.
    fn discard_empty(&self, key: &CallKey) {
        let mut slots = lock(&self.slots);
        let removable = slots
            .get(key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1 && lock(slot).is_none());
        if removable {
            slots.remove(key);
        }
    }
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ResultCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

// A panic inside a compute closure poisons only its own slot, which still
// holds `None`; recovering the guard is sound.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
