//! Bounded, insertion-ordered caches for resolved dispatch outcomes.
//!
//! Two independent instances live on every [`Dispatcher`](crate::dispatcher::Dispatcher):
//! the resolution cache (`method ⧺ raw path` → ready-to-run pipeline) and the
//! convention cache (normalized path → controller/action). Both evict the
//! oldest *inserted* key when full; reads never change eviction order.
//!
//! ## Concurrency
//!
//! Entries are fully built before `put`, and `put` holds the write lock for the
//! whole evict-then-insert step, so readers see either the old entry or the new
//! one. When two requests race to populate the same key, the last writer wins.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};

use lru::LruCache;
use tracing::debug;

use crate::convention::ConventionTarget;
use crate::pipeline::CacheEntry;

/// Default capacity for both dispatch caches.
pub const DEFAULT_CAPACITY: usize = 1024;

pub type ResolutionCache = BoundedCache<String, Arc<CacheEntry>>;
pub type ConventionCache = BoundedCache<String, Arc<ConventionTarget>>;

/// Fixed-capacity map with first-in-first-out eviction.
///
/// Backed by [`LruCache`], read exclusively through `peek` so recency is only
/// ever updated by insertion.
pub struct BoundedCache<K: Hash + Eq, V: Clone> {
    inner: RwLock<LruCache<K, V>>,
    capacity: NonZeroUsize,
}

impl<K: Hash + Eq, V: Clone> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(LruCache::new(capacity)),
            capacity,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let guard = match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.peek(key).cloned()
    }

    /// Insert or replace `key`. Returns `true` when an older key was evicted.
    pub fn put(&self, key: K, value: V) -> bool {
        let mut guard = match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let replacing = guard.contains(&key);
        let evicted = guard.push(key, value);
        let evicted = !replacing && evicted.is_some();
        if evicted {
            debug!(capacity = self.capacity.get(), "Evicted oldest cache entry");
        }
        evicted
    }

    pub fn contains(&self, key: &K) -> bool {
        match self.inner.read() {
            Ok(g) => g.contains(key),
            Err(poisoned) => poisoned.into_inner().contains(key),
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut g) => g.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}
