//! Bounded memoization keyed by content digest.
//!
//! Keys are SHA-1 digests of the input text, so key size stays fixed no
//! matter how large the memoized document is. Capacity is fixed at
//! construction; the least recently used entry is evicted on overflow.

use lru::LruCache;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

pub type ContentKey = [u8; 20];

pub const DEFAULT_CAPACITY: usize = 4096;

/// Digest of the exact input bytes.
pub fn content_key(text: &str) -> ContentKey {
    content_digest(text.as_bytes())
}

pub fn content_digest(bytes: &[u8]) -> ContentKey {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    let mut key = [0u8; 20];
    key.copy_from_slice(&hasher.finalize());
    key
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

pub struct BoundedCache<V> {
    inner: Mutex<LruCache<ContentKey, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> BoundedCache<V> {
    /// A capacity of zero is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &ContentKey) -> Option<V> {
        let found = self.inner.lock().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    pub fn insert(&self, key: ContentKey, value: V) {
        self.inner.lock().put(key, value);
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    /// `compute` runs without the lock held; two racing misses both compute
    /// and the later insert wins, which is harmless for pure computations.
    pub fn get_or_insert_with<F>(&self, key: ContentKey, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.get(&key) {
            return v;
        }
        let value = compute();
        self.insert(key, value.clone());
        value
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: inner.len(),
            capacity: inner.cap().get(),
        }
    }
}
