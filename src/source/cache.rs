//! Preview byte store

use crate::error::{Error, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

struct StoreInner {
    lru: LruCache<String, Vec<u8>>,
    total_bytes: usize,
}

/// Filled-PDF bytes backing live preview handles, bounded by entry count and byte budget
pub struct PreviewStore {
    inner: Mutex<StoreInner>,
    max_bytes: usize,
}

impl PreviewStore {
    /// Create a store with the specified entry capacity and byte budget
    pub fn new(capacity: usize, max_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(StoreInner {
                lru: LruCache::new(capacity),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store bytes under `key`.
    /// Entries larger than the whole budget are rejected.
    /// Evicts LRU entries until the byte budget is satisfied.
    pub fn put(&self, key: String, data: Vec<u8>) -> Result<()> {
        let new_size = data.len();

        if new_size > self.max_bytes {
            return Err(Error::PreviewTooLarge {
                size: new_size as u64,
                max_size: self.max_bytes as u64,
            });
        }

        let mut inner = self.inner.lock();

        if let Some(old) = inner.lru.pop(&key) {
            inner.total_bytes = inner.total_bytes.saturating_sub(old.len());
        }

        while inner.total_bytes + new_size > self.max_bytes {
            if let Some((evicted_key, evicted_val)) = inner.lru.pop_lru() {
                tracing::debug!(key = %evicted_key, "Evicted preview");
                inner.total_bytes = inner.total_bytes.saturating_sub(evicted_val.len());
            } else {
                break;
            }
        }

        // Count-based eviction happens inside the LRU
        if let Some((_, evicted_val)) = inner.lru.push(key, data) {
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted_val.len());
        }
        inner.total_bytes += new_size;
        Ok(())
    }

    /// Store bytes under a fresh key and return the key
    pub fn insert(&self, data: Vec<u8>) -> Result<String> {
        let key = self.generate_unique_key();
        self.put(key.clone(), data)?;
        Ok(key)
    }

    /// Get a copy of the bytes stored under `key`
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().lru.contains(key)
    }

    /// Remove an entry, returning its bytes
    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock();
        let val = inner.lru.pop(key)?;
        inner.total_bytes = inner.total_bytes.saturating_sub(val.len());
        Some(val)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    /// Total bytes currently stored
    pub fn total_bytes(&self) -> usize {
        self.inner.lock().total_bytes
    }

    /// Keys and sizes, most recently used first
    pub fn entries(&self) -> Vec<(String, usize)> {
        self.inner
            .lock()
            .lru
            .iter()
            .map(|(key, data)| (key.clone(), data.len()))
            .collect()
    }

    /// Generate a key that does not collide with a stored one
    fn generate_unique_key(&self) -> String {
        let inner = self.inner.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !inner.lru.contains(&key) {
                return key;
            }
        }
    }
}
