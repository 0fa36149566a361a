//! Key/value store seam.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tracing::warn;

use crate::error::CacheResult;

/// External byte store the cache layer reads from and writes to.
///
/// Implementations may be remote and may fail; callers bound every call
/// with a timeout and treat failures as misses or dropped writes.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Fetch a payload, or `None` if absent.
    async fn get(&self, key: &str, namespace: &str) -> CacheResult<Option<Bytes>>;

    /// Store a payload, replacing any previous value.
    async fn set(&self, key: &str, value: Bytes, namespace: &str) -> CacheResult<()>;
}

/// In-process LRU store keyed by `(namespace, key)`.
pub struct MemoryStore {
    entries: Mutex<LruCache<(String, String), Bytes>>,
}

impl MemoryStore {
    /// Create a store holding at most `capacity` entries.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn lock(&self, op: &'static str) -> MutexGuard<'_, LruCache<(String, String), Bytes>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(op, result = "poisoned_recovered", "recovered from poisoned store lock");
                poisoned.into_inner()
            }
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock("len").len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `(namespace, key)` is present, without touching recency.
    pub fn contains(&self, key: &str, namespace: &str) -> bool {
        self.lock("contains")
            .contains(&(namespace.to_string(), key.to_string()))
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock("clear").clear();
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get(&self, key: &str, namespace: &str) -> CacheResult<Option<Bytes>> {
        Ok(self
            .lock("get")
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(&self, key: &str, value: Bytes, namespace: &str) -> CacheResult<()> {
        self.lock("set")
            .put((namespace.to_string(), key.to_string()), value);
        Ok(())
    }
}
