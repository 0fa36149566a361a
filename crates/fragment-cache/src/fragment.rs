//! Store client that never fails the caller.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fragment_core::CacheKey;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::FragmentCacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::stats::CacheStats;
use crate::store::KeyStore;

/// Outcome of a cache interception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Served from the store.
    Hit,
    /// Not in the store (or unusable); produced normally.
    Miss,
    /// Not registered, disabled, or key derivation failed.
    Bypass,
}

impl fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Bypass => write!(f, "BYPASS"),
        }
    }
}

/// Timeout-bounded wrapper around a [`KeyStore`].
///
/// Read failures come back as `None` and write failures as `false`; both
/// are logged and counted but never returned as errors.
#[derive(Clone)]
pub struct FragmentCache {
    store: Arc<dyn KeyStore>,
    timeout: Duration,
    stats: Arc<CacheStats>,
}

impl FragmentCache {
    /// Create a client for `store` using the configured timeout.
    pub fn new(store: Arc<dyn KeyStore>, config: &FragmentCacheConfig) -> Self {
        Self {
            store,
            timeout: config.store_timeout(),
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Share counters with another client.
    pub fn with_stats(mut self, stats: Arc<CacheStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Outcome counters.
    pub fn stats(&self) -> &Arc<CacheStats> {
        &self.stats
    }

    async fn bounded<T>(&self, fut: impl Future<Output = CacheResult<T>>) -> CacheResult<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout(self.timeout.as_millis() as u64)),
        }
    }

    /// Fetch a non-empty payload. Empty payloads and store failures are `None`.
    pub async fn get(&self, key: &CacheKey, namespace: &str) -> Option<Bytes> {
        match self.bounded(self.store.get(key.as_str(), namespace)).await {
            Ok(Some(bytes)) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(err) => {
                self.stats.record_store_error();
                warn!(key = %key, namespace, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store a payload. Returns whether the write went through.
    pub async fn set(&self, key: &CacheKey, value: Bytes, namespace: &str) -> bool {
        let len = value.len();
        match self.bounded(self.store.set(key.as_str(), value, namespace)).await {
            Ok(()) => {
                self.stats.record_write();
                debug!(key = %key, namespace, bytes = len, "stored fragment");
                true
            }
            Err(err) => {
                self.stats.record_store_error();
                warn!(key = %key, namespace, error = %err, "cache write failed, dropping");
                false
            }
        }
    }

    /// Whether any value (even empty) exists for `key`.
    pub async fn exists(&self, key: &CacheKey, namespace: &str) -> bool {
        match self.bounded(self.store.get(key.as_str(), namespace)).await {
            Ok(value) => value.is_some(),
            Err(err) => {
                self.stats.record_store_error();
                warn!(key = %key, namespace, error = %err, "cache presence check failed");
                false
            }
        }
    }
}
