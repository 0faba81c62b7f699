//! Cache storage implementations.
//!
//! `CacheStore` is the key/value contract with per-key expiration. `MemoryCacheStore`
//! keeps entries in process with LRU eviction; `ResilientCache` turns backend failures
//! into misses and no-ops so read and write paths never fail because of the cache.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::util::lock::{rw_read, rw_write};

use super::config::CacheConfig;
use super::keys::CacheKey;

const SOURCE: &str = "cache::store";

pub(crate) const METRIC_CACHE_HIT: &str = "pulsefeed_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "pulsefeed_cache_miss_total";
pub(crate) const METRIC_CACHE_ERROR: &str = "pulsefeed_cache_error_total";
pub(crate) const METRIC_CACHE_INVALIDATE: &str = "pulsefeed_cache_invalidate_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Key/value store with per-key expiration.
///
/// Expired or absent keys are misses, never errors. `put` overwrites unconditionally.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError>;

    async fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Clone)]
struct CacheEntry {
    value: Bytes,
    expires_at: Instant,
}

/// In-process cache with LRU eviction and lazy TTL expiry.
pub struct MemoryCacheStore {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.capacity)),
        }
    }

    /// Number of stored entries, including ones that expired but were not yet touched.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        let storage_key = key.to_string();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        let expired = match entries.get(&storage_key) {
            None => return Ok(None),
            Some(entry) if entry.expires_at > Instant::now() => {
                return Ok(Some(entry.value.clone()));
            }
            Some(_) => true,
        };

        if expired {
            entries.pop(&storage_key);
        }
        Ok(None)
    }

    async fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let storage_key = key.to_string();
        let mut entries = rw_write(&self.entries, SOURCE, "put");

        if ttl.is_zero() {
            entries.pop(&storage_key);
            return Ok(());
        }

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        if let Some((evicted, _)) = entries.push(storage_key.clone(), entry)
            && evicted != storage_key
        {
            debug!(evicted_key = %evicted, "Cache entry evicted due to capacity");
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "delete").pop(&key.to_string());
        Ok(())
    }
}

/// Store used when caching is disabled: every read misses, writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheStore;

#[async_trait]
impl CacheStore for NoopCacheStore {
    async fn get(&self, _key: &CacheKey) -> Result<Option<Bytes>, CacheError> {
        Ok(None)
    }

    async fn put(&self, _key: &CacheKey, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &CacheKey) -> Result<(), CacheError> {
        Ok(())
    }
}

// ============================================================================
// Pass-through wrapper
// ============================================================================

/// Cache handle that degrades backend failures to misses and no-ops.
#[derive(Clone)]
pub struct ResilientCache {
    inner: Arc<dyn CacheStore>,
}

impl ResilientCache {
    pub fn new(inner: Arc<dyn CacheStore>) -> Self {
        Self { inner }
    }

    /// Build the store selected by configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        if config.enabled {
            Self::new(Arc::new(MemoryCacheStore::new(config)))
        } else {
            Self::new(Arc::new(NoopCacheStore))
        }
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        match self.inner.get(key).await {
            Ok(Some(value)) => {
                counter!(METRIC_CACHE_HIT, "category" => key.category()).increment(1);
                Some(value)
            }
            Ok(None) => {
                counter!(METRIC_CACHE_MISS, "category" => key.category()).increment(1);
                None
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "op" => "get").increment(1);
                warn!(cache_key = %key, error = %err, "Cache read failed; treating as miss");
                None
            }
        }
    }

    pub async fn put(&self, key: &CacheKey, value: Bytes, ttl: Duration) {
        if let Err(err) = self.inner.put(key, value, ttl).await {
            counter!(METRIC_CACHE_ERROR, "op" => "put").increment(1);
            warn!(cache_key = %key, error = %err, "Cache write failed; skipping");
        }
    }

    /// Remove a key. Returns false when the backend could not be reached.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        match self.inner.delete(key).await {
            Ok(()) => {
                counter!(METRIC_CACHE_INVALIDATE, "category" => key.category()).increment(1);
                true
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR, "op" => "delete").increment(1);
                warn!(cache_key = %key, error = %err, "Cache invalidation failed; entry expires by TTL");
                false
            }
        }
    }
}
