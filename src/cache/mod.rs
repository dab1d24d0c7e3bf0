//! Cache layer fronting the catalog read path.
//!
//! Reads and writes here are best-effort: a backend failure downgrades a
//! cached read to direct computation and must never surface to the user.

use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use crate::config::CacheConfig;

pub mod product_cache;

pub use product_cache::{ListingPurgeStrategy, ProductCacheService};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Cache operation failed: {0}")]
    OperationFailed(String),
    #[error("Pattern deletion not supported by this backend")]
    PatternUnsupported,
}

#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    async fn clear(&self) -> Result<(), CacheError>;

    /// Bulk-deletes every key sharing `prefix`. Backends that cannot
    /// enumerate their keys return `PatternUnsupported`; callers fall back
    /// to clearing a bounded enumeration of well-known keys.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let _ = prefix;
        Err(CacheError::PatternUnsupported)
    }

    /// Whether `delete_prefix` is implemented for this backend.
    fn supports_pattern_delete(&self) -> bool {
        false
    }
}

// In-memory cache implementation

#[derive(Debug, Clone)]
pub struct InMemoryCache {
    store: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            Instant::now() > expires_at
        } else {
            false
        }
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read_store(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.store
            .read()
            .map_err(|_| CacheError::OperationFailed("cache lock poisoned".to_string()))
    }

    fn write_store(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, CacheEntry>>, CacheError> {
        self.store
            .write()
            .map_err(|_| CacheError::OperationFailed("cache lock poisoned".to_string()))
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let expired = {
            let store = self.read_store()?;
            match store.get(key) {
                Some(entry) if entry.is_expired() => true,
                Some(entry) => return Ok(Some(entry.value.clone())),
                None => return Ok(None),
            }
        };
        if expired {
            self.write_store()?.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.write_store()?
            .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.write_store()?.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.write_store()?.clear();
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut store = self.write_store()?;
        let before = store.len();
        store.retain(|key, _| !key.starts_with(prefix));
        Ok((before - store.len()) as u64)
    }

    fn supports_pattern_delete(&self) -> bool {
        true
    }
}

// Redis cache implementation

#[derive(Clone)]
pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        let result: Option<String> = conn.get(key).await?;
        Ok(result)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        match ttl {
            Some(ttl) => {
                let _: () = conn.set_ex(key, value, ttl.as_secs() as usize).await?;
            }
            None => {
                let _: () = conn.set(key, value).await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut conn = self.client.get_async_connection().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.client.get_async_connection().await?;

        let keys: Vec<String> = {
            let mut iter = conn.scan_match(format!("{}*", prefix)).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let count = keys.len() as u64;
        let _: () = conn.del(keys).await?;
        Ok(count)
    }

    fn supports_pattern_delete(&self) -> bool {
        true
    }
}

// Cache factory

pub struct CacheFactory;

impl CacheFactory {
    /// Builds the configured cache backend, falling back to in-memory when
    /// the redis client cannot be constructed.
    pub fn create_cache(config: &CacheConfig) -> Arc<dyn CacheBackend> {
        if config.cache_type.eq_ignore_ascii_case("redis") {
            match RedisCache::new(&config.redis_url) {
                Ok(cache) => return Arc::new(cache),
                Err(err) => {
                    warn!(
                        "Failed to initialize Redis cache (falling back to in-memory): {}",
                        err
                    );
                }
            }
        }

        Arc::new(InMemoryCache::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_roundtrip() {
        let cache = InMemoryCache::new();
        cache.set("k", "v", None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));

        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_ttl_expiry() {
        let cache = InMemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn in_memory_prefix_delete() {
        let cache = InMemoryCache::new();
        cache.set("products:filtered:a", "1", None).await.unwrap();
        cache.set("products:filtered:b", "2", None).await.unwrap();
        cache.set("product:7", "3", None).await.unwrap();

        let removed = cache.delete_prefix("products:filtered:").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(cache.get("product:7").await.unwrap(), Some("3".to_string()));
    }
}
