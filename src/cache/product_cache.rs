use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CacheBackend, CacheError};
use crate::config::CacheConfig;

/// Placeholder for an unset filter field, so that "no filter" and an empty
/// string collide to the same key.
const UNSET: &str = "none";

const LISTING_PREFIX: &str = "products:filtered:";
const CATEGORIES_KEY: &str = "categories:all";

/// Sort combinations cleared by the enumeration fallback.
const SORT_FIELDS: [&str; 3] = ["name", "price", "created_at"];
const SORT_ORDERS: [&str; 2] = ["asc", "desc"];

/// How the unbounded filtered-listing key space gets purged.
///
/// The filtered key space is unbounded (arbitrary search strings), so exact
/// enumeration is infeasible. Backends that can delete by pattern purge it
/// wholesale; the rest clear a bounded enumeration of the common unfiltered
/// listing keys and let rare filtered entries age out on TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingPurgeStrategy {
    Pattern,
    Enumerate,
}

/// Maps product mutations to the cache keys they invalidate, and carries the
/// key-naming scheme shared with the catalog read path.
#[derive(Clone)]
pub struct ProductCacheService {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    purge_pages: u64,
    strategy: ListingPurgeStrategy,
}

impl ProductCacheService {
    /// Builds the service, selecting the purge strategy from the backend's
    /// capability.
    pub fn new(backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        let strategy = if backend.supports_pattern_delete() {
            ListingPurgeStrategy::Pattern
        } else {
            ListingPurgeStrategy::Enumerate
        };
        Self::with_strategy(backend, config, strategy)
    }

    pub fn with_strategy(
        backend: Arc<dyn CacheBackend>,
        config: &CacheConfig,
        strategy: ListingPurgeStrategy,
    ) -> Self {
        Self {
            backend,
            ttl: Duration::from_secs(config.default_ttl_secs),
            purge_pages: config.listing_purge_pages,
            strategy,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn strategy(&self) -> ListingPurgeStrategy {
        self.strategy
    }

    /// Key for one page of a filtered product listing. Field order is
    /// canonical and stable across restarts.
    pub fn listing_key(
        search: Option<&str>,
        category: Option<&str>,
        min_price: Option<&str>,
        max_price: Option<&str>,
        sort_by: &str,
        sort_order: &str,
        page: u64,
    ) -> String {
        format!(
            "{}{}:{}:{}:{}:{}:{}:{}",
            LISTING_PREFIX,
            search.filter(|s| !s.is_empty()).unwrap_or(UNSET),
            category.filter(|s| !s.is_empty()).unwrap_or(UNSET),
            min_price.filter(|s| !s.is_empty()).unwrap_or(UNSET),
            max_price.filter(|s| !s.is_empty()).unwrap_or(UNSET),
            sort_by,
            sort_order,
            page
        )
    }

    pub fn product_key(product_id: i64) -> String {
        format!("product:{}", product_id)
    }

    pub fn categories_key() -> &'static str {
        CATEGORIES_KEY
    }

    /// Best-effort cached read. Backend failures are logged and read as a
    /// miss; a cache outage must never fail the request.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Best-effort cached write with the configured TTL.
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Failed to serialize cache entry {}: {}", key, e);
                return;
            }
        };
        if let Err(e) = self.backend.set(key, &raw, Some(self.ttl)).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }

    /// Clears every cache entry affected by a stock-affecting or lifecycle
    /// mutation of the given product: its single-product entry, the
    /// categories listing, and all filtered listings.
    pub async fn invalidate_product(&self, product_id: i64) {
        if let Err(e) = self.backend.delete(&Self::product_key(product_id)).await {
            warn!("Cache invalidation failed for product {}: {}", product_id, e);
        }
        if let Err(e) = self.backend.delete(CATEGORIES_KEY).await {
            warn!("Cache invalidation failed for categories: {}", e);
        }
        self.purge_listing_caches().await;
    }

    async fn purge_listing_caches(&self) {
        match self.strategy {
            ListingPurgeStrategy::Pattern => match self.backend.delete_prefix(LISTING_PREFIX).await
            {
                Ok(count) => debug!("Purged {} listing cache entries", count),
                Err(CacheError::PatternUnsupported) => self.purge_common_listing_keys().await,
                Err(e) => {
                    warn!("Pattern purge failed, falling back to enumeration: {}", e);
                    self.purge_common_listing_keys().await;
                }
            },
            ListingPurgeStrategy::Enumerate => self.purge_common_listing_keys().await,
        }
    }

    /// Fallback when pattern deletion is unavailable: clear the unfiltered
    /// listings for every sort combination over the first N pages. Filtered
    /// entries left behind go stale at most until their TTL.
    async fn purge_common_listing_keys(&self) {
        for sort_by in SORT_FIELDS {
            for sort_order in SORT_ORDERS {
                for page in 1..=self.purge_pages {
                    let key =
                        Self::listing_key(None, None, None, None, sort_by, sort_order, page);
                    if let Err(e) = self.backend.delete(&key).await {
                        warn!("Cache invalidation failed for {}: {}", key, e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;

    fn service_with(strategy: ListingPurgeStrategy) -> (Arc<InMemoryCache>, ProductCacheService) {
        let backend = Arc::new(InMemoryCache::new());
        let svc = ProductCacheService::with_strategy(
            backend.clone(),
            &CacheConfig::default(),
            strategy,
        );
        (backend, svc)
    }

    #[test]
    fn listing_key_is_canonical() {
        let key = ProductCacheService::listing_key(
            Some("laptop"),
            Some("electronics"),
            Some("10.00"),
            Some("100.00"),
            "price",
            "asc",
            2,
        );
        assert_eq!(
            key,
            "products:filtered:laptop:electronics:10.00:100.00:price:asc:2"
        );
    }

    #[test]
    fn unset_and_empty_filters_collide() {
        let unset = ProductCacheService::listing_key(None, None, None, None, "name", "asc", 1);
        let empty =
            ProductCacheService::listing_key(Some(""), Some(""), Some(""), Some(""), "name", "asc", 1);
        assert_eq!(unset, empty);
        assert_eq!(unset, "products:filtered:none:none:none:none:name:asc:1");
    }

    #[tokio::test]
    async fn pattern_purge_clears_arbitrary_filtered_keys() {
        let (backend, svc) = service_with(ListingPurgeStrategy::Pattern);

        let filtered =
            ProductCacheService::listing_key(Some("rare"), None, None, None, "price", "desc", 7);
        backend.set(&filtered, "x", None).await.unwrap();
        backend
            .set(&ProductCacheService::product_key(3), "y", None)
            .await
            .unwrap();
        backend
            .set(ProductCacheService::categories_key(), "z", None)
            .await
            .unwrap();

        svc.invalidate_product(3).await;

        assert_eq!(backend.get(&filtered).await.unwrap(), None);
        assert_eq!(
            backend.get(&ProductCacheService::product_key(3)).await.unwrap(),
            None
        );
        assert_eq!(
            backend
                .get(ProductCacheService::categories_key())
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn enumeration_purge_clears_common_keys_only() {
        let (backend, svc) = service_with(ListingPurgeStrategy::Enumerate);

        let common = ProductCacheService::listing_key(None, None, None, None, "name", "asc", 1);
        let filtered =
            ProductCacheService::listing_key(Some("rare"), None, None, None, "name", "asc", 1);
        backend.set(&common, "x", None).await.unwrap();
        backend.set(&filtered, "y", None).await.unwrap();

        svc.invalidate_product(1).await;

        assert_eq!(backend.get(&common).await.unwrap(), None);
        // Filtered entry survives until TTL under the bounded fallback.
        assert_eq!(backend.get(&filtered).await.unwrap(), Some("y".to_string()));
    }
}
