use crate::{
    cache::ProductCacheService,
    entities::{category, product, Category, CategoryModel, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, Order,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Catalog read path: filtered, sorted, paginated product listings fronted
/// by the cache layer. Reads are idempotent and side-effect-free; a cache
/// outage downgrades to direct computation.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    cache: Arc<ProductCacheService>,
    event_sender: Arc<EventSender>,
    page_size: u64,
}

impl CatalogService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cache: Arc<ProductCacheService>,
        event_sender: Arc<EventSender>,
        page_size: u64,
    ) -> Self {
        Self {
            db,
            cache,
            event_sender,
            page_size,
        }
    }

    /// One page of the catalog under the given filter, cached by the exact
    /// filter/sort/page tuple.
    #[instrument(skip(self))]
    pub async fn list_products(&self, filter: &ProductFilter) -> Result<ProductPage, ServiceError> {
        let cache_key = filter.cache_key();

        if let Some(page) = self.cache.get_json::<ProductPage>(&cache_key).await {
            return Ok(page);
        }

        let mut query = Product::find()
            .find_also_related(Category)
            .filter(filter.condition());

        query = match filter.sort_by {
            SortField::Name => query.order_by(product::Column::Name, filter.sort_order.into()),
            SortField::Price => query.order_by(product::Column::Price, filter.sort_order.into()),
            SortField::CreatedAt => {
                query.order_by(product::Column::CreatedAt, filter.sort_order.into())
            }
        };

        let paginator = query.paginate(&*self.db, self.page_size);
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(filter.page.saturating_sub(1)).await?;

        let page = ProductPage {
            products: rows
                .into_iter()
                .map(|(product, category)| ProductWithCategory { product, category })
                .collect(),
            pagination: PageMeta::new(filter.page, self.page_size, total),
        };

        self.cache.put_json(&cache_key, &page).await;
        Ok(page)
    }

    /// One product with its category, cached by id.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: i64) -> Result<ProductWithCategory, ServiceError> {
        let cache_key = ProductCacheService::product_key(product_id);

        if let Some(hit) = self.cache.get_json::<ProductWithCategory>(&cache_key).await {
            return Ok(hit);
        }

        let (product, category) = Product::find_by_id(product_id)
            .find_also_related(Category)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let result = ProductWithCategory { product, category };
        self.cache.put_json(&cache_key, &result).await;
        Ok(result)
    }

    /// All categories, name-ordered, cached.
    #[instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        let cache_key = ProductCacheService::categories_key();

        if let Some(hit) = self.cache.get_json::<Vec<CategoryModel>>(cache_key).await {
            return Ok(hit);
        }

        let categories = Category::find()
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;

        self.cache.put_json(cache_key, &categories).await;
        Ok(categories)
    }

    /// Sets a product's stock level directly (admin path). Cache entries are
    /// invalidated only when the stock value actually changed, so cosmetic
    /// no-op writes cause no invalidation storm.
    #[instrument(skip(self))]
    pub async fn set_stock(
        &self,
        product_id: i64,
        quantity: i32,
    ) -> Result<ProductModel, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Stock quantity cannot be negative".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let old_quantity = product.stock_quantity;
        if old_quantity == quantity {
            return Ok(product);
        }

        let mut active: product::ActiveModel = product.into();
        active.stock_quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.cache.invalidate_product(product_id).await;
        self.event_sender
            .send_or_log(Event::ProductStockChanged {
                product_id,
                old_quantity,
                new_quantity: quantity,
            })
            .await;

        info!(
            "Stock for product {} set to {} (was {})",
            product_id, quantity, old_quantity
        );
        Ok(updated)
    }
}

/// Sort fields exposed by the catalog, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Name,
    Price,
    CreatedAt,
}

impl SortField {
    /// Parses an optional raw value; absent or empty defaults to creation
    /// time, anything outside the closed set is a validation error.
    pub fn parse(raw: Option<&str>) -> Result<Self, ServiceError> {
        match raw.filter(|s| !s.is_empty()) {
            None => Ok(SortField::CreatedAt),
            Some("name") => Ok(SortField::Name),
            Some("price") => Ok(SortField::Price),
            Some("created_at") => Ok(SortField::CreatedAt),
            Some(other) => Err(ServiceError::ValidationError(format!(
                "The sort field must be one of: name, price, or created_at (got {})",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Name => "name",
            SortField::Price => "price",
            SortField::CreatedAt => "created_at",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Result<Self, ServiceError> {
        match raw.filter(|s| !s.is_empty()) {
            None => Ok(SortOrder::Desc),
            Some("asc") => Ok(SortOrder::Asc),
            Some("desc") => Ok(SortOrder::Desc),
            Some(other) => Err(ServiceError::ValidationError(format!(
                "The sort order must be either asc or desc (got {})",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl From<SortOrder> for Order {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Asc => Order::Asc,
            SortOrder::Desc => Order::Desc,
        }
    }
}

/// The exact filter/sort/page tuple of a catalog query. Equivalent unset and
/// empty-string inputs normalize to the same value, so they share one cache
/// key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: u64,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            min_price: None,
            max_price: None,
            sort_by: SortField::CreatedAt,
            sort_order: SortOrder::Desc,
            page: 1,
        }
    }
}

impl ProductFilter {
    /// Builds a filter from raw request values, normalizing empties and
    /// rejecting malformed input before any store access.
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw(
        search: Option<String>,
        category: Option<String>,
        min_price: Option<String>,
        max_price: Option<String>,
        sort_by: Option<String>,
        sort_order: Option<String>,
        page: Option<u64>,
    ) -> Result<Self, ServiceError> {
        let min_price = Self::parse_price(min_price, "min_price")?;
        let max_price = Self::parse_price(max_price, "max_price")?;

        if let (Some(min), Some(max)) = (min_price, max_price) {
            if max < min {
                return Err(ServiceError::ValidationError(
                    "The maximum price must be greater than or equal to the minimum price"
                        .to_string(),
                ));
            }
        }

        Ok(Self {
            search: normalize(search),
            category: normalize(category),
            min_price,
            max_price,
            sort_by: SortField::parse(sort_by.as_deref())?,
            sort_order: SortOrder::parse(sort_order.as_deref())?,
            page: page.unwrap_or(1).max(1),
        })
    }

    fn parse_price(raw: Option<String>, field: &str) -> Result<Option<Decimal>, ServiceError> {
        match normalize(raw) {
            None => Ok(None),
            Some(s) => {
                let value = s.parse::<Decimal>().map_err(|_| {
                    ServiceError::ValidationError(format!("{} must be a decimal number", field))
                })?;
                if value < Decimal::ZERO {
                    return Err(ServiceError::ValidationError(format!(
                        "{} cannot be negative",
                        field
                    )));
                }
                Ok(Some(value))
            }
        }
    }

    /// The filter predicates as an AND of independent, skippable conditions.
    pub fn condition(&self) -> Condition {
        let mut cond = Condition::all();

        if let Some(search) = &self.search {
            cond = cond.add(product::Column::Name.contains(search.as_str()));
        }
        if let Some(slug) = &self.category {
            cond = cond.add(category::Column::Slug.eq(slug.clone()));
        }
        if let Some(min) = self.min_price {
            cond = cond.add(product::Column::Price.gte(min));
        }
        if let Some(max) = self.max_price {
            cond = cond.add(product::Column::Price.lte(max));
        }

        cond
    }

    /// Cache key for this exact tuple.
    pub fn cache_key(&self) -> String {
        ProductCacheService::listing_key(
            self.search.as_deref(),
            self.category.as_deref(),
            self.min_price.map(|d| d.to_string()).as_deref(),
            self.max_price.map(|d| d.to_string()).as_deref(),
            self.sort_by.as_str(),
            self.sort_order.as_str(),
            self.page,
        )
    }
}

fn normalize(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// A product resolved with its category for listing payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductWithCategory {
    pub product: ProductModel,
    pub category: Option<CategoryModel>,
}

/// One page of catalog results; the cached unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductPage {
    pub products: Vec<ProductWithCategory>,
    pub pagination: PageMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(page: u64, per_page: u64, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_are_created_at_descending() {
        let filter =
            ProductFilter::from_raw(None, None, None, None, None, None, None).unwrap();
        assert_eq!(filter.sort_by, SortField::CreatedAt);
        assert_eq!(filter.sort_order, SortOrder::Desc);
        assert_eq!(filter.page, 1);
    }

    #[test]
    fn empty_strings_normalize_to_unset() {
        let filter = ProductFilter::from_raw(
            Some("".to_string()),
            Some("  ".to_string()),
            Some("".to_string()),
            None,
            Some("".to_string()),
            None,
            None,
        )
        .unwrap();

        assert_eq!(filter, ProductFilter::default());
        assert_eq!(
            filter.cache_key(),
            "products:filtered:none:none:none:none:created_at:desc:1"
        );
    }

    #[test]
    fn rejects_unknown_sort_field() {
        let err = ProductFilter::from_raw(
            None,
            None,
            None,
            None,
            Some("stock".to_string()),
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn rejects_inverted_price_range() {
        let err = ProductFilter::from_raw(
            None,
            None,
            Some("50".to_string()),
            Some("10".to_string()),
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn rejects_malformed_price() {
        let err = ProductFilter::from_raw(
            None,
            None,
            Some("cheap".to_string()),
            None,
            None,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));
    }

    #[test]
    fn cache_key_carries_every_field() {
        let filter = ProductFilter::from_raw(
            Some("laptop".to_string()),
            Some("electronics".to_string()),
            Some("10.00".to_string()),
            Some("99.99".to_string()),
            Some("price".to_string()),
            Some("asc".to_string()),
            Some(3),
        )
        .unwrap();

        assert_eq!(
            filter.cache_key(),
            "products:filtered:laptop:electronics:10.00:99.99:price:asc:3"
        );
        assert_eq!(filter.min_price, Some(dec!(10.00)));
    }

    #[test]
    fn page_zero_clamps_to_one() {
        let filter =
            ProductFilter::from_raw(None, None, None, None, None, None, Some(0)).unwrap();
        assert_eq!(filter.page, 1);
    }

    #[test]
    fn page_meta_rounds_up() {
        let meta = PageMeta::new(1, 10, 21);
        assert_eq!(meta.total_pages, 3);

        let empty = PageMeta::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
