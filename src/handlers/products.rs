use crate::handlers::common::{map_service_error, success_response, validate_input, CurrentUser};
use crate::{
    errors::ApiError,
    services::catalog::ProductFilter,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

/// Creates the router for catalog endpoints
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/stock", put(set_stock))
}

/// Product listing page: products under the active filter plus everything
/// the page renders around them.
async fn list_products(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<ProductListQuery>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let filter = ProductFilter::from_raw(
        params.search,
        params.category,
        params.min_price,
        params.max_price,
        params.sort_by,
        params.sort_order,
        params.page,
    )
    .map_err(map_service_error)?;

    let page = state
        .services
        .catalog
        .list_products(&filter)
        .await
        .map_err(map_service_error)?;

    let categories = state
        .services
        .catalog
        .list_categories()
        .await
        .map_err(map_service_error)?;

    let cart_count = state
        .services
        .cart
        .item_count(user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "products": page.products,
        "pagination": page.pagination,
        "filters": ActiveFilters::from(&filter),
        "categories": categories,
        "cart_count": cart_count,
    })))
}

/// Single product page
async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let product = state
        .services
        .catalog
        .get_product(id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

/// Direct stock edit
async fn set_stock(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<SetStockRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let product = state
        .services
        .catalog
        .set_stock(id, payload.stock_quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(product))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct ProductListQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub page: Option<u64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SetStockRequest {
    #[validate(range(min = 0))]
    pub stock_quantity: i32,
}

/// The filters echoed back to the page, normalized.
#[derive(Debug, Serialize)]
struct ActiveFilters {
    search: Option<String>,
    category: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
    sort_by: &'static str,
    sort_order: &'static str,
}

impl From<&ProductFilter> for ActiveFilters {
    fn from(filter: &ProductFilter) -> Self {
        Self {
            search: filter.search.clone(),
            category: filter.category.clone(),
            min_price: filter.min_price.map(|d| d.to_string()),
            max_price: filter.max_price.map(|d| d.to_string()),
            sort_by: filter.sort_by.as_str(),
            sort_order: filter.sort_order.as_str(),
        }
    }
}
