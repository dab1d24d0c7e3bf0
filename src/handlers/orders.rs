use crate::handlers::common::{map_service_error, success_response, CurrentUser, PaginationParams};
use crate::{errors::ApiError, services::catalog::PageMeta, AppState};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Router,
};
use std::sync::Arc;

const ORDERS_PER_PAGE: u64 = 10;

/// Creates the router for order endpoints
pub fn orders_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
}

/// The user's order history, newest first.
async fn list_orders(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<PaginationParams>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let (orders, total) = state
        .services
        .orders
        .get_user_orders(user_id, params.page, ORDERS_PER_PAGE)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "orders": orders,
        "pagination": PageMeta::new(params.page, ORDERS_PER_PAGE, total),
    })))
}

/// One of the user's orders, with line items.
async fn get_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(order_id): Path<i64>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let order = state
        .services
        .orders
        .get_order(user_id, order_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(order))
}
