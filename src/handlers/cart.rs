use crate::handlers::common::{
    map_service_error, no_content_response, success_response, validate_input, CurrentUser,
};
use crate::{errors::ApiError, services::cart::CartService, AppState};
use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn cart_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(index))
        .route("/items", post(add_item))
        .route("/items/:id", put(update_item))
        .route("/items/:id", delete(remove_item))
        .route("/checkout", post(checkout))
}

/// Cart page: lines with products, plus the running total.
async fn index(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let items = state
        .services
        .cart
        .list_items(user_id)
        .await
        .map_err(map_service_error)?;

    let total = CartService::cart_total(&items);

    Ok(success_response(serde_json::json!({
        "items": items,
        "total": total,
    })))
}

/// Add a product to the cart, or fold into the existing line.
async fn add_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<AddToCartRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let outcome = state
        .services
        .cart
        .add_to_cart(user_id, payload.product_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(outcome))
}

/// Set a cart line's quantity.
async fn update_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(item_id): Path<i64>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let item = state
        .services
        .cart
        .update_quantity(user_id, item_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "status": "success",
        "message": "Cart updated successfully",
        "item": item,
    })))
}

/// Remove one cart line.
async fn remove_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(item_id): Path<i64>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove_item(user_id, item_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Convert the cart into an order.
async fn checkout(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let receipt = state
        .services
        .checkout
        .process_checkout(user_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(serde_json::json!({
        "status": "success",
        "message": "Order placed successfully!",
        "order": receipt.order,
        "total": receipt.total,
    })))
}

// Request DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    #[validate(range(min = 1))]
    pub product_id: i64,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
}
