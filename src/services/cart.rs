use crate::{
    entities::{cart_item, CartItem, CartItemModel, Product, ProductModel},
    errors::ServiceError,
    events::{Event, EventSender},
    services::stock_policy::{StockDecision, StockPolicy},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Shopping cart service: CRUD and aggregation over per-user cart lines.
///
/// Every operation takes the acting user explicitly; a line may only be
/// mutated or removed by the user who owns it, checked before any write.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    stock_policy: StockPolicy,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        stock_policy: StockPolicy,
    ) -> Self {
        Self {
            db,
            event_sender,
            stock_policy,
        }
    }

    /// Lists the user's cart lines, most-recently-added first, each resolved
    /// with its product. A product deleted since the add yields a `None`
    /// product rather than failing the whole list.
    #[instrument(skip(self))]
    pub async fn list_items(&self, user_id: i64) -> Result<Vec<CartLine>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(Product)
            .order_by_desc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(item, product)| CartLine { item, product })
            .collect())
    }

    /// Finds the user's cart line for a product, if any.
    pub async fn find_item(
        &self,
        user_id: i64,
        product_id: i64,
    ) -> Result<Option<CartItemModel>, ServiceError> {
        CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await
            .map_err(Into::into)
    }

    /// Adds a product to the cart, folding into the existing line when one
    /// exists (at most one line per (user, product) pair).
    ///
    /// The stock policy governs the outcome: a request that alone exceeds
    /// stock is rejected; a combined quantity over stock caps the line at
    /// available stock and reports a warning-level outcome.
    #[instrument(skip(self))]
    pub async fn add_to_cart(
        &self,
        user_id: i64,
        product_id: i64,
        quantity: i32,
    ) -> Result<CartActionOutcome, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if !self
            .stock_policy
            .has_sufficient(product.stock_quantity, quantity)
        {
            return Err(ServiceError::InsufficientStock(
                "Insufficient stock available".to_string(),
            ));
        }

        let existing = self.find_item(user_id, product_id).await?;

        let outcome = match existing {
            Some(item) => {
                match self
                    .stock_policy
                    .decide_add(item.quantity, quantity, product.stock_quantity)
                {
                    StockDecision::Reject => {
                        return Err(ServiceError::InsufficientStock(
                            "Insufficient stock available".to_string(),
                        ));
                    }
                    StockDecision::AdjustTo(capped) => {
                        let mut active: cart_item::ActiveModel = item.into();
                        active.quantity = Set(capped);
                        active.updated_at = Set(Utc::now());
                        let item = active.update(&*self.db).await?;

                        CartActionOutcome {
                            status: CartActionStatus::Warning,
                            message: "Quantity adjusted to available stock".to_string(),
                            item,
                        }
                    }
                    StockDecision::Accept => {
                        let new_quantity = item.quantity + quantity;
                        let mut active: cart_item::ActiveModel = item.into();
                        active.quantity = Set(new_quantity);
                        active.updated_at = Set(Utc::now());
                        let item = active.update(&*self.db).await?;

                        CartActionOutcome {
                            status: CartActionStatus::Success,
                            message: "Product quantity updated in cart".to_string(),
                            item,
                        }
                    }
                }
            }
            None => {
                let now = Utc::now();
                let item = cart_item::ActiveModel {
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&*self.db)
                .await?;

                CartActionOutcome {
                    status: CartActionStatus::Success,
                    message: "Product added to cart".to_string(),
                    item,
                }
            }
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                product_id,
            })
            .await;

        info!(
            "Cart line for user {} product {} now x{}",
            user_id, product_id, outcome.item.quantity
        );
        Ok(outcome)
    }

    /// Sets a cart line's quantity, re-validated against current stock.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: i64,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItemModel, ServiceError> {
        let item = self.owned_item(user_id, item_id).await?;

        let product = Product::find_by_id(item.product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", item.product_id))
            })?;

        if !self
            .stock_policy
            .has_sufficient(product.stock_quantity, quantity)
        {
            return Err(ServiceError::InsufficientStock(
                "Insufficient stock available".to_string(),
            ));
        }

        let mut active: cart_item::ActiveModel = item.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());
        let item = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemUpdated { user_id, item_id })
            .await;

        Ok(item)
    }

    /// Removes one cart line.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: i64, item_id: i64) -> Result<(), ServiceError> {
        let item = self.owned_item(user_id, item_id).await?;
        item.delete(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartItemRemoved { user_id, item_id })
            .await;

        Ok(())
    }

    /// Deletes every cart line for the user. Returns the number removed.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: i64) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        self.event_sender.send_or_log(Event::CartCleared(user_id)).await;

        info!("Cleared cart for user {}", user_id);
        Ok(result.rows_affected)
    }

    /// Total across cart lines in fixed-point decimal. A line whose product
    /// vanished between add and total contributes zero.
    pub fn cart_total(lines: &[CartLine]) -> Decimal {
        lines
            .iter()
            .map(|line| match &line.product {
                Some(product) => product.price * Decimal::from(line.item.quantity),
                None => Decimal::ZERO,
            })
            .sum()
    }

    /// Sum of quantities across the user's cart, for the page payload.
    pub async fn item_count(&self, user_id: i64) -> Result<i64, ServiceError> {
        let items = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .all(&*self.db)
            .await?;

        Ok(items.iter().map(|item| item.quantity as i64).sum())
    }

    /// Loads a cart line and enforces ownership before any mutation.
    async fn owned_item(&self, user_id: i64, item_id: i64) -> Result<CartItemModel, ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {} not found", item_id)))?;

        if !item.is_owned_by(user_id) {
            return Err(ServiceError::Forbidden(
                "Cart item does not belong to this user".to_string(),
            ));
        }

        Ok(item)
    }
}

/// One cart line resolved with its product (if the product still exists).
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub item: CartItemModel,
    pub product: Option<ProductModel>,
}

/// Severity tag for user-facing cart outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CartActionStatus {
    Success,
    Warning,
}

/// Tagged outcome of an add-or-update operation.
#[derive(Debug, Serialize)]
pub struct CartActionOutcome {
    pub status: CartActionStatus,
    pub message: String,
    pub item: CartItemModel,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn line(quantity: i32, price: Option<Decimal>) -> CartLine {
        let now = Utc::now();
        CartLine {
            item: CartItemModel {
                id: 1,
                user_id: 1,
                product_id: 2,
                quantity,
                created_at: now,
                updated_at: now,
            },
            product: price.map(|price| ProductModel {
                id: 2,
                name: "Widget".to_string(),
                category_id: 1,
                description: String::new(),
                price,
                stock_quantity: 100,
                image_url: None,
                created_at: now,
                updated_at: now,
            }),
        }
    }

    #[test]
    fn total_sums_quantity_times_price() {
        let lines = vec![line(2, Some(dec!(19.99))), line(3, Some(dec!(50.00)))];
        assert_eq!(CartService::cart_total(&lines), dec!(189.98));
    }

    #[test]
    fn missing_product_contributes_zero() {
        let lines = vec![line(2, Some(dec!(19.99))), line(5, None)];
        assert_eq!(CartService::cart_total(&lines), dec!(39.98));
    }

    #[test]
    fn empty_cart_totals_zero() {
        assert_eq!(CartService::cart_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn total_keeps_cents_exact() {
        let lines = vec![line(3, Some(dec!(19.99)))];
        assert_eq!(CartService::cart_total(&lines), dec!(59.97));
    }

    #[test]
    fn outcome_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&CartActionStatus::Warning).unwrap(),
            "\"warning\""
        );
        assert_eq!(
            serde_json::to_string(&CartActionStatus::Success).unwrap(),
            "\"success\""
        );
    }
}
