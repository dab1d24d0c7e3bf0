use crate::{
    cache::ProductCacheService,
    entities::{cart_item, product, CartItem, CartItemModel, OrderModel, OrderStatus, Product},
    errors::ServiceError,
    events::{Event, EventSender},
    notifications::{NotificationDispatcher, ProductSnapshot},
    services::{orders::OrderService, stock_policy::StockPolicy},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};

/// Checkout orchestrator: converts a user's cart into an order as one
/// atomic unit of work.
///
/// Stock validation, order creation, stock decrements, and cart consumption
/// all happen inside a single database transaction; side effects (low-stock
/// alerts, cache invalidation, events) fire only after commit.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    stock_policy: StockPolicy,
    product_cache: Arc<ProductCacheService>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        stock_policy: StockPolicy,
        product_cache: Arc<ProductCacheService>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            db,
            event_sender,
            stock_policy,
            product_cache,
            dispatcher,
        }
    }

    /// Processes checkout for a user.
    ///
    /// Each product row is re-read inside the transaction under an exclusive
    /// row lock, so concurrent checkouts of the same product serialize and
    /// the second validator sees the first committer's decrement. Any line
    /// failing validation aborts the whole unit: no order, no stock change,
    /// no cart mutation.
    #[instrument(skip(self))]
    pub async fn process_checkout(&self, user_id: i64) -> Result<CheckoutReceipt, ServiceError> {
        let cart_items = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .order_by_desc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        if cart_items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let txn = self.db.begin().await?;

        // Lock and validate every line against the current stock reading,
        // accumulating the total from locked prices.
        let mut total = Decimal::ZERO;
        let mut lines: Vec<(CartItemModel, product::Model)> = Vec::with_capacity(cart_items.len());

        for item in cart_items {
            let product = Product::find_by_id(item.product_id)
                .lock_exclusive()
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", item.product_id))
                })?;

            self.stock_policy.validate_checkout_line(
                &product.name,
                item.quantity,
                product.stock_quantity,
            )?;

            total += product.price * Decimal::from(item.quantity);
            lines.push((item, product));
        }

        let order = OrderService::create_order(&txn, user_id, total, OrderStatus::Completed).await?;

        let mut stock_changes: Vec<StockChange> = Vec::with_capacity(lines.len());
        let mut low_stock: Vec<ProductSnapshot> = Vec::new();

        for (item, product) in lines {
            OrderService::create_order_item(&txn, order.id, product.id, item.quantity, product.price)
                .await?;

            let old_quantity = product.stock_quantity;
            let new_quantity = old_quantity - item.quantity;

            let mut active: product::ActiveModel = product.into();
            active.stock_quantity = Set(new_quantity);
            active.updated_at = Set(Utc::now());
            let updated = active.update(&txn).await?;

            if self.stock_policy.is_low_stock(updated.stock_quantity) {
                low_stock.push(ProductSnapshot::from(&updated));
            }

            stock_changes.push(StockChange {
                product_id: updated.id,
                old_quantity,
                new_quantity,
            });

            CartItem::delete_by_id(item.id).exec(&txn).await?;
        }

        txn.commit().await?;

        // Post-commit hooks. None of these can undo the sale: notifications
        // are fire-and-forget and cache invalidation is best-effort.
        for snapshot in low_stock {
            self.dispatcher.low_stock(snapshot);
        }

        for change in &stock_changes {
            self.product_cache.invalidate_product(change.product_id).await;
            self.event_sender
                .send_or_log(Event::ProductStockChanged {
                    product_id: change.product_id,
                    old_quantity: change.old_quantity,
                    new_quantity: change.new_quantity,
                })
                .await;
        }

        self.event_sender
            .send_or_log(Event::OrderCompleted {
                order_id: order.id,
                user_id,
            })
            .await;

        info!(
            "Checkout completed: order {} for user {} totaling {}",
            order.id, user_id, total
        );

        Ok(CheckoutReceipt { order, total })
    }
}

struct StockChange {
    product_id: i64,
    old_quantity: i32,
    new_quantity: i32,
}

/// Result of a successful checkout.
#[derive(Debug, Serialize)]
pub struct CheckoutReceipt {
    pub order: OrderModel,
    pub total: Decimal,
}
