use crate::{
    entities::{
        order, order_item, Order, OrderItem, OrderItemModel, OrderModel, OrderStatus, Product,
        ProductModel,
    },
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::instrument;

/// Order store: append-only creation of orders and their line items, plus
/// per-user reads. Order items are never mutated after creation.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an order on the caller's connection, so the checkout unit can
    /// run it inside its own transaction.
    pub async fn create_order<C: ConnectionTrait>(
        conn: &C,
        user_id: i64,
        total_amount: Decimal,
        status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        order::ActiveModel {
            user_id: Set(user_id),
            total_amount: Set(total_amount),
            status: Set(status),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(Into::into)
    }

    /// Creates one order line with the price snapshot taken at purchase.
    pub async fn create_order_item<C: ConnectionTrait>(
        conn: &C,
        order_id: i64,
        product_id: i64,
        quantity: i32,
        price: Decimal,
    ) -> Result<OrderItemModel, ServiceError> {
        order_item::ActiveModel {
            order_id: Set(order_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            price: Set(price),
            ..Default::default()
        }
        .insert(conn)
        .await
        .map_err(Into::into)
    }

    /// Lists the user's orders, newest first, with items and products.
    #[instrument(skip(self))]
    pub async fn get_user_orders(
        &self,
        user_id: i64,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<OrderWithItems>, u64), ServiceError> {
        let paginator = Order::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(&*self.db, per_page);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let mut result = Vec::with_capacity(orders.len());
        for order in orders {
            let items = self.load_items(order.id).await?;
            result.push(OrderWithItems { order, items });
        }

        Ok((result, total))
    }

    /// Fetches one of the user's orders with its items. Another user's order
    /// reads as absent.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        user_id: i64,
        order_id: i64,
    ) -> Result<OrderWithItems, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = self.load_items(order.id).await?;
        Ok(OrderWithItems { order, items })
    }

    /// Transitions an order's status. The only mutation orders permit.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: i64,
        status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let order = Order::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut active: order::ActiveModel = order.into();
        active.status = Set(status);
        active.update(&*self.db).await.map_err(Into::into)
    }

    async fn load_items(&self, order_id: i64) -> Result<Vec<OrderLineView>, ServiceError> {
        let rows = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(item, product)| OrderLineView { item, product })
            .collect())
    }
}

/// An order with its line items, each resolved with the product as it exists
/// now (the item's own price/quantity are the historical snapshot).
#[derive(Debug, Serialize)]
pub struct OrderWithItems {
    pub order: OrderModel,
    pub items: Vec<OrderLineView>,
}

#[derive(Debug, Serialize)]
pub struct OrderLineView {
    pub item: OrderItemModel,
    pub product: Option<ProductModel>,
}
