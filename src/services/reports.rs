use crate::{
    entities::{order, order_item, Order, OrderItem, Product},
    errors::ServiceError,
    notifications::{NotificationDispatcher, ProductSales, SalesDigest},
};
use chrono::{Duration as ChronoDuration, Local, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Read-only sales reporting; not part of the transactional core.
#[derive(Clone)]
pub struct ReportService {
    db: Arc<DatabaseConnection>,
}

impl ReportService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Aggregates one day of sales: order count, revenue, and per-product
    /// units/revenue breakdown.
    #[instrument(skip(self))]
    pub async fn daily_sales_digest(&self, date: NaiveDate) -> Result<SalesDigest, ServiceError> {
        let start = date
            .and_hms_opt(0, 0, 0)
            .map(|naive| Utc.from_utc_datetime(&naive))
            .ok_or_else(|| ServiceError::InternalError("invalid digest date".to_string()))?;
        let end = start + ChronoDuration::days(1);

        let orders = Order::find()
            .filter(order::Column::CreatedAt.gte(start))
            .filter(order::Column::CreatedAt.lt(end))
            .all(&*self.db)
            .await?;

        let total_orders = orders.len() as u64;
        let total_revenue: Decimal = orders.iter().map(|o| o.total_amount).sum();

        let order_ids: Vec<i64> = orders.iter().map(|o| o.id).collect();

        let mut by_product: BTreeMap<i64, ProductSales> = BTreeMap::new();
        if !order_ids.is_empty() {
            let rows = OrderItem::find()
                .filter(order_item::Column::OrderId.is_in(order_ids))
                .find_also_related(Product)
                .all(&*self.db)
                .await?;

            for (item, product) in rows {
                let entry = by_product.entry(item.product_id).or_insert_with(|| ProductSales {
                    product_id: item.product_id,
                    name: product
                        .map(|p| p.name)
                        .unwrap_or_else(|| format!("Product #{}", item.product_id)),
                    units_sold: 0,
                    revenue: Decimal::ZERO,
                });
                entry.units_sold += item.quantity as i64;
                entry.revenue += item.price * Decimal::from(item.quantity);
            }
        }

        let mut products_sold: Vec<ProductSales> = by_product.into_values().collect();
        products_sold.sort_by(|a, b| b.units_sold.cmp(&a.units_sold));

        Ok(SalesDigest {
            date,
            total_orders,
            total_revenue,
            products_sold,
        })
    }
}

/// Spawns the daily digest job: sleeps until the configured local time,
/// aggregates the day's sales, and hands the digest to the dispatcher.
pub fn spawn_daily_digest(
    reports: ReportService,
    dispatcher: Arc<NotificationDispatcher>,
    hour: u32,
    minute: u32,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wait = duration_until_next(hour, minute);
            info!(
                "Next daily sales digest in {}s",
                wait.as_secs()
            );
            tokio::time::sleep(wait).await;

            let today = Local::now().date_naive();
            match reports.daily_sales_digest(today).await {
                Ok(digest) => dispatcher.daily_digest(digest),
                Err(e) => error!("Daily sales digest failed: {}", e),
            }
        }
    })
}

/// Time until the next occurrence of the given local wall-clock time.
fn duration_until_next(hour: u32, minute: u32) -> Duration {
    let now = Local::now();
    let today = match now.date_naive().and_hms_opt(hour, minute, 0) {
        Some(t) => t,
        // Config validation keeps hour/minute in range; if not, retry in a day.
        None => return Duration::from_secs(24 * 60 * 60),
    };

    let next = if now.naive_local() < today {
        today
    } else {
        today + ChronoDuration::days(1)
    };

    (next - now.naive_local()).to_std().unwrap_or(Duration::ZERO)
}
