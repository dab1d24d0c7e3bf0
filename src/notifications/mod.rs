//! Asynchronous notification dispatch.
//!
//! Notifications are fire-and-forget: they are enqueued after the work that
//! warrants them has committed, and a delivery failure can never roll back
//! a sale.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::entities::ProductModel;

const QUEUE_CAPACITY: usize = 256;

/// A queued notification bound for the configured recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient: String,
    pub message: MailMessage,
    pub created_at: DateTime<Utc>,
}

/// Structured mail payloads accepted by the mailer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MailMessage {
    LowStockAlert { product: ProductSnapshot },
    DailySalesDigest(SalesDigest),
}

/// Product state captured at alert time; the alert must describe the stock
/// level that triggered it, not whatever the row holds when the mail sends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub id: i64,
    pub name: String,
    pub stock_quantity: i32,
    pub price: Decimal,
}

impl From<&ProductModel> for ProductSnapshot {
    fn from(product: &ProductModel) -> Self {
        Self {
            id: product.id,
            name: product.name.clone(),
            stock_quantity: product.stock_quantity,
            price: product.price,
        }
    }
}

/// One day of sales, aggregated for the digest mail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SalesDigest {
    pub date: NaiveDate,
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub products_sold: Vec<ProductSales>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSales {
    pub product_id: i64,
    pub name: String,
    pub units_sold: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Delivery channel for notifications.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Default mailer: writes the structured message to the log. Swap in an SMTP
/// implementation behind the same trait for real delivery.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        match &notification.message {
            MailMessage::LowStockAlert { product } => {
                info!(
                    recipient = %notification.recipient,
                    product_id = product.id,
                    stock = product.stock_quantity,
                    "low stock alert: {}",
                    product.name
                );
            }
            MailMessage::DailySalesDigest(digest) => {
                info!(
                    recipient = %notification.recipient,
                    date = %digest.date,
                    orders = digest.total_orders,
                    revenue = %digest.total_revenue,
                    "daily sales digest"
                );
            }
        }
        Ok(())
    }
}

/// Queues notifications and drains them on a background task.
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::Sender<Notification>,
    admin_email: String,
}

impl NotificationDispatcher {
    /// Creates the dispatcher and spawns its delivery worker.
    pub fn new(mailer: Arc<dyn Mailer>, admin_email: String) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = mailer.send(&notification).await {
                    error!("Failed to deliver notification {}: {}", notification.id, e);
                }
            }
        });

        Self { tx, admin_email }
    }

    /// Enqueues a low-stock alert for the admin recipient.
    pub fn low_stock(&self, product: ProductSnapshot) {
        self.enqueue(MailMessage::LowStockAlert { product });
    }

    /// Enqueues the daily sales digest for the admin recipient.
    pub fn daily_digest(&self, digest: SalesDigest) {
        self.enqueue(MailMessage::DailySalesDigest(digest));
    }

    fn enqueue(&self, message: MailMessage) {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient: self.admin_email.clone(),
            message,
            created_at: Utc::now(),
        };

        // Fire-and-forget: a full queue drops the notification with a log
        // line rather than blocking the caller.
        if let Err(e) = self.tx.try_send(notification) {
            warn!("Dropping notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mailer that records everything it is asked to send.
    pub struct CapturingMailer {
        pub sent: Arc<Mutex<Vec<Notification>>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn dispatches_low_stock_alert_to_admin() {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let mailer = Arc::new(CapturingMailer { sent: sent.clone() });
        let dispatcher = NotificationDispatcher::new(mailer, "ops@example.com".to_string());

        dispatcher.low_stock(ProductSnapshot {
            id: 7,
            name: "Widget".to_string(),
            stock_quantity: 3,
            price: Decimal::new(1999, 2),
        });

        // Give the worker a beat to drain the queue.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "ops@example.com");
        match &sent[0].message {
            MailMessage::LowStockAlert { product } => {
                assert_eq!(product.id, 7);
                assert_eq!(product.stock_quantity, 3);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn delivery_failure_does_not_propagate() {
        struct FailingMailer;

        #[async_trait]
        impl Mailer for FailingMailer {
            async fn send(&self, _n: &Notification) -> Result<(), NotificationError> {
                Err(NotificationError::Delivery("smtp down".to_string()))
            }
        }

        let dispatcher =
            NotificationDispatcher::new(Arc::new(FailingMailer), "ops@example.com".to_string());

        // Enqueue must not error even though delivery will fail.
        dispatcher.low_stock(ProductSnapshot {
            id: 1,
            name: "Widget".to_string(),
            stock_quantity: 2,
            price: Decimal::ONE,
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
