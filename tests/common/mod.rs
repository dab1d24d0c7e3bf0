#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use storefront_api::{
    cache::{CacheBackend, InMemoryCache},
    config::AppConfig,
    db,
    entities::{category, product, ProductModel},
    events::{self, EventSender},
    handlers::AppServices,
    notifications::{
        MailMessage, Mailer, Notification, NotificationDispatcher, NotificationError,
        ProductSnapshot,
    },
};
use tokio::sync::mpsc;

/// Mailer that records every notification instead of delivering it.
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

/// Helper harness: application services backed by a fresh SQLite database.
pub struct TestApp {
    pub services: AppServices,
    pub db: Arc<DatabaseConnection>,
    pub cache: Arc<InMemoryCache>,
    pub sent_mail: Arc<Mutex<Vec<Notification>>>,
    pub config: AppConfig,
    _tmp: tempfile::TempDir,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        let db_path = tmp.path().join("storefront_test.db");

        let cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("failed to migrate");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(events::process_events(event_rx));

        let cache = Arc::new(InMemoryCache::new());
        let cache_backend: Arc<dyn CacheBackend> = cache.clone();

        let sent_mail = Arc::new(Mutex::new(Vec::new()));
        let mailer: Arc<dyn Mailer> = Arc::new(CapturingMailer {
            sent: sent_mail.clone(),
        });
        let dispatcher = Arc::new(NotificationDispatcher::new(
            mailer,
            "admin@example.com".to_string(),
        ));

        let services = AppServices::new(
            db_arc.clone(),
            Arc::new(event_sender),
            cache_backend,
            dispatcher,
            &cfg,
        );

        Self {
            services,
            db: db_arc,
            cache,
            sent_mail,
            config: cfg,
            _tmp: tmp,
        }
    }

    pub async fn create_category(&self, name: &str, slug: &str) -> i64 {
        category::ActiveModel {
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to create category")
        .id
    }

    pub async fn create_product(
        &self,
        category_id: i64,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> ProductModel {
        let now = Utc::now();
        product::ActiveModel {
            name: Set(name.to_string()),
            category_id: Set(category_id),
            description: Set(format!("{} description", name)),
            price: Set(price),
            stock_quantity: Set(stock),
            image_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .expect("failed to create product")
    }

    /// Lets the notification worker drain its queue.
    pub async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    /// Low-stock alerts captured so far.
    pub fn low_stock_alerts(&self) -> Vec<ProductSnapshot> {
        self.sent_mail
            .lock()
            .unwrap()
            .iter()
            .filter_map(|n| match &n.message {
                MailMessage::LowStockAlert { product } => Some(product.clone()),
                _ => None,
            })
            .collect()
    }
}
