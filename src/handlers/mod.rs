use crate::{
    cache::{CacheBackend, ProductCacheService},
    config::AppConfig,
    events::EventSender,
    notifications::NotificationDispatcher,
    services::{
        cart::CartService, catalog::CatalogService, checkout::CheckoutService,
        orders::OrderService, reports::ReportService, stock_policy::StockPolicy,
    },
    AppState,
};
use axum::Router;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub mod cart;
pub mod common;
pub mod orders;
pub mod products;

/// The services consumed by HTTP handlers, wired once at startup.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub reports: Arc<ReportService>,
    pub product_cache: Arc<ProductCacheService>,
    pub dispatcher: Arc<NotificationDispatcher>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        cache_backend: Arc<dyn CacheBackend>,
        dispatcher: Arc<NotificationDispatcher>,
        config: &AppConfig,
    ) -> Self {
        let stock_policy = StockPolicy::new(config.low_stock_threshold);
        let product_cache = Arc::new(ProductCacheService::new(cache_backend, &config.cache));

        let catalog = Arc::new(CatalogService::new(
            db.clone(),
            product_cache.clone(),
            event_sender.clone(),
            config.page_size,
        ));
        let cart = Arc::new(CartService::new(
            db.clone(),
            event_sender.clone(),
            stock_policy,
        ));
        let orders = Arc::new(OrderService::new(db.clone()));
        let checkout = Arc::new(CheckoutService::new(
            db.clone(),
            event_sender,
            stock_policy,
            product_cache.clone(),
            dispatcher.clone(),
        ));
        let reports = Arc::new(ReportService::new(db));

        Self {
            catalog,
            cart,
            checkout,
            orders,
            reports,
            product_cache,
            dispatcher,
        }
    }
}

/// Assembles the v1 API surface.
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/products", products::products_routes())
        .nest("/cart", cart::cart_routes())
        .nest("/orders", orders::orders_routes())
}
