mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use storefront_api::{
    entities::{cart_item, order, order_item, CartItem, Order, OrderItem, OrderStatus, Product},
    errors::ServiceError,
};

const USER: i64 = 1;

#[tokio::test]
async fn checkout_creates_order_and_empties_cart() {
    let app = TestApp::new().await;
    let category = app.create_category("Electronics", "electronics").await;
    let product = app
        .create_product(category, "Mechanical Keyboard", dec!(100.00), 20)
        .await;

    app.services
        .cart
        .add_to_cart(USER, product.id, 2)
        .await
        .expect("add to cart");

    let receipt = app
        .services
        .checkout
        .process_checkout(USER)
        .await
        .expect("checkout");

    assert_eq!(receipt.total, dec!(200.00));
    assert_eq!(receipt.order.status, OrderStatus::Completed);
    assert_eq!(receipt.order.user_id, USER);

    // Exactly one order item, snapshotting quantity and price.
    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(receipt.order.id))
        .all(&*app.db)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product_id, product.id);
    assert_eq!(items[0].quantity, 2);
    assert_eq!(items[0].price, dec!(100.00));

    // Cart consumed.
    let remaining = CartItem::find()
        .filter(cart_item::Column::UserId.eq(USER))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(remaining, 0);

    // Stock conserved: new stock = old stock - purchased quantity.
    let refreshed = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.stock_quantity, 18);
}

#[tokio::test]
async fn checkout_totals_multiple_products_in_fixed_point() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    let cheap = app.create_product(category, "Cable", dec!(19.99), 50).await;
    let dear = app.create_product(category, "Dock", dec!(50.00), 50).await;

    app.services.cart.add_to_cart(USER, cheap.id, 2).await.unwrap();
    app.services.cart.add_to_cart(USER, dear.id, 3).await.unwrap();

    let receipt = app.services.checkout.process_checkout(USER).await.unwrap();

    // 2 x 19.99 + 3 x 50.00, no cents lost to floats.
    assert_eq!(receipt.total, dec!(189.98));

    let stored = Order::find_by_id(receipt.order.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.total_amount, dec!(189.98));

    let item_count = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(receipt.order.id))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(item_count, 2);
}

#[tokio::test]
async fn empty_cart_checkout_fails_without_creating_anything() {
    let app = TestApp::new().await;

    let err = app
        .services
        .checkout
        .process_checkout(USER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);

    let orders = Order::find()
        .filter(order::Column::UserId.eq(USER))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(orders, 0);
}

#[tokio::test]
async fn insufficient_stock_aborts_the_whole_unit() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    let in_stock = app.create_product(category, "Mouse", dec!(100.00), 20).await;
    let scarce = app.create_product(category, "Headset", dec!(50.00), 5).await;

    app.services
        .cart
        .add_to_cart(USER, in_stock.id, 2)
        .await
        .unwrap();
    app.services.cart.add_to_cart(USER, scarce.id, 5).await.unwrap();

    // Another sale drains the scarce product below this cart's demand.
    app.services.catalog.set_stock(scarce.id, 3).await.unwrap();

    let err = app
        .services
        .checkout
        .process_checkout(USER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(ref msg) if msg == "Insufficient stock for Headset");

    // No order row, no stock delta, no cart deletion.
    let orders = Order::find()
        .filter(order::Column::UserId.eq(USER))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(orders, 0);

    let untouched = Product::find_by_id(in_stock.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.stock_quantity, 20);

    let cart_lines = CartItem::find()
        .filter(cart_item::Column::UserId.eq(USER))
        .count(&*app.db)
        .await
        .unwrap();
    assert_eq!(cart_lines, 2);
}

#[tokio::test]
async fn out_of_stock_product_fails_checkout() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    let product = app.create_product(category, "Webcam", dec!(80.00), 2).await;

    app.services.cart.add_to_cart(USER, product.id, 2).await.unwrap();
    app.services.catalog.set_stock(product.id, 0).await.unwrap();

    let err = app
        .services
        .checkout
        .process_checkout(USER)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));
}

#[tokio::test]
async fn low_stock_alert_fires_inside_the_band() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    // 12 in stock, buying 10 leaves 2: low but still sellable.
    let product = app.create_product(category, "SSD", dec!(50.00), 12).await;

    app.services.cart.add_to_cart(USER, product.id, 10).await.unwrap();
    app.services.checkout.process_checkout(USER).await.unwrap();
    app.settle().await;

    let alerts = app.low_stock_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].id, product.id);
    assert_eq!(alerts[0].stock_quantity, 2);
}

#[tokio::test]
async fn no_alert_when_stock_hits_zero() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    // 10 in stock, buying 10 leaves 0: out of stock, not low stock.
    let product = app.create_product(category, "HDD", dec!(40.00), 10).await;

    app.services.cart.add_to_cart(USER, product.id, 10).await.unwrap();
    app.services.checkout.process_checkout(USER).await.unwrap();
    app.settle().await;

    assert!(app.low_stock_alerts().is_empty());
}

#[tokio::test]
async fn no_alert_with_adequate_remaining_stock() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    let product = app.create_product(category, "Monitor", dec!(150.00), 20).await;

    app.services.cart.add_to_cart(USER, product.id, 2).await.unwrap();
    app.services.checkout.process_checkout(USER).await.unwrap();
    app.settle().await;

    assert!(app.low_stock_alerts().is_empty());
}

#[tokio::test]
async fn checkout_invalidates_cached_listings() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    let product = app.create_product(category, "Keyboard", dec!(100.00), 20).await;

    // Prime the listing cache.
    let filter = storefront_api::services::ProductFilter::default();
    let before = app.services.catalog.list_products(&filter).await.unwrap();
    assert_eq!(before.products[0].product.stock_quantity, 20);

    app.services.cart.add_to_cart(USER, product.id, 5).await.unwrap();
    app.services.checkout.process_checkout(USER).await.unwrap();

    // A subsequent read for the same tuple reflects the new stock value.
    let after = app.services.catalog.list_products(&filter).await.unwrap();
    assert_eq!(after.products[0].product.stock_quantity, 15);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    let product = app.create_product(category, "GPU", dec!(500.00), 10).await;

    // Two users each want 6 of the 10 in stock.
    app.services.cart.add_to_cart(1, product.id, 6).await.unwrap();
    app.services.cart.add_to_cart(2, product.id, 6).await.unwrap();

    let checkout_a = app.services.checkout.clone();
    let checkout_b = app.services.checkout.clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { checkout_a.process_checkout(1).await }),
        tokio::spawn(async move { checkout_b.process_checkout(2).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let stock_errors = results
        .iter()
        .filter(|r| matches!(r, Err(ServiceError::InsufficientStock(_))))
        .count();

    assert_eq!(successes, 1, "exactly one checkout must win");
    assert_eq!(stock_errors, 1, "the loser must see a stock error");

    let refreshed = Product::find_by_id(product.id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refreshed.stock_quantity, 4);
}

#[tokio::test]
async fn daily_digest_aggregates_todays_sales() {
    let app = TestApp::new().await;
    let category = app.create_category("Misc", "misc").await;
    let keyboard = app.create_product(category, "Keyboard", dec!(100.00), 50).await;
    let mouse = app.create_product(category, "Mouse", dec!(25.00), 50).await;

    app.services.cart.add_to_cart(1, keyboard.id, 2).await.unwrap();
    app.services.cart.add_to_cart(1, mouse.id, 4).await.unwrap();
    app.services.checkout.process_checkout(1).await.unwrap();

    app.services.cart.add_to_cart(2, keyboard.id, 1).await.unwrap();
    app.services.checkout.process_checkout(2).await.unwrap();

    let digest = app
        .services
        .reports
        .daily_sales_digest(chrono::Utc::now().date_naive())
        .await
        .unwrap();

    assert_eq!(digest.total_orders, 2);
    // 2x100 + 4x25 + 1x100
    assert_eq!(digest.total_revenue, dec!(400.00));

    let keyboard_sales = digest
        .products_sold
        .iter()
        .find(|p| p.product_id == keyboard.id)
        .expect("keyboard in digest");
    assert_eq!(keyboard_sales.units_sold, 3);
    assert_eq!(keyboard_sales.revenue, dec!(300.00));
}
