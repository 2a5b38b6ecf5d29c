mod common;

use common::spawn_app;
use rust_decimal_macros::dec;
use sea_orm::EntityTrait;
use vendora_api::entities::{CartStatus, Product, SalesStatistic};
use vendora_api::errors::ServiceError;

#[tokio::test]
async fn adding_the_same_product_merges_into_one_line() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 8)
        .await;

    let client_id = app.client_profile_id(client.id()).await;
    let cart = app
        .state
        .services
        .carts
        .create_cart(client_id)
        .await
        .unwrap();

    let cart = app
        .state
        .services
        .carts
        .add_product(cart.id, product.id, 3)
        .await
        .unwrap();
    assert_eq!(cart.total, dec!(30.00));

    let cart = app
        .state
        .services
        .carts
        .add_product(cart.id, product.id, 4)
        .await
        .unwrap();
    let with_lines = app.state.services.carts.get_cart(cart.id).await.unwrap();
    assert_eq!(with_lines.lines.len(), 1);
    assert_eq!(with_lines.lines[0].quantity, 7);
    assert_eq!(with_lines.cart.total, dec!(70.00));

    // 7 already in the cart, stock is 8: five more exceeds it.
    let err = app
        .state
        .services
        .carts
        .add_product(cart.id, product.id, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    let unchanged = app.state.services.carts.get_cart(cart.id).await.unwrap();
    assert_eq!(unchanged.lines[0].quantity, 7);
    assert_eq!(unchanged.cart.total, dec!(70.00));
}

#[tokio::test]
async fn removing_a_line_returns_the_total_to_its_prior_value() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let atlas = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 8)
        .await;
    let globe = app
        .create_product(&vendor, &shop, &category, "Globe", dec!(40.00), 4)
        .await;

    let client_id = app.client_profile_id(client.id()).await;
    let cart = app
        .state
        .services
        .carts
        .create_cart(client_id)
        .await
        .unwrap();

    let cart = app
        .state
        .services
        .carts
        .add_product(cart.id, atlas.id, 3)
        .await
        .unwrap();
    let prior_total = cart.total;
    assert_eq!(prior_total, dec!(30.00));

    let cart = app
        .state
        .services
        .carts
        .add_product(cart.id, globe.id, 2)
        .await
        .unwrap();
    assert_eq!(cart.total, dec!(110.00));

    let with_lines = app.state.services.carts.get_cart(cart.id).await.unwrap();
    let globe_line = with_lines
        .lines
        .iter()
        .find(|line| line.product_id == globe.id)
        .unwrap();

    let cart = app
        .state
        .services
        .carts
        .remove_line(cart.id, globe_line.id)
        .await
        .unwrap();
    assert_eq!(cart.total, prior_total);

    let with_lines = app.state.services.carts.get_cart(cart.id).await.unwrap();
    assert_eq!(with_lines.lines.len(), 1);
    assert_eq!(with_lines.lines[0].quantity, 3);
    assert_eq!(with_lines.cart.total, dec!(30.00));
}

#[tokio::test]
async fn validation_decrements_stock_and_records_the_sale() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(12.50), 10)
        .await;

    let client_id = app.client_profile_id(client.id()).await;
    let cart = app
        .state
        .services
        .carts
        .create_cart(client_id)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_product(cart.id, product.id, 4)
        .await
        .unwrap();

    let validated = app
        .state
        .services
        .carts
        .validate_cart(cart.id, "1 Main St".into(), "card".into())
        .await
        .unwrap();
    assert_eq!(validated.status, CartStatus::Validated);
    assert_eq!(validated.total, dec!(50.00));

    let product_after = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product_after.stock, 6);
    assert_eq!(product_after.sale_count, 4);

    let vendor_id = app.vendor_profile_id(vendor.id()).await;
    let stats = SalesStatistic::find().all(&*app.state.db).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].vendor_id, vendor_id);
    assert_eq!(stats[0].sales_count, 1);
    assert_eq!(stats[0].revenue, dec!(50.00));
}

#[tokio::test]
async fn failed_validation_leaves_all_stock_untouched() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let plentiful = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 50)
        .await;
    let scarce = app
        .create_product(&vendor, &shop, &category, "Globe", dec!(40.00), 2)
        .await;

    let client_id = app.client_profile_id(client.id()).await;
    let cart = app
        .state
        .services
        .carts
        .create_cart(client_id)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_product(cart.id, plentiful.id, 5)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_product(cart.id, scarce.id, 2)
        .await
        .unwrap();

    // Someone else takes the scarce stock before validation.
    app.state
        .services
        .catalog
        .reserve_stock(Some(vendor.id()), scarce.id, 1)
        .await
        .unwrap();

    let err = app
        .state
        .services
        .carts
        .validate_cart(cart.id, "1 Main St".into(), "card".into())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // The transaction rolled back: the plentiful product kept its stock.
    let plentiful_after = Product::find_by_id(plentiful.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(plentiful_after.stock, 50);
    assert_eq!(plentiful_after.sale_count, 0);

    let cart_after = app
        .state
        .services
        .carts
        .get_cart_model(cart.id)
        .await
        .unwrap();
    assert_eq!(cart_after.status, CartStatus::Active);
}

#[tokio::test]
async fn lifecycle_transitions_are_enforced() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 10)
        .await;

    let client_id = app.client_profile_id(client.id()).await;
    let cart = app
        .state
        .services
        .carts
        .create_cart(client_id)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_product(cart.id, product.id, 1)
        .await
        .unwrap();

    // Active carts cannot jump straight to shipped.
    let err = app
        .state
        .services
        .carts
        .update_status(cart.id, CartStatus::Shipped)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));

    app.state
        .services
        .carts
        .validate_cart(cart.id, "1 Main St".into(), "card".into())
        .await
        .unwrap();
    let shipped = app
        .state
        .services
        .carts
        .update_status(cart.id, CartStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(shipped.status, CartStatus::Shipped);

    let delivered = app
        .state
        .services
        .carts
        .update_status(cart.id, CartStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(delivered.status, CartStatus::Delivered);

    // Delivered is terminal.
    let err = app
        .state
        .services
        .carts
        .update_status(cart.id, CartStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));
}

#[tokio::test]
async fn a_bare_status_write_cannot_validate_a_cart() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 10)
        .await;

    let client_id = app.client_profile_id(client.id()).await;
    let cart = app
        .state
        .services
        .carts
        .create_cart(client_id)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_product(cart.id, product.id, 3)
        .await
        .unwrap();

    // Validation reserves stock; writing the status directly must not
    // shortcut it, or a later cancellation would release stock that was
    // never taken.
    let err = app
        .state
        .services
        .carts
        .update_status(cart.id, CartStatus::Validated)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidTransition(_)));

    let cart_after = app
        .state
        .services
        .carts
        .get_cart_model(cart.id)
        .await
        .unwrap();
    assert_eq!(cart_after.status, CartStatus::Active);

    app.state
        .services
        .carts
        .update_status(cart.id, CartStatus::Cancelled)
        .await
        .unwrap();

    let product_after = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product_after.stock, 10, "stock was never reserved");
}

#[tokio::test]
async fn cancelling_a_validated_cart_restores_stock() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 10)
        .await;

    let client_id = app.client_profile_id(client.id()).await;
    let cart = app
        .state
        .services
        .carts
        .create_cart(client_id)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .add_product(cart.id, product.id, 3)
        .await
        .unwrap();
    app.state
        .services
        .carts
        .validate_cart(cart.id, "1 Main St".into(), "card".into())
        .await
        .unwrap();

    let cancelled = app
        .state
        .services
        .carts
        .update_status(cart.id, CartStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status, CartStatus::Cancelled);

    let product_after = Product::find_by_id(product.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product_after.stock, 10);

    // Sales statistics are not reversed by cancellation.
    let vendor_id = app.vendor_profile_id(vendor.id()).await;
    let stats = SalesStatistic::find().all(&*app.state.db).await.unwrap();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].vendor_id, vendor_id);
    assert_eq!(stats[0].sales_count, 1);
}
