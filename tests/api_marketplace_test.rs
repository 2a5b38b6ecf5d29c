mod common;

use axum::http::{Method, StatusCode};
use common::spawn_app;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::str::FromStr;

/// Decimals serialize as strings; scale can vary across database round-trips.
fn decimal_field(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("decimal number"),
        other => panic!("not a decimal value: {other:?}"),
    }
}

#[tokio::test]
async fn vendor_opens_a_shop_and_sells_over_http() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let category = app.create_category("Books").await;

    // Pick a template the bronze grade is entitled to.
    let (status, body) = app
        .request(Method::GET, "/api/v1/templates", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let template_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/shops",
            Some(&vendor.tokens.access_token),
            Some(json!({
                "template_id": template_id,
                "name": "Vera's Goods"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], json!("vera-s-goods"));
    let shop_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(&vendor.tokens.access_token),
            Some(json!({
                "shop_id": shop_id,
                "category_id": category.id,
                "name": "Atlas",
                "price": "15.00",
                "stock": 4
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let product_id = body["data"]["id"].as_str().unwrap().to_string();

    // Clients cannot create products.
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/products",
            Some(&client.tokens.access_token),
            Some(json!({
                "shop_id": shop_id,
                "category_id": category.id,
                "name": "Bootleg",
                "price": "1.00",
                "stock": 1
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Client shops: cart, line, validation.
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/carts",
            Some(&client.tokens.access_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let cart_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{cart_id}/lines"),
            Some(&client.tokens.access_token),
            Some(json!({ "product_id": product_id, "quantity": 2 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decimal_field(&body["data"]["total"]), dec!(30.00));

    // More than the remaining stock is refused with 422.
    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{cart_id}/lines"),
            Some(&client.tokens.access_token),
            Some(json!({ "product_id": product_id, "quantity": 3 })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{cart_id}/validate"),
            Some(&client.tokens.access_token),
            Some(json!({
                "shipping_address": "1 Main St",
                "payment_method": "card"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("validated"));

    // The vendor sees the order in the cross-shop view.
    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/vendors/me/orders",
            Some(&vendor.tokens.access_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["items"][0]["id"], json!(cart_id));

    // And the day's statistics.
    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/vendors/me/statistics",
            Some(&vendor.tokens.access_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["sales_count"], json!(1));
    assert_eq!(decimal_field(&body["data"][0]["revenue"]), dec!(30.00));
}

#[tokio::test]
async fn carts_are_private_to_their_owner() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let carl = app.register_client("Carl", "carl@example.com").await;
    let sam = app.register_client("Sam", "sam@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    app.create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 5)
        .await;

    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/carts",
            Some(&carl.tokens.access_token),
            None,
        )
        .await;
    let cart_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .request(
            Method::GET,
            &format!("/api/v1/carts/{cart_id}"),
            Some(&sam.tokens.access_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn vendors_only_drive_orders_they_are_part_of() {
    let app = spawn_app().await;
    let vera = app.register_vendor("Vera", "vera@example.com").await;
    let rival = app.register_vendor("Rex", "rex@example.com").await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let shop = app.create_shop(&vera, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vera, &shop, &category, "Atlas", dec!(10.00), 5)
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
    app.state
        .services
        .carts
        .validate_cart(cart.id, "1 Main St".into(), "card".into())
        .await
        .unwrap();

    // A vendor with no shop in the order cannot ship it.
    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{}/status", cart.id),
            Some(&rival.tokens.access_token),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{}/status", cart.id),
            Some(&vera.tokens.access_token),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("shipped"));
}

#[tokio::test]
async fn shop_names_must_reduce_to_a_slug() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;

    let (_, body) = app
        .request(Method::GET, "/api/v1/templates", None, None)
        .await;
    let template_id = body["data"][0]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/shops",
            Some(&vendor.tokens.access_token),
            Some(json!({ "template_id": template_id, "name": "日本語" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn product_views_and_shop_visits_are_counted() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 5)
        .await;

    for _ in 0..3 {
        let (status, _) = app
            .request(
                Method::GET,
                &format!("/api/v1/products/{}", product.id),
                None,
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/products/{}", product.id),
            None,
            None,
        )
        .await;
    // The fourth read reports the three previous views.
    assert_eq!(body["data"]["view_count"], json!(3));

    let (status, _) = app
        .request(
            Method::POST,
            &format!("/api/v1/shops/{}/visit", shop.id),
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app
        .request(
            Method::GET,
            &format!("/api/v1/shops/{}", shop.id),
            None,
            None,
        )
        .await;
    assert_eq!(body["data"]["visit_count"], json!(1));
}

#[tokio::test]
async fn category_writes_are_admin_only() {
    let app = spawn_app().await;
    let client = app.register_client("Carl", "carl@example.com").await;
    let admin = app.register_admin("Root", "root@example.com").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(&client.tokens.access_token),
            Some(json!({ "name": "Books" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(&admin.tokens.access_token),
            Some(json!({ "name": "Books" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["slug"], json!("books"));

    // Duplicate slug is a conflict.
    let (status, _) = app
        .request(
            Method::POST,
            "/api/v1/categories",
            Some(&admin.tokens.access_token),
            Some(json!({ "name": "Books" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_registration_is_rejected() {
    let app = spawn_app().await;
    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/auth/register",
            None,
            Some(json!({
                "name": "Carl",
                "email": "not-an-email",
                "password": "short",
                "role": "client"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
}
