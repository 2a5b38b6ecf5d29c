mod common;

use common::spawn_app;
use rust_decimal_macros::dec;
use vendora_api::errors::ServiceError;
use vendora_api::services::catalog::AddImageInput;

fn image(url: &str, sort_order: i32) -> AddImageInput {
    AddImageInput {
        url: url.to_string(),
        alt_text: None,
        sort_order: Some(sort_order),
    }
}

#[tokio::test]
async fn first_image_becomes_primary_and_primary_is_exclusive() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 5)
        .await;

    let catalog = &app.state.services.catalog;
    let owner = Some(vendor.id());

    let first = catalog
        .add_image(owner, product.id, image("https://cdn.example.com/a.jpg", 0))
        .await
        .unwrap();
    assert!(first.is_primary, "first image is auto-primary");

    let second = catalog
        .add_image(owner, product.id, image("https://cdn.example.com/b.jpg", 1))
        .await
        .unwrap();
    assert!(!second.is_primary);

    // Switching primary clears the old one.
    let promoted = catalog
        .set_primary_image(owner, product.id, second.id)
        .await
        .unwrap();
    assert!(promoted.is_primary);

    let images = catalog.list_images(product.id).await.unwrap();
    let primaries: Vec<_> = images.iter().filter(|i| i.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(primaries[0].id, second.id);
}

#[tokio::test]
async fn removing_the_primary_promotes_the_next_image() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 5)
        .await;

    let catalog = &app.state.services.catalog;
    let owner = Some(vendor.id());

    let first = catalog
        .add_image(owner, product.id, image("https://cdn.example.com/a.jpg", 0))
        .await
        .unwrap();
    let second = catalog
        .add_image(owner, product.id, image("https://cdn.example.com/b.jpg", 1))
        .await
        .unwrap();
    catalog
        .add_image(owner, product.id, image("https://cdn.example.com/c.jpg", 2))
        .await
        .unwrap();

    catalog
        .remove_image(owner, product.id, first.id)
        .await
        .unwrap();

    let images = catalog.list_images(product.id).await.unwrap();
    assert_eq!(images.len(), 2);
    let primaries: Vec<_> = images.iter().filter(|i| i.is_primary).collect();
    assert_eq!(primaries.len(), 1);
    assert_eq!(
        primaries[0].id, second.id,
        "lowest sort_order takes over as primary"
    );
}

#[tokio::test]
async fn other_vendors_cannot_touch_the_image_set() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let intruder = app.register_vendor("Ivan", "ivan@example.com").await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;
    let category = app.create_category("Books").await;
    let product = app
        .create_product(&vendor, &shop, &category, "Atlas", dec!(10.00), 5)
        .await;

    let err = app
        .state
        .services
        .catalog
        .add_image(
            Some(intruder.id()),
            product.id,
            image("https://cdn.example.com/x.jpg", 0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}
