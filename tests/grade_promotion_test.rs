mod common;

use chrono::{Duration, Utc};
use common::spawn_app;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use uuid::Uuid;
use vendora_api::entities::{
    sales_statistic, vendor_profile, GradeTier, SalesStatistic, VendorProfile,
};
use vendora_api::services::statistics::record_sale;

async fn backdate_enrollment(app: &common::TestApp, vendor_id: Uuid, days: i64) {
    let profile = VendorProfile::find_by_id(vendor_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let mut active: vendor_profile::ActiveModel = profile.into();
    active.enrolled_at = Set(Utc::now() - Duration::days(days));
    active.update(&*app.state.db).await.unwrap();
}

async fn record_sales(app: &common::TestApp, vendor_id: Uuid, count: usize, each: rust_decimal::Decimal) {
    let today = Utc::now().date_naive();
    for _ in 0..count {
        record_sale(&*app.state.db, vendor_id, today, each)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn daily_rollups_are_unique_per_vendor_and_date() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let vendor_id = app.vendor_profile_id(vendor.id()).await;
    let today = Utc::now().date_naive();

    record_sale(&*app.state.db, vendor_id, today, dec!(10.00))
        .await
        .unwrap();
    record_sale(&*app.state.db, vendor_id, today, dec!(5.00))
        .await
        .unwrap();

    let rows = SalesStatistic::find().all(&*app.state.db).await.unwrap();
    assert_eq!(rows.len(), 1, "one row per (vendor, date)");
    assert_eq!(rows[0].sales_count, 2);
    assert_eq!(rows[0].revenue, dec!(15.00));

    // A raw duplicate row trips the unique index behind the upsert.
    let now = Utc::now();
    let duplicate = sales_statistic::ActiveModel {
        id: Set(Uuid::new_v4()),
        vendor_id: Set(vendor_id),
        date: Set(today),
        sales_count: Set(1),
        revenue: Set(dec!(1.00)),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await;
    assert!(duplicate.is_err());
}

#[tokio::test]
async fn fresh_vendor_is_not_eligible() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;

    let status = app
        .state
        .services
        .grades
        .status_for_user(vendor.id())
        .await
        .unwrap();
    assert_eq!(status.current.tier, GradeTier::Bronze);
    assert_eq!(
        status.next.as_ref().map(|g| g.tier),
        Some(GradeTier::Silver)
    );
    assert!(!status.eligible_for_promotion);

    let outcome = app
        .state
        .services
        .grades
        .promote_if_eligible(vendor.id())
        .await
        .unwrap();
    assert!(!outcome.promoted);
    assert_eq!(outcome.tier, GradeTier::Bronze);
}

#[tokio::test]
async fn vendor_meeting_silver_thresholds_is_promoted_once() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let vendor_id = app.vendor_profile_id(vendor.id()).await;

    record_sales(&app, vendor_id, 10, dec!(100.00)).await;
    backdate_enrollment(&app, vendor_id, 31).await;

    let status = app
        .state
        .services
        .grades
        .status_for_user(vendor.id())
        .await
        .unwrap();
    assert_eq!(status.sales_count, 10);
    assert_eq!(status.revenue, dec!(1000.00));
    assert!(status.eligible_for_promotion);

    let outcome = app
        .state
        .services
        .grades
        .promote_if_eligible(vendor.id())
        .await
        .unwrap();
    assert!(outcome.promoted);
    assert_eq!(outcome.tier, GradeTier::Silver);

    // One tier per promotion; the same numbers do not reach gold.
    let again = app
        .state
        .services
        .grades
        .promote_if_eligible(vendor.id())
        .await
        .unwrap();
    assert!(!again.promoted);
    assert_eq!(again.tier, GradeTier::Silver);
}

#[tokio::test]
async fn gold_needs_three_distinct_categories() {
    let app = spawn_app().await;
    let vendor = app.register_vendor("Vera", "vera@example.com").await;
    let vendor_id = app.vendor_profile_id(vendor.id()).await;
    let shop = app.create_shop(&vendor, "Vera's Goods").await;

    record_sales(&app, vendor_id, 10, dec!(100.00)).await;
    backdate_enrollment(&app, vendor_id, 31).await;
    assert!(app
        .state
        .services
        .grades
        .promote_if_eligible(vendor.id())
        .await
        .unwrap()
        .promoted);

    // Numbers good enough for gold, catalog breadth not yet.
    record_sales(&app, vendor_id, 40, dec!(250.00)).await;
    backdate_enrollment(&app, vendor_id, 91).await;

    let books = app.create_category("Books").await;
    app.create_product(&vendor, &shop, &books, "Atlas", dec!(10.00), 5)
        .await;

    let status = app
        .state
        .services
        .grades
        .status_for_user(vendor.id())
        .await
        .unwrap();
    assert_eq!(status.distinct_categories, 1);
    assert!(!status.eligible_for_promotion);

    let games = app.create_category("Games").await;
    let music = app.create_category("Music").await;
    app.create_product(&vendor, &shop, &games, "Chess", dec!(20.00), 5)
        .await;
    app.create_product(&vendor, &shop, &music, "Vinyl", dec!(30.00), 5)
        .await;

    let outcome = app
        .state
        .services
        .grades
        .promote_if_eligible(vendor.id())
        .await
        .unwrap();
    assert!(outcome.promoted);
    assert_eq!(outcome.tier, GradeTier::Gold);
}
