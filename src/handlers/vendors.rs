use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::common::{success_response, PaginatedResponse, PaginationParams},
    services::ShopService,
    AppState,
};
use axum::{
    extract::{Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::instrument;

/// Vendor self-service routes: grade standing, promotion, sales statistics
/// and the cross-shop order view. All behind the vendor gate.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/me/grade", get(grade_status))
        .route("/me/grade/promote", post(promote))
        .route("/me/statistics", get(statistics))
        .route("/me/orders", get(orders))
}

#[derive(Debug, Default, Deserialize)]
struct DateRange {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

async fn grade_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    let status = state.services.grades.status_for_user(user.user_id).await?;
    Ok(success_response("Grade status", status))
}

#[instrument(skip(state))]
async fn promote(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
    let outcome = state
        .services
        .grades
        .promote_if_eligible(user.user_id)
        .await?;
    let message = if outcome.promoted {
        "Promoted to the next grade"
    } else {
        "Promotion requirements not met"
    };
    Ok(success_response(message, outcome))
}

async fn statistics(
    State(state): State<AppState>,
    user: AuthUser,
    Query(range): Query<DateRange>,
) -> Result<Response, ApiError> {
    let vendor = ShopService::vendor_for_user(&*state.db, user.user_id).await?;
    let rows = state
        .services
        .statistics
        .list_for_vendor(vendor.id, range.from, range.to)
        .await?;
    Ok(success_response("Sales statistics", rows))
}

async fn orders(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let vendor = ShopService::vendor_for_user(&*state.db, user.user_id).await?;
    let (page, limit) = pagination.clamp(&state.config);
    let (items, total) = state
        .services
        .carts
        .list_orders_for_vendor(vendor.id, page, limit)
        .await?;
    Ok(success_response(
        "Orders",
        PaginatedResponse::new(items, total, page, limit),
    ))
}
