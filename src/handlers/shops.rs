use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::common::{created_response, success_response, PaginatedResponse, PaginationParams},
    services::shops::{CreateShopInput, UpdateShopInput},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_shops))
        .route("/:id", get(get_shop))
        .route("/slug/:slug", get(get_shop_by_slug))
        .route("/:id/visit", post(record_visit))
}

pub fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_shop))
        .route("/:id", put(update_shop))
}

#[derive(Debug, Default, Deserialize)]
struct ShopFilter {
    vendor_id: Option<Uuid>,
}

async fn list_shops(
    State(state): State<AppState>,
    Query(filter): Query<ShopFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let (page, limit) = pagination.clamp(&state.config);
    let (items, total) = state
        .services
        .shops
        .list_shops(filter.vendor_id, page, limit)
        .await?;
    Ok(success_response(
        "Shops",
        PaginatedResponse::new(items, total, page, limit),
    ))
}

async fn get_shop(
    State(state): State<AppState>,
    Path(shop_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let shop = state.services.shops.get_shop(shop_id).await?;
    Ok(success_response("Shop", shop))
}

async fn get_shop_by_slug(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let shop = state.services.shops.get_shop_by_slug(&slug).await?;
    Ok(success_response("Shop", shop))
}

async fn record_visit(
    State(state): State<AppState>,
    Path(shop_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state.services.shops.record_visit(shop_id).await?;
    Ok(success_response("Visit recorded", serde_json::json!({})))
}

#[instrument(skip(state, input))]
async fn create_shop(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateShopInput>,
) -> Result<Response, ApiError> {
    let shop = state
        .services
        .shops
        .create_shop(user.user_id, input)
        .await?;
    Ok(created_response("Shop created", shop))
}

#[instrument(skip(state, input))]
async fn update_shop(
    State(state): State<AppState>,
    user: AuthUser,
    Path(shop_id): Path<Uuid>,
    Json(input): Json<UpdateShopInput>,
) -> Result<Response, ApiError> {
    let owner = if user.is_admin() {
        None
    } else {
        Some(user.user_id)
    };
    let shop = state
        .services
        .shops
        .update_shop(owner, shop_id, input)
        .await?;
    Ok(success_response("Shop updated", shop))
}
