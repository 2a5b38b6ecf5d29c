use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::common::{
        created_response, no_content_response, success_response, PaginatedResponse,
        PaginationParams,
    },
    services::catalog::{AddImageInput, CreateProductInput, ProductFilter, UpdateProductInput},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

/// Public catalog reads.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/images", get(list_images))
}

/// Vendor-gated catalog writes and stock operations.
pub fn vendor_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/:id", put(update_product))
        .route("/:id", delete(delete_product))
        .route("/:id/stock/reserve", post(reserve_stock))
        .route("/:id/stock/release", post(release_stock))
        .route("/:id/images", post(add_image))
        .route("/:id/images/:image_id/primary", put(set_primary_image))
        .route("/:id/images/:image_id", delete(remove_image))
}

#[derive(Debug, Deserialize)]
struct StockInput {
    quantity: i32,
}

async fn list_products(
    State(state): State<AppState>,
    Query(filter): Query<ProductFilter>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let (page, limit) = pagination.clamp(&state.config);
    let (items, total) = state
        .services
        .catalog
        .list_products(filter, page, limit)
        .await?;
    Ok(success_response(
        "Products",
        PaginatedResponse::new(items, total, page, limit),
    ))
}

/// Public product page: returns the product with images and bumps the view
/// counter.
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let product = state.services.catalog.get_product(product_id).await?;
    state.services.catalog.record_view(product_id).await?;
    Ok(success_response("Product", product))
}

async fn list_images(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let images = state.services.catalog.list_images(product_id).await?;
    Ok(success_response("Product images", images))
}

#[instrument(skip(state, input))]
async fn create_product(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateProductInput>,
) -> Result<Response, ApiError> {
    let product = state
        .services
        .catalog
        .create_product(owner(&user), input)
        .await?;
    Ok(created_response("Product created", product))
}

#[instrument(skip(state, input))]
async fn update_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<UpdateProductInput>,
) -> Result<Response, ApiError> {
    let product = state
        .services
        .catalog
        .update_product(owner(&user), product_id, input)
        .await?;
    Ok(success_response("Product updated", product))
}

#[instrument(skip(state))]
async fn delete_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state
        .services
        .catalog
        .delete_product(owner(&user), product_id)
        .await?;
    Ok(no_content_response())
}

#[instrument(skip(state, input))]
async fn reserve_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<StockInput>,
) -> Result<Response, ApiError> {
    state
        .services
        .catalog
        .reserve_stock(owner(&user), product_id, input.quantity)
        .await?;
    Ok(success_response("Stock reserved", serde_json::json!({})))
}

#[instrument(skip(state, input))]
async fn release_stock(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<StockInput>,
) -> Result<Response, ApiError> {
    state
        .services
        .catalog
        .release_stock(owner(&user), product_id, input.quantity)
        .await?;
    Ok(success_response("Stock released", serde_json::json!({})))
}

#[instrument(skip(state, input))]
async fn add_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(input): Json<AddImageInput>,
) -> Result<Response, ApiError> {
    let image = state
        .services
        .catalog
        .add_image(owner(&user), product_id, input)
        .await?;
    Ok(created_response("Image added", image))
}

#[instrument(skip(state))]
async fn set_primary_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path((product_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    let image = state
        .services
        .catalog
        .set_primary_image(owner(&user), product_id, image_id)
        .await?;
    Ok(success_response("Primary image set", image))
}

#[instrument(skip(state))]
async fn remove_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path((product_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    state
        .services
        .catalog
        .remove_image(owner(&user), product_id, image_id)
        .await?;
    Ok(no_content_response())
}

/// Admins bypass the vendor ownership check in the service layer.
fn owner(user: &AuthUser) -> Option<Uuid> {
    if user.is_admin() {
        None
    } else {
        Some(user.user_id)
    }
}
