use crate::{
    auth::AuthUser,
    entities::CartStatus,
    errors::{ApiError, ServiceError},
    handlers::common::{
        client_for_user, created_response, success_response, PaginatedResponse, PaginationParams,
    },
    services::{carts::ValidateCartInput, shops::ShopService},
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

/// Cart routes. All of them sit behind the auth middleware; ownership is
/// enforced per request.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_cart))
        .route("/", get(list_carts))
        .route("/:id", get(get_cart))
        .route("/:id/lines", post(add_line))
        .route("/:id/lines/:line_id", put(update_line))
        .route("/:id/lines/:line_id", delete(remove_line))
        .route("/:id/validate", post(validate_cart))
        .route("/:id/status", post(update_status))
}

#[derive(Debug, Deserialize)]
struct AddLineInput {
    product_id: Uuid,
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct UpdateLineInput {
    quantity: i32,
}

#[derive(Debug, Deserialize)]
struct UpdateStatusInput {
    status: CartStatus,
}

#[instrument(skip(state))]
async fn create_cart(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
    let client = client_for_user(&*state.db, user.user_id).await?;
    let cart = state.services.carts.create_cart(client.id).await?;
    Ok(created_response("Cart created", cart))
}

async fn list_carts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let client = client_for_user(&*state.db, user.user_id).await?;
    let (page, limit) = pagination.clamp(&state.config);
    let (items, total) = state
        .services
        .carts
        .list_carts_for_client(client.id, page, limit)
        .await?;
    Ok(success_response(
        "Carts",
        PaginatedResponse::new(items, total, page, limit),
    ))
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(cart_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    owned_cart(&state, &user, cart_id).await?;
    let cart = state.services.carts.get_cart(cart_id).await?;
    Ok(success_response("Cart", cart))
}

#[instrument(skip(state, input))]
async fn add_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path(cart_id): Path<Uuid>,
    Json(input): Json<AddLineInput>,
) -> Result<Response, ApiError> {
    owned_cart(&state, &user, cart_id).await?;
    let cart = state
        .services
        .carts
        .add_product(cart_id, input.product_id, input.quantity)
        .await?;
    Ok(success_response("Product added to cart", cart))
}

#[instrument(skip(state, input))]
async fn update_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path((cart_id, line_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<UpdateLineInput>,
) -> Result<Response, ApiError> {
    owned_cart(&state, &user, cart_id).await?;
    let cart = state
        .services
        .carts
        .update_line_quantity(cart_id, line_id, input.quantity)
        .await?;
    Ok(success_response("Cart line updated", cart))
}

#[instrument(skip(state))]
async fn remove_line(
    State(state): State<AppState>,
    user: AuthUser,
    Path((cart_id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
    owned_cart(&state, &user, cart_id).await?;
    let cart = state
        .services
        .carts
        .remove_line(cart_id, line_id)
        .await?;
    Ok(success_response("Cart line removed", cart))
}

/// Turns the cart into an order: reserves stock, records the sale and moves
/// the cart to `validated`, all atomically.
#[instrument(skip(state, input))]
async fn validate_cart(
    State(state): State<AppState>,
    user: AuthUser,
    Path(cart_id): Path<Uuid>,
    Json(input): Json<ValidateCartInput>,
) -> Result<Response, ApiError> {
    owned_cart(&state, &user, cart_id).await?;
    let cart = state
        .services
        .carts
        .validate_cart(cart_id, input.shipping_address, input.payment_method)
        .await?;
    Ok(success_response("Cart validated", cart))
}

/// Moves the cart through its lifecycle. Clients may only cancel their own
/// carts; fulfilment transitions are for vendors whose shops are in the
/// order, and for admins.
#[instrument(skip(state, input))]
async fn update_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(cart_id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> Result<Response, ApiError> {
    if user.is_client() {
        owned_cart(&state, &user, cart_id).await?;
        if input.status != CartStatus::Cancelled {
            return Err(ServiceError::Forbidden(
                "Clients may only cancel their carts".to_string(),
            )
            .into());
        }
    } else if user.is_vendor() {
        let vendor = ShopService::vendor_for_user(&*state.db, user.user_id).await?;
        let involved = state
            .services
            .carts
            .cart_involves_vendor(cart_id, vendor.id)
            .await?;
        if !involved {
            return Err(ServiceError::Forbidden(
                "Cart has no lines from this vendor's shops".to_string(),
            )
            .into());
        }
    } else if !user.is_admin() {
        return Err(ServiceError::Forbidden("Insufficient role".to_string()).into());
    }

    let cart = state
        .services
        .carts
        .update_status(cart_id, input.status)
        .await?;
    Ok(success_response("Cart status updated", cart))
}

/// Ownership gate: the cart must belong to the acting client. Admins pass.
async fn owned_cart(
    state: &AppState,
    user: &AuthUser,
    cart_id: Uuid,
) -> Result<(), ServiceError> {
    if user.is_admin() {
        return Ok(());
    }
    let client = client_for_user(&*state.db, user.user_id).await?;
    let cart = state.services.carts.get_cart_model(cart_id).await?;
    if cart.client_id != client.id {
        return Err(ServiceError::Forbidden(
            "Cart belongs to another client".to_string(),
        ));
    }
    Ok(())
}
