use crate::{
    auth::AuthUser,
    errors::{ApiError, ServiceError},
    handlers::common::{created_response, no_content_response, success_response},
    services::catalog::{CreateCategoryInput, UpdateCategoryInput},
    AppState,
};
use axum::{
    extract::{Path, State},
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories))
        .route("/:id", get(get_category))
}

/// Category writes are admin-only.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_category))
        .route("/:id", put(update_category))
        .route("/:id", delete(delete_category))
}

async fn list_categories(State(state): State<AppState>) -> Result<Response, ApiError> {
    let categories = state.services.catalog.list_categories().await?;
    Ok(success_response("Categories", categories))
}

async fn get_category(
    State(state): State<AppState>,
    Path(category_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let category = state.services.catalog.get_category(category_id).await?;
    Ok(success_response("Category", category))
}

#[instrument(skip(state, input))]
async fn create_category(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreateCategoryInput>,
) -> Result<Response, ApiError> {
    require_admin(&user)?;
    let category = state.services.catalog.create_category(input).await?;
    Ok(created_response("Category created", category))
}

#[instrument(skip(state, input))]
async fn update_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(category_id): Path<Uuid>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Response, ApiError> {
    require_admin(&user)?;
    let category = state
        .services
        .catalog
        .update_category(category_id, input)
        .await?;
    Ok(success_response("Category updated", category))
}

#[instrument(skip(state))]
async fn delete_category(
    State(state): State<AppState>,
    user: AuthUser,
    Path(category_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&user)?;
    state.services.catalog.delete_category(category_id).await?;
    Ok(no_content_response())
}

fn require_admin(user: &AuthUser) -> Result<(), ServiceError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "Category management requires an admin account".to_string(),
        ))
    }
}
