use crate::{
    auth::AuthUser,
    errors::{ApiError, ServiceError},
    handlers::common::{success_response, PaginatedResponse, PaginationParams},
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{delete, get},
    Router,
};
use tracing::instrument;
use uuid::Uuid;

/// Admin account management.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/:id", delete(deactivate_user))
}

async fn list_users(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    require_admin(&user)?;
    let (page, limit) = pagination.clamp(&state.config);
    let (items, total) = state.services.users.list_users(page, limit).await?;
    Ok(success_response(
        "Users",
        PaginatedResponse::new(items, total, page, limit),
    ))
}

#[instrument(skip(state))]
async fn deactivate_user(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    require_admin(&user)?;
    let deactivated = state.services.users.deactivate(user_id).await?;
    Ok(success_response("User deactivated", deactivated))
}

fn require_admin(user: &AuthUser) -> Result<(), ServiceError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(
            "User management requires an admin account".to_string(),
        ))
    }
}
