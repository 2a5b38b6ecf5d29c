use crate::{
    auth::AuthUser,
    errors::ApiError,
    handlers::common::{created_response, success_response, PaginatedResponse, PaginationParams},
    services::messages::SendMessageInput,
    AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

/// Messaging routes, all behind the auth middleware.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(send_message))
        .route("/inbox", get(inbox))
        .route("/unread-count", get(unread_count))
        .route("/conversations/:id", get(conversation))
        .route("/:id/read", post(mark_read))
        .route("/:id/archive", post(archive))
}

#[instrument(skip(state, input))]
async fn send_message(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<SendMessageInput>,
) -> Result<Response, ApiError> {
    let message = state
        .services
        .messages
        .send_message(user.user_id, input)
        .await?;
    Ok(created_response("Message sent", message))
}

async fn inbox(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let (page, limit) = pagination.clamp(&state.config);
    let (items, total) = state
        .services
        .messages
        .inbox(user.user_id, page, limit)
        .await?;
    Ok(success_response(
        "Inbox",
        PaginatedResponse::new(items, total, page, limit),
    ))
}

async fn unread_count(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Response, ApiError> {
    let count = state.services.messages.unread_count(user.user_id).await?;
    Ok(success_response(
        "Unread messages",
        serde_json::json!({ "unread": count }),
    ))
}

async fn conversation(
    State(state): State<AppState>,
    user: AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(pagination): Query<PaginationParams>,
) -> Result<Response, ApiError> {
    let (page, limit) = pagination.clamp(&state.config);
    let (items, total) = state
        .services
        .messages
        .list_conversation(user.user_id, conversation_id, page, limit)
        .await?;
    Ok(success_response(
        "Conversation",
        PaginatedResponse::new(items, total, page, limit),
    ))
}

#[instrument(skip(state))]
async fn mark_read(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let message = state
        .services
        .messages
        .mark_read(user.user_id, message_id)
        .await?;
    Ok(success_response("Message marked read", message))
}

#[instrument(skip(state))]
async fn archive(
    State(state): State<AppState>,
    user: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let message = state
        .services
        .messages
        .archive(user.user_id, message_id)
        .await?;
    Ok(success_response("Message archived", message))
}
