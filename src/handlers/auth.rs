use crate::{
    auth::{session_id_from_headers, AuthError, AuthUser},
    errors::ApiError,
    events::Event,
    handlers::common::{created_response, success_response, validate_input},
    services::users::{RegisterInput, UpdateProfileInput},
    AppState,
};
use axum::{
    extract::State,
    http::HeaderMap,
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::instrument;
use validator::Validate;

/// Routes that need no bearer token.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
}

/// Routes behind the auth middleware.
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(me))
        .route("/me", put(update_me))
}

#[derive(Debug, Deserialize, Validate)]
struct LoginInput {
    #[validate(email(message = "Invalid email address"))]
    email: String,
    #[validate(length(min = 1, message = "Password must not be empty"))]
    password: String,
}

#[instrument(skip(state, input))]
async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Response, ApiError> {
    let created = state.services.users.register(input).await?;
    Ok(created_response("Account registered", created))
}

#[instrument(skip(state, input), fields(email = %input.email))]
async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Response, ApiError> {
    validate_input(&input)?;

    let user = state
        .services
        .users
        .find_by_email(&input.email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;
    if !user.active {
        return Err(AuthError::RevokedToken.into());
    }
    state
        .auth
        .verify_password(&input.password, &user.password_hash)?;

    let pair = state.auth.open_session(&user).await?;
    state
        .event_sender
        .send_or_log(Event::UserLoggedIn(user.id))
        .await;

    Ok(success_response("Logged in", pair))
}

#[derive(Debug, Deserialize)]
struct RefreshInput {
    refresh_token: String,
}

/// Rotates the token pair. The session id rides in the `x-session-id` header,
/// the refresh token in the body.
#[instrument(skip(state, headers, input))]
async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<RefreshInput>,
) -> Result<Response, ApiError> {
    let session_id = session_id_from_headers(&headers)?;
    let pair = state
        .auth
        .refresh_session(session_id, &input.refresh_token)
        .await?;
    Ok(success_response("Token refreshed", pair))
}

#[instrument(skip(state, headers))]
async fn logout(
    State(state): State<AppState>,
    user: AuthUser,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let session_id = session_id_from_headers(&headers)?;
    state.auth.revoke_session(session_id, user.user_id).await?;
    Ok(success_response("Logged out", serde_json::json!({})))
}

async fn me(State(state): State<AppState>, user: AuthUser) -> Result<Response, ApiError> {
    let profile = state.services.users.get_with_profile(user.user_id).await?;
    Ok(success_response("Current user", profile))
}

#[instrument(skip(state, input))]
async fn update_me(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<UpdateProfileInput>,
) -> Result<Response, ApiError> {
    let updated = state
        .services
        .users
        .update_profile(user.user_id, input)
        .await?;
    Ok(success_response("Profile updated", updated))
}
