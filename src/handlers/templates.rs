use crate::{errors::ApiError, handlers::common::success_response, AppState};
use axum::{extract::State, response::Response, routing::get, Router};

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(list_templates))
}

/// Shop templates with their grade entitlements, lowest rank first.
async fn list_templates(State(state): State<AppState>) -> Result<Response, ApiError> {
    let templates = state.services.shops.list_templates().await?;
    Ok(success_response("Shop templates", templates))
}
