/*!
 * # Vendora API
 *
 * Multi-vendor marketplace backend: vendors run template-based shops whose
 * entitlements grow with their seller grade, clients build carts that turn
 * into orders through an atomic validation step, and the two sides talk over
 * threaded messages. Built on axum and SeaORM.
 */

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod services;

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

pub use handlers::common::{ApiResponse, PaginatedResponse};
pub use handlers::AppServices;

use crate::auth::{auth_middleware, vendor_only, AuthService};
use crate::config::AppConfig;
use crate::events::EventSender;

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub event_sender: Arc<EventSender>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        auth: Arc<AuthService>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        let services = AppServices::new(db.clone(), event_sender.clone());
        Self {
            db,
            config,
            auth,
            event_sender,
            services,
        }
    }
}

/// Builds the `/api/v1` surface plus the liveness endpoints.
///
/// Three route groups: public reads and auth entry points, authenticated
/// routes, and vendor-gated routes (the vendor gate rides on top of the auth
/// middleware and reloads the role from the database).
pub fn app_router(state: AppState) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.auth.clone(), auth_middleware);
    let vendor_layer = middleware::from_fn_with_state(state.auth.clone(), vendor_only);

    let public = Router::new()
        .nest("/auth", handlers::auth::public_routes())
        .nest("/products", handlers::products::public_routes())
        .nest("/categories", handlers::categories::public_routes())
        .nest("/shops", handlers::shops::public_routes())
        .nest("/templates", handlers::templates::routes());

    let protected = Router::new()
        .nest("/auth", handlers::auth::protected_routes())
        .nest("/carts", handlers::carts::routes())
        .nest("/messages", handlers::messages::routes())
        .nest("/categories", handlers::categories::admin_routes())
        .nest("/users", handlers::users::routes())
        .layer(auth_layer.clone());

    let vendor = Router::new()
        .nest("/products", handlers::products::vendor_routes())
        .nest("/shops", handlers::shops::vendor_routes())
        .nest("/vendors", handlers::vendors::routes())
        .layer(vendor_layer)
        .layer(auth_layer);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", public.merge(protected).merge(vendor))
        .with_state(state)
}

async fn root() -> Response {
    handlers::common::success_response(
        "Vendora API",
        serde_json::json!({ "version": env!("CARGO_PKG_VERSION") }),
    )
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Response {
    match db::check_connection(&state.db).await {
        Ok(()) => handlers::common::success_response(
            "Service healthy",
            serde_json::json!({ "database": "up" }),
        ),
        Err(_) => {
            let body = errors::ErrorResponse {
                success: false,
                error: "Service Unavailable".to_string(),
                message: "Database unreachable".to_string(),
                errors: None,
                timestamp: chrono::Utc::now().to_rfc3339(),
            };
            (axum::http::StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}
