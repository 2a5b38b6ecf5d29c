use crate::{
    config::AppConfig,
    entities::{client_profile, ClientProfileModel},
    errors::{ApiError, ServiceError},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Standard success envelope. Mirrors the error envelope's `success`,
/// `message` and `timestamp` fields.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    pub timestamp: String,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// 200 with the standard envelope
pub fn success_response<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::new(message, data))).into_response()
}

/// 201 with the standard envelope
pub fn created_response<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::new(message, data))).into_response()
}

/// 204, no body
pub fn no_content_response() -> Response {
    StatusCode::NO_CONTENT.into_response()
}

/// Runs `validator` derive rules and converts failures into the field-level
/// error envelope.
pub fn validate_input<T: Validate>(input: &T) -> Result<(), ApiError> {
    input.validate().map_err(ApiError::from_validation_errors)
}

/// Query-string pagination (`?page=&limit=`). `page` is 1-based.
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl PaginationParams {
    /// Applies defaults and the configured page-size ceiling.
    pub fn clamp(&self, config: &AppConfig) -> (u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(config.api_default_page_size as u64)
            .clamp(1, config.api_max_page_size as u64);
        (page, limit)
    }
}

/// Paginated payload placed inside the `data` field of the envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

/// Resolves the acting user's client profile; 403 for non-client accounts.
pub async fn client_for_user(
    conn: &impl ConnectionTrait,
    user_id: Uuid,
) -> Result<ClientProfileModel, ServiceError> {
    client_profile::Entity::find()
        .filter(client_profile::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::Forbidden("Acting user has no client profile".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "an_entirely_reasonable_jwt_secret_for_unit_testing_0123456789_xyz".into(),
            3600,
            86_400,
            "127.0.0.1".into(),
            8080,
            "development".into(),
        )
    }

    #[test]
    fn pagination_defaults_apply() {
        let params = PaginationParams::default();
        let (page, limit) = params.clamp(&config());
        assert_eq!(page, 1);
        assert_eq!(limit, 20);
    }

    #[test]
    fn pagination_caps_limit() {
        let params = PaginationParams {
            page: Some(0),
            limit: Some(10_000),
        };
        let (page, limit) = params.clamp(&config());
        assert_eq!(page, 1);
        assert_eq!(limit, 100);
    }

    #[test]
    fn total_pages_rounds_up() {
        let body = PaginatedResponse::new(vec![1, 2, 3], 7, 1, 3);
        assert_eq!(body.total_pages, 3);
    }
}
