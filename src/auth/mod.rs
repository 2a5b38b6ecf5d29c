/*!
 * # Authentication and Authorization Module
 *
 * JWT (HS256) access/refresh token pairs with argon2 password hashing.
 * Refresh tokens are anchored to a persisted session row: the session stores
 * the `jti` of the currently valid refresh token, refresh rotates both the
 * pair and the stored jti, and logout revokes the session. Sessions survive
 * process restarts.
 */

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::{self, UserModel, UserRole};
use crate::errors::ErrorResponse;

/// Header carrying the persisted session id on refresh/logout requests.
pub const SESSION_HEADER: &str = "x-session-id";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,          // Subject (user ID)
    pub name: Option<String>, // User's name
    pub email: Option<String>,
    pub role: String, // Single role: client | vendor | admin
    pub jti: String,  // JWT ID (unique identifier for this token)
    pub iat: i64,     // Issued at time
    pub exp: i64,     // Expiration time
    pub nbf: i64,     // Not valid before time
    pub iss: String,  // Issuer
    pub aud: String,  // Audience
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: String,
    pub token_id: String,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin.as_str())
    }

    pub fn is_vendor(&self) -> bool {
        self.has_role(UserRole::Vendor.as_str())
    }

    pub fn is_client(&self) -> bool {
        self.has_role(UserRole::Client.as_str())
    }
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
    pub refresh_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(
        jwt_secret: String,
        jwt_audience: String,
        jwt_issuer: String,
        access_token_expiration: Duration,
        refresh_token_expiration: Duration,
    ) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration,
            refresh_token_expiration,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            jwt_secret: cfg.jwt_secret.clone(),
            jwt_audience: cfg.auth_audience.clone(),
            jwt_issuer: cfg.auth_issuer.clone(),
            access_token_expiration: Duration::from_secs(cfg.jwt_expiration as u64),
            refresh_token_expiration: Duration::from_secs(cfg.refresh_token_expiration as u64),
        }
    }
}

/// Token pair response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_expires_in: i64,
    pub session_id: Uuid,
}

/// Authentication service that handles password hashing, token issuance and
/// validation, and the persisted session store.
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Hash a password with argon2id and a fresh random salt
    pub fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::InternalError(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored argon2 hash
    pub fn verify_password(&self, password: &str, password_hash: &str) -> Result<(), AuthError> {
        let parsed =
            PasswordHash::new(password_hash).map_err(|_| AuthError::InvalidCredentials)?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    /// Issue an access/refresh token pair and open a session row anchored to
    /// the refresh token's jti.
    pub async fn open_session(&self, user: &UserModel) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let session_id = Uuid::new_v4();
        let refresh_jti = Uuid::new_v4();

        let pair = self.issue_pair(user, session_id, refresh_jti)?;

        let session = entities::session::ActiveModel {
            id: Set(session_id),
            user_id: Set(user.id),
            refresh_token_id: Set(refresh_jti),
            expires_at: Set(refresh_exp),
            revoked: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        session
            .insert(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        debug!(%session_id, user_id = %user.id, "session opened");
        Ok(pair)
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.jwt_issuer]);
        validation.set_audience(&[&self.config.jwt_audience]);

        let claims = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })?
        .claims;

        Ok(claims)
    }

    /// Rotate an access/refresh pair. The presented refresh token must carry
    /// the jti currently stored on the session row; rotation replaces it, so
    /// a replayed old refresh token fails.
    pub async fn refresh_session(
        &self,
        session_id: Uuid,
        refresh_token: &str,
    ) -> Result<TokenPair, AuthError> {
        let claims = self.validate_token(refresh_token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

        let session = entities::Session::find_by_id(session_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::InvalidToken)?;

        let now = Utc::now();
        if !session.is_usable(now) || session.user_id != user_id {
            return Err(AuthError::RevokedToken);
        }
        if session.refresh_token_id.to_string() != claims.jti {
            return Err(AuthError::InvalidToken);
        }

        let user = entities::User::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;
        if !user.active {
            return Err(AuthError::RevokedToken);
        }

        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let new_jti = Uuid::new_v4();
        let pair = self.issue_pair(&user, session_id, new_jti)?;

        let mut active: entities::session::ActiveModel = session.into();
        active.refresh_token_id = Set(new_jti);
        active.expires_at = Set(refresh_exp);
        active.updated_at = Set(now);
        active
            .update(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?;

        Ok(pair)
    }

    /// Revoke a session (logout). Idempotent.
    pub async fn revoke_session(&self, session_id: Uuid, user_id: Uuid) -> Result<(), AuthError> {
        let session = entities::Session::find_by_id(session_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::InvalidToken)?;

        if session.user_id != user_id {
            return Err(AuthError::InsufficientPermissions);
        }

        if !session.revoked {
            let mut active: entities::session::ActiveModel = session.into();
            active.revoked = Set(true);
            active.updated_at = Set(Utc::now());
            active
                .update(&*self.db)
                .await
                .map_err(|e| AuthError::DatabaseError(e.to_string()))?;
        }

        debug!(%session_id, "session revoked");
        Ok(())
    }

    fn issue_pair(
        &self,
        user: &UserModel,
        session_id: Uuid,
        refresh_jti: Uuid,
    ) -> Result<TokenPair, AuthError> {
        let now = Utc::now();
        let access_exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;
        let refresh_exp = now
            + ChronoDuration::from_std(self.config.refresh_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let access_claims = Claims {
            sub: user.id.to_string(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            role: user.role.as_str().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: access_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        // Refresh token claims carry minimal data
        let refresh_claims = Claims {
            sub: user.id.to_string(),
            name: None,
            email: None,
            role: user.role.as_str().to_string(),
            jti: refresh_jti.to_string(),
            iat: now.timestamp(),
            exp: refresh_exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        let key = EncodingKey::from_secret(self.config.jwt_secret.as_bytes());
        let access_token = encode(&Header::new(Algorithm::HS256), &access_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;
        let refresh_token = encode(&Header::new(Algorithm::HS256), &refresh_claims, &key)
            .map_err(|e| AuthError::TokenCreation(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.access_token_expiration.as_secs() as i64,
            refresh_expires_in: self.config.refresh_token_expiration.as_secs() as i64,
            session_id,
        })
    }
}

/// Authentication error types
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            Self::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid credentials".to_string())
            }
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (StatusCode::UNAUTHORIZED, "Token has expired".to_string()),
            Self::RevokedToken => (
                StatusCode::UNAUTHORIZED,
                "Authentication token has been revoked".to_string(),
            ),
            Self::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "Insufficient permissions".to_string(),
            ),
            Self::TokenCreation(_) | Self::DatabaseError(_) | Self::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if status.is_server_error() {
            tracing::error!(error = %self, "auth failure");
        }

        let body = ErrorResponse {
            success: false,
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

/// Authentication middleware: validates the bearer token and injects an
/// `AuthUser` into request extensions.
pub async fn auth_middleware(
    State(auth_service): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    match extract_auth_from_headers(request.headers(), &auth_service) {
        Ok(user) => {
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Vendor gate. The role is reloaded from the database per request so a
/// demoted or deactivated account loses access immediately, token claims
/// notwithstanding. Admins pass.
pub async fn vendor_only(
    State(auth_service): State<Arc<AuthService>>,
    request: Request,
    next: Next,
) -> Response {
    let user = match request.extensions().get::<AuthUser>() {
        Some(user) => user.clone(),
        None => return AuthError::MissingAuth.into_response(),
    };

    let db_user = match entities::User::find_by_id(user.user_id)
        .one(&*auth_service.db)
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => return AuthError::UserNotFound.into_response(),
        Err(e) => return AuthError::DatabaseError(e.to_string()).into_response(),
    };

    if !db_user.active {
        return AuthError::RevokedToken.into_response();
    }

    match db_user.role {
        UserRole::Vendor | UserRole::Admin => next.run(request).await,
        UserRole::Client => AuthError::InsufficientPermissions.into_response(),
    }
}

/// Extract authentication info from request headers
fn extract_auth_from_headers(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<AuthUser, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuth)?;
    let auth_value = auth_header.to_str().map_err(|_| AuthError::InvalidToken)?;
    if !auth_value.starts_with("Bearer ") {
        return Err(AuthError::MissingAuth);
    }

    let token = auth_value.trim_start_matches("Bearer ").trim();
    let claims = auth_service.validate_token(token)?;
    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;

    Ok(AuthUser {
        user_id,
        name: claims.name,
        email: claims.email,
        role: claims.role,
        token_id: claims.jti,
    })
}

/// Reads the session id header on refresh/logout requests.
pub fn session_id_from_headers(headers: &HeaderMap) -> Result<Uuid, AuthError> {
    let raw = headers
        .get(SESSION_HEADER)
        .ok_or(AuthError::MissingAuth)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;
    Uuid::parse_str(raw).map_err(|_| AuthError::InvalidToken)
}

#[async_trait::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        let config = AuthConfig::new(
            "unit_test_jwt_secret_that_is_definitely_long_enough_0123456789_abcdef".into(),
            "vendora-auth".into(),
            "vendora-api".into(),
            Duration::from_secs(3600),
            Duration::from_secs(86400),
        );
        // Token and password operations never touch the connection.
        let db = Arc::new(DatabaseConnection::Disconnected);
        AuthService::new(config, db)
    }

    fn sample_user() -> UserModel {
        UserModel {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password_hash: String::new(),
            role: UserRole::Vendor,
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn password_hash_roundtrip() {
        let svc = service();
        let hash = svc.hash_password("correct horse battery staple").unwrap();
        assert!(svc
            .verify_password("correct horse battery staple", &hash)
            .is_ok());
        assert!(svc.verify_password("wrong password", &hash).is_err());
    }

    #[test]
    fn issued_access_token_validates_and_carries_role() {
        let svc = service();
        let user = sample_user();
        let pair = svc
            .issue_pair(&user, Uuid::new_v4(), Uuid::new_v4())
            .unwrap();

        let claims = svc.validate_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "vendor");
        assert_eq!(claims.iss, "vendora-api");
    }

    #[test]
    fn token_with_wrong_secret_is_rejected() {
        let svc = service();
        let user = sample_user();
        let pair = svc
            .issue_pair(&user, Uuid::new_v4(), Uuid::new_v4())
            .unwrap();

        let mut other = service();
        other.config.jwt_secret =
            "a_completely_different_secret_key_also_long_enough_9876543210_zyxwv".into();
        assert!(matches!(
            other.validate_token(&pair.access_token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn refresh_token_jti_matches_session_anchor() {
        let svc = service();
        let user = sample_user();
        let refresh_jti = Uuid::new_v4();
        let pair = svc.issue_pair(&user, Uuid::new_v4(), refresh_jti).unwrap();

        let claims = svc.validate_token(&pair.refresh_token).unwrap();
        assert_eq!(claims.jti, refresh_jti.to_string());
    }
}
