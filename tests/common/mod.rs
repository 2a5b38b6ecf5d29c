#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use vendora_api::{
    app_router,
    auth::{AuthConfig, AuthService, TokenPair, SESSION_HEADER},
    config::AppConfig,
    db::{self, DbConfig},
    entities::{client_profile, vendor_profile, CategoryModel, ProductModel, ShopModel, UserModel},
    events::{process_events, EventSender},
    services::{
        catalog::{CreateCategoryInput, CreateProductInput},
        shops::CreateShopInput,
        users::{RegisterInput, RegisterRole},
    },
    AppState,
};

const TEST_JWT_SECRET: &str =
    "integration_test_jwt_secret_with_plenty_of_entropy_0123456789_qwerty";

/// In-process application over an in-memory sqlite database.
///
/// The pool is pinned to a single connection: sqlite gives every pooled
/// connection its own `:memory:` database otherwise.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub struct TestUser {
    pub user: UserModel,
    pub tokens: TokenPair,
}

impl TestUser {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.tokens.access_token)
    }
}

pub async fn spawn_app() -> TestApp {
    let config = AppConfig::new(
        "sqlite::memory:".into(),
        TEST_JWT_SECRET.into(),
        3600,
        86_400,
        "127.0.0.1".into(),
        0,
        "development".into(),
    );

    let db_config = DbConfig {
        url: "sqlite::memory:".into(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout: Duration::from_secs(5),
        idle_timeout: Duration::from_secs(60),
        acquire_timeout: Duration::from_secs(5),
    };
    let db = Arc::new(
        db::establish_connection_with_config(&db_config)
            .await
            .expect("test database"),
    );
    db::sync_schema(&db).await.expect("schema sync");
    db::seed_reference_data(&db).await.expect("seed data");

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(process_events(rx, Vec::new()));
    let event_sender = Arc::new(EventSender::new(tx));

    let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
    let state = AppState::new(db, Arc::new(config), auth, event_sender);
    let router = app_router(state.clone());

    TestApp { router, state }
}

impl TestApp {
    /// Fires one request at the router and decodes the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request_with_headers(method, uri, token, body, &[])
            .await
    }

    pub async fn request_with_headers(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
        extra_headers: &[(&str, String)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        for (name, value) in extra_headers {
            builder = builder.header(*name, value);
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    /// Convenience wrapper adding the session header used by refresh/logout.
    pub async fn session_request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        session_id: Uuid,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        self.request_with_headers(
            method,
            uri,
            token,
            body,
            &[(SESSION_HEADER, session_id.to_string())],
        )
        .await
    }

    pub async fn register_client(&self, name: &str, email: &str) -> TestUser {
        self.register(name, email, RegisterRole::Client).await
    }

    pub async fn register_vendor(&self, name: &str, email: &str) -> TestUser {
        self.register(name, email, RegisterRole::Vendor).await
    }

    async fn register(&self, name: &str, email: &str, role: RegisterRole) -> TestUser {
        let created = self
            .state
            .services
            .users
            .register(RegisterInput {
                name: name.to_string(),
                email: email.to_string(),
                password: "a-perfectly-fine-password".to_string(),
                role,
            })
            .await
            .expect("register user");

        let tokens = self
            .state
            .auth
            .open_session(&created.user)
            .await
            .expect("open session");
        TestUser {
            user: created.user,
            tokens,
        }
    }

    /// Admin accounts have no self-registration path; tests insert one
    /// directly.
    pub async fn register_admin(&self, name: &str, email: &str) -> TestUser {
        use chrono::Utc;
        use sea_orm::{ActiveModelTrait, Set};
        use vendora_api::entities::{user, UserRole};

        let now = Utc::now();
        let admin = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(self
                .state
                .auth
                .hash_password("a-perfectly-fine-password")
                .expect("hash password")),
            role: Set(UserRole::Admin),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("insert admin");

        let tokens = self
            .state
            .auth
            .open_session(&admin)
            .await
            .expect("open session");
        TestUser {
            user: admin,
            tokens,
        }
    }

    pub async fn vendor_profile_id(&self, user_id: Uuid) -> Uuid {
        vendor_profile::Entity::find()
            .filter(vendor_profile::Column::UserId.eq(user_id))
            .one(&*self.state.db)
            .await
            .expect("query vendor profile")
            .expect("vendor profile exists")
            .id
    }

    pub async fn client_profile_id(&self, user_id: Uuid) -> Uuid {
        client_profile::Entity::find()
            .filter(client_profile::Column::UserId.eq(user_id))
            .one(&*self.state.db)
            .await
            .expect("query client profile")
            .expect("client profile exists")
            .id
    }

    pub async fn create_category(&self, name: &str) -> CategoryModel {
        self.state
            .services
            .catalog
            .create_category(CreateCategoryInput {
                name: name.to_string(),
                slug: None,
                parent_id: None,
                display_order: None,
            })
            .await
            .expect("create category")
    }

    pub async fn create_shop(&self, vendor: &TestUser, name: &str) -> ShopModel {
        let template = self
            .state
            .services
            .shops
            .list_templates()
            .await
            .expect("templates")
            .into_iter()
            .next()
            .expect("at least one template seeded");

        self.state
            .services
            .shops
            .create_shop(
                vendor.id(),
                CreateShopInput {
                    template_id: template.id,
                    name: name.to_string(),
                    slug: None,
                    description: None,
                    logo_url: None,
                    banner_url: None,
                    primary_color: None,
                },
            )
            .await
            .expect("create shop")
    }

    pub async fn create_product(
        &self,
        vendor: &TestUser,
        shop: &ShopModel,
        category: &CategoryModel,
        name: &str,
        price: Decimal,
        stock: i32,
    ) -> ProductModel {
        self.state
            .services
            .catalog
            .create_product(
                Some(vendor.id()),
                CreateProductInput {
                    shop_id: shop.id,
                    category_id: category.id,
                    name: name.to_string(),
                    description: None,
                    price,
                    stock,
                },
            )
            .await
            .expect("create product")
    }
}
