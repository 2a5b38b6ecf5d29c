use crate::{
    entities::{
        client_profile, seller_grade, user, vendor_profile, ClientProfile, ClientProfileModel,
        GradeTier, SellerGrade, User, UserModel, UserRole, VendorProfile, VendorProfileModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use argon2::{
    password_hash::{rand_core::OsRng, SaltString},
    Argon2, PasswordHasher,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Account registration and profile management. Every user row is created
/// together with its role-specific profile in one transaction; vendors start
/// on the lowest grade with `enrolled_at` stamped at registration.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for registering a new account
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: RegisterRole,
}

/// Self-service registration only covers the two marketplace roles; admin
/// accounts are provisioned out of band.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterRole {
    Client,
    Vendor,
}

impl From<RegisterRole> for UserRole {
    fn from(role: RegisterRole) -> Self {
        match role {
            RegisterRole::Client => UserRole::Client,
            RegisterRole::Vendor => UserRole::Vendor,
        }
    }
}

/// Input for updating the caller's profile; absent fields are left unchanged
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileInput {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub shipping_address: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
}

/// A user together with whichever profile its role carries.
#[derive(Debug, Serialize)]
pub struct UserWithProfile {
    #[serde(flatten)]
    pub user: UserModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_profile: Option<ClientProfileModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_profile: Option<VendorProfileModel>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<UserWithProfile, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let email = input.email.trim().to_lowercase();
        let password_hash = hash_password(&input.password)?;
        let role: UserRole = input.role.into();

        let txn = self.db.begin().await?;

        let taken = User::find()
            .filter(user::Column::Email.eq(email.clone()))
            .one(&txn)
            .await?
            .is_some();
        if taken {
            return Err(ServiceError::Conflict(format!(
                "Email '{}' is already registered",
                email
            )));
        }

        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(role),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut client_profile_row = None;
        let mut vendor_profile_row = None;
        match role {
            UserRole::Client => {
                let profile = client_profile::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(created.id),
                    shipping_address: Set(None),
                    phone: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
                client_profile_row = Some(profile);
            }
            UserRole::Vendor => {
                let starting_grade = SellerGrade::find()
                    .filter(seller_grade::Column::Tier.eq(GradeTier::Bronze))
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::InternalError("Starting grade not seeded".to_string())
                    })?;
                let profile = vendor_profile::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(created.id),
                    tax_id: Set(None),
                    grade_id: Set(starting_grade.id),
                    enrolled_at: Set(now),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
                vendor_profile_row = Some(profile);
            }
            UserRole::Admin => {
                return Err(ServiceError::ValidationError(
                    "Admin accounts cannot self-register".to_string(),
                ));
            }
        }

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(created.id))
            .await;

        info!("Registered {:?} user {}", role, created.id);
        Ok(UserWithProfile {
            user: created,
            client_profile: client_profile_row,
            vendor_profile: vendor_profile_row,
        })
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserModel, ServiceError> {
        User::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, ServiceError> {
        Ok(User::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&*self.db)
            .await?)
    }

    /// The user plus whichever profile its role carries.
    #[instrument(skip(self))]
    pub async fn get_with_profile(&self, user_id: Uuid) -> Result<UserWithProfile, ServiceError> {
        let user_row = self.get_user(user_id).await?;

        let (client_profile_row, vendor_profile_row) = match user_row.role {
            UserRole::Client => (
                ClientProfile::find()
                    .filter(client_profile::Column::UserId.eq(user_id))
                    .one(&*self.db)
                    .await?,
                None,
            ),
            UserRole::Vendor => (
                None,
                VendorProfile::find()
                    .filter(vendor_profile::Column::UserId.eq(user_id))
                    .one(&*self.db)
                    .await?,
            ),
            UserRole::Admin => (None, None),
        };

        Ok(UserWithProfile {
            user: user_row,
            client_profile: client_profile_row,
            vendor_profile: vendor_profile_row,
        })
    }

    /// Updates the caller's name and role-specific profile fields. Fields
    /// that do not apply to the caller's role are rejected rather than
    /// silently dropped.
    #[instrument(skip(self, input))]
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<UserWithProfile, ServiceError> {
        input
            .validate()
            .map_err(|e| ServiceError::ValidationError(e.to_string()))?;

        let user_row = self.get_user(user_id).await?;
        let role = user_row.role;

        match role {
            UserRole::Client if input.tax_id.is_some() => {
                return Err(ServiceError::ValidationError(
                    "tax_id only applies to vendor accounts".to_string(),
                ));
            }
            UserRole::Vendor if input.shipping_address.is_some() || input.phone.is_some() => {
                return Err(ServiceError::ValidationError(
                    "Shipping fields only apply to client accounts".to_string(),
                ));
            }
            _ => {}
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        if let Some(name) = input.name {
            let mut active: user::ActiveModel = user_row.into();
            active.name = Set(name);
            active.updated_at = Set(now);
            active.update(&txn).await?;
        }

        match role {
            UserRole::Client => {
                if input.shipping_address.is_some() || input.phone.is_some() {
                    let profile = ClientProfile::find()
                        .filter(client_profile::Column::UserId.eq(user_id))
                        .one(&txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::InternalError("Client profile missing".to_string())
                        })?;
                    let mut active: client_profile::ActiveModel = profile.into();
                    if let Some(address) = input.shipping_address {
                        active.shipping_address = Set(Some(address));
                    }
                    if let Some(phone) = input.phone {
                        active.phone = Set(Some(phone));
                    }
                    active.updated_at = Set(now);
                    active.update(&txn).await?;
                }
            }
            UserRole::Vendor => {
                if let Some(tax_id) = input.tax_id {
                    let profile = VendorProfile::find()
                        .filter(vendor_profile::Column::UserId.eq(user_id))
                        .one(&txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::InternalError("Vendor profile missing".to_string())
                        })?;
                    let mut active: vendor_profile::ActiveModel = profile.into();
                    active.tax_id = Set(Some(tax_id));
                    active.updated_at = Set(now);
                    active.update(&txn).await?;
                }
            }
            UserRole::Admin => {}
        }

        txn.commit().await?;
        self.get_with_profile(user_id).await
    }

    /// Admin listing, newest first.
    pub async fn list_users(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<UserModel>, u64), ServiceError> {
        let paginator = User::find()
            .order_by_desc(user::Column::CreatedAt)
            .paginate(&*self.db, page_size);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((data, total))
    }

    /// Deactivates an account. Existing tokens die at the next role-gated
    /// check; sessions stop refreshing.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, user_id: Uuid) -> Result<UserModel, ServiceError> {
        let user_row = self.get_user(user_id).await?;
        let mut active: user::ActiveModel = user_row.into();
        active.active = Set(false);
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| ServiceError::HashError(e.to_string()))
}
