use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shopping cart. An `active` cart is mutable; once validated it is the
/// order record and only moves along the documented status edges.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub client_id: Uuid,
    pub status: CartStatus,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub total: Decimal,
    pub shipping_address: Option<String>,
    pub payment_method: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client_profile::Entity",
        from = "Column::ClientId",
        to = "super::client_profile::Column::Id"
    )]
    Client,
    #[sea_orm(has_many = "super::cart_line::Entity")]
    Lines,
}

impl Related<super::client_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::cart_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum CartStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "validated")]
    Validated,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl CartStatus {
    /// The explicit transition table. Everything not listed here is rejected.
    ///
    /// ```text
    /// active -> validated -> shipped -> delivered
    ///   |           |           |
    ///   +--------> cancelled <--+
    /// ```
    pub fn can_transition_to(&self, next: CartStatus) -> bool {
        use CartStatus::*;
        matches!(
            (self, next),
            (Active, Validated)
                | (Active, Cancelled)
                | (Validated, Shipped)
                | (Validated, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
        )
    }

    /// Cancelling from these states must hand reserved stock back.
    pub fn holds_reserved_stock(&self) -> bool {
        matches!(self, CartStatus::Validated | CartStatus::Shipped)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CartStatus::Delivered | CartStatus::Cancelled)
    }
}
