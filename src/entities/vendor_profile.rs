use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Vendor sub-profile. `enrolled_at` anchors grade tenure checks; `grade_id`
/// only ever moves forward through promotions.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vendor_profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub user_id: Uuid,
    pub tax_id: Option<String>,
    pub grade_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::seller_grade::Entity",
        from = "Column::GradeId",
        to = "super::seller_grade::Column::Id"
    )]
    Grade,
    #[sea_orm(has_many = "super::shop::Entity")]
    Shops,
    #[sea_orm(has_many = "super::sales_statistic::Entity")]
    Statistics,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::seller_grade::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Grade.def()
    }
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shops.def()
    }
}

impl Related<super::sales_statistic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Statistics.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
