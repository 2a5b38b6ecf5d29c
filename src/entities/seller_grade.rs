use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Seller grade tier with promotion thresholds and entitlements. Rows are
/// seeded at startup; `rank` orders the tiers for promotion and template
/// gating.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "seller_grades")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub tier: GradeTier,
    pub rank: i32,
    // Promotion thresholds
    pub min_sales: i64,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub min_revenue: Decimal,
    pub min_tenure_days: i64,
    // Entitlements
    pub max_shops: i32,
    pub max_products_per_shop: i32,
    #[sea_orm(column_type = "Decimal(Some((5, 2)))")]
    pub commission_discount: Decimal,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::vendor_profile::Entity")]
    Vendors,
}

impl Related<super::vendor_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Vendors.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum GradeTier {
    #[sea_orm(string_value = "bronze")]
    Bronze,
    #[sea_orm(string_value = "silver")]
    Silver,
    #[sea_orm(string_value = "gold")]
    Gold,
    #[sea_orm(string_value = "platinum")]
    Platinum,
}

impl GradeTier {
    pub fn rank(&self) -> i32 {
        match self {
            GradeTier::Bronze => 1,
            GradeTier::Silver => 2,
            GradeTier::Gold => 3,
            GradeTier::Platinum => 4,
        }
    }

    /// Next tier up, or `None` at the top.
    pub fn next(&self) -> Option<GradeTier> {
        match self {
            GradeTier::Bronze => Some(GradeTier::Silver),
            GradeTier::Silver => Some(GradeTier::Gold),
            GradeTier::Gold => Some(GradeTier::Platinum),
            GradeTier::Platinum => None,
        }
    }
}
