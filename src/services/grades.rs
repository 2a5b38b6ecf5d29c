use crate::{
    entities::{
        product, seller_grade, shop, GradeTier, Product, SellerGrade, SellerGradeModel, Shop,
        VendorProfileModel,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{shops::ShopService, statistics::StatisticsService},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    entity::prelude::ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, JoinType,
    PaginatorTrait, QueryFilter, QuerySelect, RelationTrait, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Seller grade evaluation and promotion.
///
/// Thresholds are evaluated on demand against live aggregates; nothing is
/// cached and no background job exists. Promotion moves exactly one tier up
/// and only when every condition for that tier holds, which makes repeated
/// calls idempotent.
#[derive(Clone)]
pub struct GradeService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    statistics: StatisticsService,
}

/// Live snapshot of a vendor's standing against the next tier.
#[derive(Debug, Serialize)]
pub struct GradeStatus {
    pub current: SellerGradeModel,
    pub next: Option<SellerGradeModel>,
    pub sales_count: i64,
    pub revenue: Decimal,
    pub tenure_days: i64,
    pub distinct_categories: u64,
    pub shop_count: u64,
    pub eligible_for_promotion: bool,
}

/// Result of an explicit promotion attempt.
#[derive(Debug, Serialize)]
pub struct PromotionOutcome {
    pub promoted: bool,
    pub tier: GradeTier,
}

impl GradeService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        let statistics = StatisticsService::new(db.clone());
        Self {
            db,
            event_sender,
            statistics,
        }
    }

    /// Computes the vendor's standing against the next tier.
    #[instrument(skip(self))]
    pub async fn status_for_user(&self, user_id: Uuid) -> Result<GradeStatus, ServiceError> {
        let vendor = ShopService::vendor_for_user(&*self.db, user_id).await?;
        self.status(&vendor).await
    }

    async fn status(&self, vendor: &VendorProfileModel) -> Result<GradeStatus, ServiceError> {
        let current = SellerGrade::find_by_id(vendor.grade_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Vendor grade missing".to_string()))?;

        let next = match current.tier.next() {
            Some(tier) => SellerGrade::find()
                .filter(seller_grade::Column::Tier.eq(tier))
                .one(&*self.db)
                .await?,
            None => None,
        };

        let totals = self.statistics.totals_for_vendor(vendor.id).await?;
        let tenure_days = (Utc::now() - vendor.enrolled_at).num_days();

        let shop_count = Shop::find()
            .filter(shop::Column::VendorId.eq(vendor.id))
            .count(&*self.db)
            .await?;

        let products = Product::find()
            .join(JoinType::InnerJoin, product::Relation::Shop.def())
            .filter(shop::Column::VendorId.eq(vendor.id))
            .all(&*self.db)
            .await?;
        let distinct_categories = products
            .iter()
            .map(|p| p.category_id)
            .collect::<HashSet<_>>()
            .len() as u64;

        let eligible = match &next {
            Some(target) => {
                totals.sales_count >= target.min_sales
                    && totals.revenue >= target.min_revenue
                    && tenure_days >= target.min_tenure_days
                    && Self::bonus_condition_met(
                        target.tier,
                        distinct_categories,
                        shop_count,
                    )
            }
            None => false,
        };

        Ok(GradeStatus {
            current,
            next,
            sales_count: totals.sales_count,
            revenue: totals.revenue,
            tenure_days,
            distinct_categories,
            shop_count,
            eligible_for_promotion: eligible,
        })
    }

    /// Explicit check-then-apply promotion to the next tier. Returns the tier
    /// the vendor holds afterwards; calling again without new sales is a
    /// no-op.
    #[instrument(skip(self))]
    pub async fn promote_if_eligible(
        &self,
        user_id: Uuid,
    ) -> Result<PromotionOutcome, ServiceError> {
        let vendor = ShopService::vendor_for_user(&*self.db, user_id).await?;
        let status = self.status(&vendor).await?;

        if !status.eligible_for_promotion {
            return Ok(PromotionOutcome {
                promoted: false,
                tier: status.current.tier,
            });
        }

        let next = status
            .next
            .ok_or_else(|| ServiceError::InternalError("Eligible with no next tier".to_string()))?;

        let txn = self.db.begin().await?;
        let mut active: crate::entities::vendor_profile::ActiveModel = vendor.clone().into();
        active.grade_id = Set(next.id);
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::GradePromoted {
                vendor_id: vendor.id,
                old_tier: format!("{:?}", status.current.tier).to_lowercase(),
                new_tier: format!("{:?}", next.tier).to_lowercase(),
            })
            .await;

        info!(
            "Vendor {} promoted from {:?} to {:?}",
            vendor.id, status.current.tier, next.tier
        );
        Ok(PromotionOutcome {
            promoted: true,
            tier: next.tier,
        })
    }

    /// Per-tier bonus conditions on top of the numeric thresholds.
    fn bonus_condition_met(target: GradeTier, distinct_categories: u64, shop_count: u64) -> bool {
        match target {
            GradeTier::Bronze | GradeTier::Silver => true,
            GradeTier::Gold => distinct_categories >= 3,
            GradeTier::Platinum => shop_count >= 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silver_has_no_bonus_condition() {
        assert!(GradeService::bonus_condition_met(GradeTier::Silver, 0, 0));
    }

    #[test]
    fn gold_requires_three_distinct_categories() {
        assert!(!GradeService::bonus_condition_met(GradeTier::Gold, 2, 5));
        assert!(GradeService::bonus_condition_met(GradeTier::Gold, 3, 0));
    }

    #[test]
    fn platinum_requires_two_shops() {
        assert!(!GradeService::bonus_condition_met(GradeTier::Platinum, 9, 1));
        assert!(GradeService::bonus_condition_met(GradeTier::Platinum, 0, 2));
    }
}
