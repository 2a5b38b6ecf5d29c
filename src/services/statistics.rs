use crate::{
    entities::{sales_statistic, SalesStatistic, SalesStatisticModel},
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Upserts one sale into the vendor's daily rollup. Runs on the caller's
/// connection so cart validation can fold it into its transaction: the
/// (vendor_id, date) unique key plus the enclosing transaction make the
/// read-modify-write safe.
pub async fn record_sale(
    conn: &impl ConnectionTrait,
    vendor_id: Uuid,
    date: NaiveDate,
    revenue: Decimal,
) -> Result<SalesStatisticModel, ServiceError> {
    let now = Utc::now();

    let existing = SalesStatistic::find()
        .filter(sales_statistic::Column::VendorId.eq(vendor_id))
        .filter(sales_statistic::Column::Date.eq(date))
        .one(conn)
        .await?;

    let updated = match existing {
        Some(row) => {
            let sales_count = row.sales_count + 1;
            let total_revenue = row.revenue + revenue;
            let mut active: sales_statistic::ActiveModel = row.into();
            active.sales_count = Set(sales_count);
            active.revenue = Set(total_revenue);
            active.updated_at = Set(now);
            active.update(conn).await?
        }
        None => {
            let row = sales_statistic::ActiveModel {
                id: Set(Uuid::new_v4()),
                vendor_id: Set(vendor_id),
                date: Set(date),
                sales_count: Set(1),
                revenue: Set(revenue),
                created_at: Set(now),
                updated_at: Set(now),
            };
            row.insert(conn).await?
        }
    };

    Ok(updated)
}

/// Aggregated lifetime figures for a vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorTotals {
    pub sales_count: i64,
    pub revenue: Decimal,
}

/// Read side of the per-vendor sales rollups.
#[derive(Clone)]
pub struct StatisticsService {
    db: Arc<DatabaseConnection>,
}

impl StatisticsService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Daily rows for a vendor, oldest first, optionally bounded.
    #[instrument(skip(self))]
    pub async fn list_for_vendor(
        &self,
        vendor_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<SalesStatisticModel>, ServiceError> {
        let mut query = SalesStatistic::find()
            .filter(sales_statistic::Column::VendorId.eq(vendor_id))
            .order_by_asc(sales_statistic::Column::Date);

        if let Some(from) = from {
            query = query.filter(sales_statistic::Column::Date.gte(from));
        }
        if let Some(to) = to {
            query = query.filter(sales_statistic::Column::Date.lte(to));
        }

        Ok(query.all(&*self.db).await?)
    }

    /// Lifetime totals, used by grade evaluation.
    #[instrument(skip(self))]
    pub async fn totals_for_vendor(&self, vendor_id: Uuid) -> Result<VendorTotals, ServiceError> {
        let rows = SalesStatistic::find()
            .filter(sales_statistic::Column::VendorId.eq(vendor_id))
            .all(&*self.db)
            .await?;

        let totals = rows.iter().fold(
            VendorTotals {
                sales_count: 0,
                revenue: Decimal::ZERO,
            },
            |acc, row| VendorTotals {
                sales_count: acc.sales_count + row.sales_count,
                revenue: acc.revenue + row.revenue,
            },
        );

        Ok(totals)
    }
}
