use crate::config::AppConfig;
use crate::entities::{self, GradeTier};
use crate::errors::ServiceError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    sea_query::Index, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    PaginatorTrait, Schema, Set,
};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool to the database
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(true);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await?;

    info!("Database connection pool established successfully");

    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Syncs the schema from the entity definitions. The entities are the source
/// of truth for DDL; every table is created with IF NOT EXISTS so reruns are
/// harmless.
pub async fn sync_schema(db: &DbPool) -> Result<(), ServiceError> {
    info!("Syncing database schema from entity definitions");
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    macro_rules! create_table {
        ($entity:expr) => {{
            let mut stmt = schema.create_table_from_entity($entity);
            stmt.if_not_exists();
            db.execute(backend.build(&stmt)).await?;
        }};
    }

    // Parents before children so FK references resolve.
    create_table!(entities::User);
    create_table!(entities::SellerGrade);
    create_table!(entities::ShopTemplate);
    create_table!(entities::ClientProfile);
    create_table!(entities::VendorProfile);
    create_table!(entities::Category);
    create_table!(entities::Shop);
    create_table!(entities::Product);
    create_table!(entities::ProductImage);
    create_table!(entities::Cart);
    create_table!(entities::CartLine);
    create_table!(entities::Message);
    create_table!(entities::SalesStatistic);
    create_table!(entities::Session);

    // The daily rollup upsert keys on (vendor_id, date).
    let mut stats_index = Index::create();
    stats_index
        .name("ux_sales_statistics_vendor_date")
        .table(entities::SalesStatistic)
        .col(entities::sales_statistic::Column::VendorId)
        .col(entities::sales_statistic::Column::Date)
        .unique()
        .if_not_exists();
    db.execute(backend.build(&stats_index)).await?;

    info!("Schema sync complete");
    Ok(())
}

struct GradeSeed {
    tier: GradeTier,
    min_sales: i64,
    min_revenue: Decimal,
    min_tenure_days: i64,
    max_shops: i32,
    max_products_per_shop: i32,
    commission_discount: Decimal,
}

fn grade_seeds() -> Vec<GradeSeed> {
    vec![
        GradeSeed {
            tier: GradeTier::Bronze,
            min_sales: 0,
            min_revenue: dec!(0),
            min_tenure_days: 0,
            max_shops: 1,
            max_products_per_shop: 10,
            commission_discount: dec!(0),
        },
        GradeSeed {
            tier: GradeTier::Silver,
            min_sales: 10,
            min_revenue: dec!(1000),
            min_tenure_days: 30,
            max_shops: 2,
            max_products_per_shop: 50,
            commission_discount: dec!(2.50),
        },
        GradeSeed {
            tier: GradeTier::Gold,
            min_sales: 50,
            min_revenue: dec!(10000),
            min_tenure_days: 90,
            max_shops: 3,
            max_products_per_shop: 200,
            commission_discount: dec!(5.00),
        },
        GradeSeed {
            tier: GradeTier::Platinum,
            min_sales: 200,
            min_revenue: dec!(50000),
            min_tenure_days: 180,
            max_shops: 5,
            max_products_per_shop: 1000,
            commission_discount: dec!(10.00),
        },
    ]
}

const TEMPLATE_SEEDS: [(&str, &str, i32); 4] = [
    ("classic", "Single-column storefront with a product grid", 1),
    ("showcase", "Banner-led layout with featured products", 2),
    ("gallery", "Image-forward layout for visual catalogs", 3),
    ("flagship", "Fully branded multi-section storefront", 4),
];

/// Seeds the grade ladder and the shop template catalog. Idempotent: rows are
/// only inserted when the tables are empty.
pub async fn seed_reference_data(db: &DbPool) -> Result<(), ServiceError> {
    if entities::SellerGrade::find().count(db).await? == 0 {
        info!("Seeding seller grade ladder");
        let rows: Vec<entities::seller_grade::ActiveModel> = grade_seeds()
            .into_iter()
            .map(|seed| entities::seller_grade::ActiveModel {
                id: Set(Uuid::new_v4()),
                tier: Set(seed.tier),
                rank: Set(seed.tier.rank()),
                min_sales: Set(seed.min_sales),
                min_revenue: Set(seed.min_revenue),
                min_tenure_days: Set(seed.min_tenure_days),
                max_shops: Set(seed.max_shops),
                max_products_per_shop: Set(seed.max_products_per_shop),
                commission_discount: Set(seed.commission_discount),
            })
            .collect();
        entities::SellerGrade::insert_many(rows).exec(db).await?;
    }

    if entities::ShopTemplate::find().count(db).await? == 0 {
        info!("Seeding shop template catalog");
        let rows: Vec<entities::shop_template::ActiveModel> = TEMPLATE_SEEDS
            .iter()
            .map(
                |(name, description, required_rank)| entities::shop_template::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    name: Set(name.to_string()),
                    description: Set(Some(description.to_string())),
                    required_rank: Set(*required_rank),
                },
            )
            .collect();
        entities::ShopTemplate::insert_many(rows).exec(db).await?;
    }

    Ok(())
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("Checking database connection");
    pool.ping().await?;
    Ok(())
}
