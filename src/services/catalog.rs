use crate::{
    entities::{
        category, product, product_image, shop, vendor_profile, Category, CategoryModel, Product,
        ProductImage, ProductImageModel, ProductModel, ProductStatus, SellerGrade, StockStatus,
        VendorProfile,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Product catalog service: CRUD with ownership and grade gating, the atomic
/// stock guard, view counters and the product image set.
///
/// Mutating methods take `owner`: `Some(user_id)` enforces that the acting
/// vendor owns the product's shop, `None` skips the check (admin callers).
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

/// Input for creating a product
#[derive(Debug, Deserialize)]
pub struct CreateProductInput {
    pub shop_id: Uuid,
    pub category_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub stock: i32,
}

/// Input for updating a product; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProductInput {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub status: Option<ProductStatus>,
}

/// Input for attaching an image
#[derive(Debug, Deserialize)]
pub struct AddImageInput {
    pub url: String,
    pub alt_text: Option<String>,
    pub sort_order: Option<i32>,
}

/// Catalog listing filters
#[derive(Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub shop_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub status: Option<ProductStatus>,
}

/// Input for creating a category
#[derive(Debug, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    pub slug: Option<String>,
    pub parent_id: Option<Uuid>,
    pub display_order: Option<i32>,
}

/// Input for updating a category; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub parent_id: Option<Uuid>,
    pub display_order: Option<i32>,
    pub active: Option<bool>,
}

/// Product with its images and the derived stock classification
#[derive(Debug, Serialize)]
pub struct ProductWithImages {
    #[serde(flatten)]
    pub product: ProductModel,
    pub stock_status: StockStatus,
    pub images: Vec<ProductImageModel>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a product in a shop the actor owns, capped by the owning
    /// vendor's `max_products_per_shop` entitlement.
    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        owner: Option<Uuid>,
        input: CreateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        if input.price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Price must not be negative".to_string(),
            ));
        }
        if input.stock < 0 {
            return Err(ServiceError::ValidationError(
                "Stock must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let shop_row = Self::owned_shop(&txn, owner, input.shop_id).await?;

        let vendor = VendorProfile::find_by_id(shop_row.vendor_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Vendor {} not found", shop_row.vendor_id))
            })?;
        let grade = SellerGrade::find_by_id(vendor.grade_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::InternalError("Vendor grade missing".to_string()))?;

        let product_count = Product::find()
            .filter(product::Column::ShopId.eq(input.shop_id))
            .count(&txn)
            .await?;
        if product_count >= grade.max_products_per_shop as u64 {
            return Err(ServiceError::Forbidden(format!(
                "Shop has reached its product limit of {}",
                grade.max_products_per_shop
            )));
        }

        let now = Utc::now();
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_id: Set(input.shop_id),
            category_id: Set(input.category_id),
            name: Set(input.name),
            description: Set(input.description),
            price: Set(input.price),
            stock: Set(input.stock),
            status: Set(ProductStatus::Active),
            view_count: Set(0),
            sale_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let created = model.insert(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductCreated(created.id))
            .await;

        info!("Created product {} in shop {}", created.id, created.shop_id);
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
        input: UpdateProductInput,
    ) -> Result<ProductModel, ServiceError> {
        if let Some(price) = input.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Price must not be negative".to_string(),
                ));
            }
        }

        let product = self.owned_product(owner, product_id).await?;

        let mut active: product::ActiveModel = product.into();
        if let Some(category_id) = input.category_id {
            active.category_id = Set(category_id);
        }
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(description) = input.description {
            active.description = Set(Some(description));
        }
        if let Some(price) = input.price {
            active.price = Set(price);
        }
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::ProductUpdated(product_id))
            .await;

        Ok(updated)
    }

    /// Deletes a product and its images.
    #[instrument(skip(self))]
    pub async fn delete_product(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.owned_product(owner, product_id).await?;

        let txn = self.db.begin().await?;
        ProductImage::delete_many()
            .filter(product_image::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?;
        Product::delete_by_id(product_id).exec(&txn).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::ProductDeleted(product_id))
            .await;

        info!("Deleted product {}", product_id);
        Ok(())
    }

    /// Fetches a product with its images and computed stock classification.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductWithImages, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let images = ProductImage::find()
            .filter(product_image::Column::ProductId.eq(product_id))
            .order_by_asc(product_image::Column::SortOrder)
            .all(&*self.db)
            .await?;

        Ok(ProductWithImages {
            stock_status: product.stock_status(),
            product,
            images,
        })
    }

    pub async fn list_products(
        &self,
        filter: ProductFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let mut query = Product::find().order_by_desc(product::Column::CreatedAt);

        if let Some(shop_id) = filter.shop_id {
            query = query.filter(product::Column::ShopId.eq(shop_id));
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(product::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db, page_size);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    /// Atomically takes `quantity` units off the shelf. The conditional
    /// UPDATE is the whole concurrency story: under racing calls at most one
    /// caller wins the last units and stock never goes negative.
    #[instrument(skip(self))]
    pub async fn reserve_stock(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }
        self.owned_product(owner, product_id).await?;

        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).sub(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .filter(product::Column::Stock.gte(quantity))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            // Distinguish missing product from insufficient stock
            let exists = Product::find_by_id(product_id).one(&*self.db).await?;
            return match exists {
                None => Err(ServiceError::NotFound(format!(
                    "Product {} not found",
                    product_id
                ))),
                Some(p) => Err(ServiceError::InsufficientStock(format!(
                    "Product {} has {} in stock, {} requested",
                    product_id, p.stock, quantity
                ))),
            };
        }

        self.event_sender
            .send_or_log(Event::StockReserved {
                product_id,
                quantity,
            })
            .await;

        Ok(())
    }

    /// Returns `quantity` units to the shelf.
    #[instrument(skip(self))]
    pub async fn release_stock(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }
        self.owned_product(owner, product_id).await?;

        let result = Product::update_many()
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(quantity),
            )
            .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product::Column::Id.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }

        self.event_sender
            .send_or_log(Event::StockReleased {
                product_id,
                quantity,
            })
            .await;

        Ok(())
    }

    /// Bumps the product view counter. Fire-and-forget semantics: missing
    /// products are a 404, nothing else can fail.
    pub async fn record_view(&self, product_id: Uuid) -> Result<(), ServiceError> {
        let result = Product::update_many()
            .col_expr(
                product::Column::ViewCount,
                Expr::col(product::Column::ViewCount).add(1),
            )
            .filter(product::Column::Id.eq(product_id))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                product_id
            )));
        }
        Ok(())
    }

    /// Attaches an image. The first image of a product becomes primary
    /// automatically, so the exactly-one-primary invariant holds from the
    /// first insert.
    #[instrument(skip(self, input))]
    pub async fn add_image(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
        input: AddImageInput,
    ) -> Result<ProductImageModel, ServiceError> {
        self.owned_product(owner, product_id).await?;

        let txn = self.db.begin().await?;

        let has_primary = ProductImage::find()
            .filter(product_image::Column::ProductId.eq(product_id))
            .filter(product_image::Column::IsPrimary.eq(true))
            .one(&txn)
            .await?
            .is_some();

        let image = product_image::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            url: Set(input.url),
            alt_text: Set(input.alt_text),
            sort_order: Set(input.sort_order.unwrap_or(0)),
            is_primary: Set(!has_primary),
        };
        let created = image.insert(&txn).await?;

        txn.commit().await?;
        Ok(created)
    }

    /// Makes `image_id` the primary image, clearing the previous primary in
    /// the same transaction.
    #[instrument(skip(self))]
    pub async fn set_primary_image(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
        image_id: Uuid,
    ) -> Result<ProductImageModel, ServiceError> {
        self.owned_product(owner, product_id).await?;

        let txn = self.db.begin().await?;

        let image = ProductImage::find_by_id(image_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Image {} not found", image_id)))?;
        if image.product_id != product_id {
            return Err(ServiceError::InvalidOperation(
                "Image does not belong to this product".to_string(),
            ));
        }

        ProductImage::update_many()
            .col_expr(product_image::Column::IsPrimary, Expr::value(false))
            .filter(product_image::Column::ProductId.eq(product_id))
            .filter(product_image::Column::IsPrimary.eq(true))
            .exec(&txn)
            .await?;

        let mut active: product_image::ActiveModel = image.into();
        active.is_primary = Set(true);
        let updated = active.update(&txn).await?;

        txn.commit().await?;
        Ok(updated)
    }

    /// Removes an image. Deleting the primary promotes the next image by
    /// sort order, so exactly one primary survives while any image exists.
    #[instrument(skip(self))]
    pub async fn remove_image(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
        image_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.owned_product(owner, product_id).await?;

        let txn = self.db.begin().await?;

        let image = ProductImage::find_by_id(image_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Image {} not found", image_id)))?;
        if image.product_id != product_id {
            return Err(ServiceError::InvalidOperation(
                "Image does not belong to this product".to_string(),
            ));
        }

        let was_primary = image.is_primary;
        ProductImage::delete_by_id(image_id).exec(&txn).await?;

        if was_primary {
            let next = ProductImage::find()
                .filter(product_image::Column::ProductId.eq(product_id))
                .order_by_asc(product_image::Column::SortOrder)
                .one(&txn)
                .await?;

            if let Some(next) = next {
                let mut active: product_image::ActiveModel = next.into();
                active.is_primary = Set(true);
                active.update(&txn).await?;
            }
        }

        txn.commit().await?;
        Ok(())
    }

    pub async fn list_images(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<ProductImageModel>, ServiceError> {
        Ok(ProductImage::find()
            .filter(product_image::Column::ProductId.eq(product_id))
            .order_by_asc(product_image::Column::SortOrder)
            .all(&*self.db)
            .await?)
    }

    /// Creates a category. Admin-only at the routing layer.
    #[instrument(skip(self, input))]
    pub async fn create_category(
        &self,
        input: CreateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Category name must not be empty".to_string(),
            ));
        }
        if let Some(parent_id) = input.parent_id {
            Category::find_by_id(parent_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Category {} not found", parent_id))
                })?;
        }

        let slug = input
            .slug
            .unwrap_or_else(|| crate::services::shops::slugify(&input.name));
        if slug.is_empty() {
            return Err(ServiceError::ValidationError(
                "Category name does not reduce to a usable slug".to_string(),
            ));
        }
        let taken = Category::find()
            .filter(category::Column::Slug.eq(slug.clone()))
            .one(&*self.db)
            .await?
            .is_some();
        if taken {
            return Err(ServiceError::Conflict(format!(
                "Category slug '{}' is already taken",
                slug
            )));
        }

        let now = Utc::now();
        let created = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name),
            slug: Set(slug),
            parent_id: Set(input.parent_id),
            display_order: Set(input.display_order.unwrap_or(0)),
            active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!("Created category {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self, input))]
    pub async fn update_category(
        &self,
        category_id: Uuid,
        input: UpdateCategoryInput,
    ) -> Result<CategoryModel, ServiceError> {
        let row = Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Category {} not found", category_id))
            })?;

        if let Some(parent_id) = input.parent_id {
            if parent_id == category_id {
                return Err(ServiceError::ValidationError(
                    "A category cannot be its own parent".to_string(),
                ));
            }
            Category::find_by_id(parent_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Category {} not found", parent_id))
                })?;
        }

        let mut active: category::ActiveModel = row.into();
        if let Some(name) = input.name {
            active.name = Set(name);
        }
        if let Some(parent_id) = input.parent_id {
            active.parent_id = Set(Some(parent_id));
        }
        if let Some(display_order) = input.display_order {
            active.display_order = Set(display_order);
        }
        if let Some(flag) = input.active {
            active.active = Set(flag);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    /// Deletes a category. Refused while products or child categories still
    /// reference it.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, category_id: Uuid) -> Result<(), ServiceError> {
        let product_count = Product::find()
            .filter(product::Column::CategoryId.eq(category_id))
            .count(&*self.db)
            .await?;
        if product_count > 0 {
            return Err(ServiceError::Conflict(format!(
                "Category still has {} products",
                product_count
            )));
        }

        let child_count = Category::find()
            .filter(category::Column::ParentId.eq(category_id))
            .count(&*self.db)
            .await?;
        if child_count > 0 {
            return Err(ServiceError::Conflict(format!(
                "Category still has {} child categories",
                child_count
            )));
        }

        let result = Category::delete_by_id(category_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Category {} not found",
                category_id
            )));
        }
        Ok(())
    }

    pub async fn get_category(&self, category_id: Uuid) -> Result<CategoryModel, ServiceError> {
        Category::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    /// All categories in display order; inactive ones included so admin
    /// tooling can see them.
    pub async fn list_categories(&self) -> Result<Vec<CategoryModel>, ServiceError> {
        Ok(Category::find()
            .order_by_asc(category::Column::DisplayOrder)
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?)
    }

    async fn owned_product(
        &self,
        owner: Option<Uuid>,
        product_id: Uuid,
    ) -> Result<ProductModel, ServiceError> {
        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        Self::owned_shop(&*self.db, owner, product.shop_id).await?;
        Ok(product)
    }

    /// Loads a shop and, when `owner` is given, checks the acting user is its
    /// vendor.
    async fn owned_shop(
        conn: &impl ConnectionTrait,
        owner: Option<Uuid>,
        shop_id: Uuid,
    ) -> Result<shop::Model, ServiceError> {
        let shop_row = shop::Entity::find_by_id(shop_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Shop {} not found", shop_id)))?;

        if let Some(user_id) = owner {
            let vendor = VendorProfile::find()
                .filter(vendor_profile::Column::UserId.eq(user_id))
                .one(conn)
                .await?
                .ok_or_else(|| {
                    ServiceError::Forbidden("Acting user has no vendor profile".to_string())
                })?;

            if shop_row.vendor_id != vendor.id {
                return Err(ServiceError::Forbidden(
                    "Shop belongs to another vendor".to_string(),
                ));
            }
        }

        Ok(shop_row)
    }
}
