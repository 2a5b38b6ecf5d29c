use crate::{
    entities::{
        cart, cart_line, product, shop, Cart, CartLine, CartModel, CartStatus, Product,
        ProductStatus,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::statistics,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    EntityTrait, JoinType, ModelTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service.
///
/// A cart doubles as the order record: while `active` it is a mutable
/// scratchpad, and `validate_cart` turns it into an order in one transaction
/// (stock decremented, statistics recorded, totals frozen). After that it only
/// moves along the status machine in [`CartStatus::can_transition_to`].
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Creates a new cart for a client. Clients may hold several carts.
    #[instrument(skip(self))]
    pub async fn create_cart(&self, client_id: Uuid) -> Result<CartModel, ServiceError> {
        let cart_id = Uuid::new_v4();
        let now = Utc::now();

        let cart = cart::ActiveModel {
            id: Set(cart_id),
            client_id: Set(client_id),
            status: Set(CartStatus::Active),
            total: Set(Decimal::ZERO),
            shipping_address: Set(None),
            payment_method: Set(None),
            validated_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let cart = cart.insert(&*self.db).await?;

        self.event_sender
            .send_or_log(Event::CartCreated(cart_id))
            .await;

        info!("Created cart: {}", cart_id);
        Ok(cart)
    }

    /// Adds a product to the cart, or merges into the existing line for that
    /// product. Stock is checked against the merged quantity; the line keeps
    /// the product price current at this computation.
    #[instrument(skip(self))]
    pub async fn add_product(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartModel, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let cart = Self::active_cart(&txn, cart_id).await?;

        let product = Product::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if product.status != ProductStatus::Active {
            return Err(ServiceError::InvalidOperation(format!(
                "Product {} is not available",
                product_id
            )));
        }

        let existing_line = CartLine::find()
            .filter(cart_line::Column::CartId.eq(cart_id))
            .filter(cart_line::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let requested_total = existing_line
            .as_ref()
            .map(|line| line.quantity + quantity)
            .unwrap_or(quantity);

        if product.stock < requested_total {
            return Err(ServiceError::InsufficientStock(format!(
                "Product {} has {} in stock, {} requested",
                product_id, product.stock, requested_total
            )));
        }

        if let Some(line) = existing_line {
            let mut line: cart_line::ActiveModel = line.into();
            line.quantity = Set(requested_total);
            line.unit_price = Set(product.price);
            line.line_total = Set(product.price * Decimal::from(requested_total));
            line.updated_at = Set(Utc::now());
            line.update(&txn).await?;
        } else {
            let line = cart_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                cart_id: Set(cart_id),
                product_id: Set(product_id),
                quantity: Set(quantity),
                unit_price: Set(product.price),
                line_total: Set(product.price * Decimal::from(quantity)),
                created_at: Set(Utc::now()),
                updated_at: Set(Utc::now()),
            };
            line.insert(&txn).await?;
        }

        let updated_cart = Self::recalculate_cart_total(&txn, cart.id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartLineAdded {
                cart_id,
                product_id,
                quantity,
            })
            .await;

        info!(
            "Added product to cart {}: product {} x{}",
            cart_id, product_id, quantity
        );
        Ok(updated_cart)
    }

    /// Updates a line's quantity. Zero removes the line; positive quantities
    /// re-check stock.
    #[instrument(skip(self))]
    pub async fn update_line_quantity(
        &self,
        cart_id: Uuid,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<CartModel, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must not be negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        Self::active_cart(&txn, cart_id).await?;

        let line = CartLine::find_by_id(line_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart line {} not found", line_id)))?;

        if line.cart_id != cart_id {
            return Err(ServiceError::InvalidOperation(
                "Line does not belong to this cart".to_string(),
            ));
        }

        if quantity == 0 {
            CartLine::delete_by_id(line_id).exec(&txn).await?;
        } else {
            let product = Product::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            if product.stock < quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Product {} has {} in stock, {} requested",
                    product.id, product.stock, quantity
                )));
            }

            let unit_price = line.unit_price;
            let mut line: cart_line::ActiveModel = line.into();
            line.quantity = Set(quantity);
            line.line_total = Set(unit_price * Decimal::from(quantity));
            line.updated_at = Set(Utc::now());
            line.update(&txn).await?;
        }

        let updated_cart = Self::recalculate_cart_total(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartLineUpdated { cart_id, line_id })
            .await;

        Ok(updated_cart)
    }

    /// Removes a line from an active cart.
    #[instrument(skip(self))]
    pub async fn remove_line(
        &self,
        cart_id: Uuid,
        line_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let txn = self.db.begin().await?;

        Self::active_cart(&txn, cart_id).await?;

        let line = CartLine::find_by_id(line_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart line {} not found", line_id)))?;

        if line.cart_id != cart_id {
            return Err(ServiceError::InvalidOperation(
                "Line does not belong to this cart".to_string(),
            ));
        }

        line.delete(&txn).await?;

        let updated_cart = Self::recalculate_cart_total(&txn, cart_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartLineRemoved { cart_id, line_id })
            .await;

        Ok(updated_cart)
    }

    /// Retrieves a cart with all its lines.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, cart_id: Uuid) -> Result<CartWithLines, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let lines = cart.find_related(CartLine).all(&*self.db).await?;

        Ok(CartWithLines { cart, lines })
    }

    pub async fn get_cart_model(&self, cart_id: Uuid) -> Result<CartModel, ServiceError> {
        Cart::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }

    /// Lists carts for a client, newest first.
    pub async fn list_carts_for_client(
        &self,
        client_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<CartModel>, u64), ServiceError> {
        let paginator = Cart::find()
            .filter(cart::Column::ClientId.eq(client_id))
            .order_by_desc(cart::Column::CreatedAt)
            .paginate(&*self.db, page_size);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    /// Lists validated (and later) carts containing the vendor's products.
    /// This is the vendor's order view.
    pub async fn list_orders_for_vendor(
        &self,
        vendor_id: Uuid,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<CartModel>, u64), ServiceError> {
        let paginator = Cart::find()
            .filter(cart::Column::Status.ne(CartStatus::Active))
            .join(JoinType::InnerJoin, cart::Relation::Lines.def())
            .join(JoinType::InnerJoin, cart_line::Relation::Product.def())
            .join(JoinType::InnerJoin, product::Relation::Shop.def())
            .filter(shop::Column::VendorId.eq(vendor_id))
            .distinct()
            .order_by_desc(cart::Column::UpdatedAt)
            .paginate(&*self.db, page_size);

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    /// Whether any line in the cart comes from one of the vendor's shops.
    /// Vendors may only drive the lifecycle of orders they are part of.
    pub async fn cart_involves_vendor(
        &self,
        cart_id: Uuid,
        vendor_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let count = CartLine::find()
            .filter(cart_line::Column::CartId.eq(cart_id))
            .join(JoinType::InnerJoin, cart_line::Relation::Product.def())
            .join(JoinType::InnerJoin, product::Relation::Shop.def())
            .filter(shop::Column::VendorId.eq(vendor_id))
            .count(&*self.db)
            .await?;

        Ok(count > 0)
    }

    /// Validates a cart: re-checks every line, reserves stock with a guarded
    /// conditional decrement, records per-vendor daily statistics, bumps sale
    /// counters and stamps the cart — all in one transaction. Any failing line
    /// rolls the whole thing back.
    #[instrument(skip(self, shipping_address, payment_method))]
    pub async fn validate_cart(
        &self,
        cart_id: Uuid,
        shipping_address: String,
        payment_method: String,
    ) -> Result<CartModel, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Self::active_cart(&txn, cart_id).await?;

        let lines = CartLine::find()
            .filter(cart_line::Column::CartId.eq(cart_id))
            .all(&txn)
            .await?;

        if lines.is_empty() {
            return Err(ServiceError::InvalidOperation(
                "Cannot validate an empty cart".to_string(),
            ));
        }

        // One sale per vendor per validation; revenue summed per vendor.
        let mut vendor_revenue: HashMap<Uuid, Decimal> = HashMap::new();
        let mut shops_hit: HashSet<Uuid> = HashSet::new();
        let mut total = Decimal::ZERO;

        for line in &lines {
            let product = Product::find_by_id(line.product_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Product {} not found", line.product_id))
                })?;

            if product.status != ProductStatus::Active {
                return Err(ServiceError::InvalidOperation(format!(
                    "Product {} is no longer available",
                    product.id
                )));
            }

            // Guarded decrement: the WHERE clause makes the reservation atomic
            // under concurrent validations.
            let result = Product::update_many()
                .col_expr(
                    product::Column::Stock,
                    Expr::col(product::Column::Stock).sub(line.quantity),
                )
                .col_expr(
                    product::Column::SaleCount,
                    Expr::col(product::Column::SaleCount).add(line.quantity),
                )
                .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(product::Column::Id.eq(product.id))
                .filter(product::Column::Stock.gte(line.quantity))
                .exec(&txn)
                .await?;

            if result.rows_affected == 0 {
                return Err(ServiceError::InsufficientStock(format!(
                    "Product {} has insufficient stock for quantity {}",
                    product.id, line.quantity
                )));
            }

            let shop_row = shop::Entity::find_by_id(product.shop_id)
                .one(&txn)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("Shop {} not found", product.shop_id))
                })?;

            *vendor_revenue
                .entry(shop_row.vendor_id)
                .or_insert(Decimal::ZERO) += line.line_total;
            shops_hit.insert(shop_row.id);
            total += line.line_total;
        }

        for shop_id in &shops_hit {
            shop::Entity::update_many()
                .col_expr(
                    shop::Column::SaleCount,
                    Expr::col(shop::Column::SaleCount).add(1),
                )
                .col_expr(shop::Column::UpdatedAt, Expr::value(Utc::now()))
                .filter(shop::Column::Id.eq(*shop_id))
                .exec(&txn)
                .await?;
        }

        let today = Utc::now().date_naive();
        for (vendor_id, revenue) in &vendor_revenue {
            statistics::record_sale(&txn, *vendor_id, today, *revenue).await?;
        }

        let now = Utc::now();
        let client_id = cart.client_id;
        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::Validated);
        active.total = Set(total);
        active.shipping_address = Set(Some(shipping_address));
        active.payment_method = Set(Some(payment_method));
        active.validated_at = Set(Some(now));
        active.updated_at = Set(now);
        let validated = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartValidated {
                cart_id,
                client_id,
                total,
            })
            .await;

        info!("Validated cart {}: total={}", cart_id, total);
        Ok(validated)
    }

    /// Moves a cart along the status machine. Rejected edges leave the cart
    /// untouched. Cancelling a cart that holds reserved stock hands the
    /// reserved quantities back inside the same transaction.
    ///
    /// The `active -> validated` edge is not reachable here: it reserves
    /// stock, freezes totals and records statistics, so it only happens
    /// through [`Self::validate_cart`].
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        cart_id: Uuid,
        new_status: CartStatus,
    ) -> Result<CartModel, ServiceError> {
        let txn = self.db.begin().await?;

        let cart = Cart::find_by_id(cart_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        let old_status = cart.status;
        if old_status == CartStatus::Active && new_status == CartStatus::Validated {
            return Err(ServiceError::InvalidTransition(
                "Carts become validated through validation, not a status write".to_string(),
            ));
        }
        if !old_status.can_transition_to(new_status) {
            return Err(ServiceError::InvalidTransition(format!(
                "Cannot move cart from {:?} to {:?}",
                old_status, new_status
            )));
        }

        if new_status == CartStatus::Cancelled && old_status.holds_reserved_stock() {
            let lines = CartLine::find()
                .filter(cart_line::Column::CartId.eq(cart_id))
                .all(&txn)
                .await?;

            for line in &lines {
                Product::update_many()
                    .col_expr(
                        product::Column::Stock,
                        Expr::col(product::Column::Stock).add(line.quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(line.product_id))
                    .exec(&txn)
                    .await?;
            }
        }

        let mut active: cart::ActiveModel = cart.into();
        active.status = Set(new_status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartStatusChanged {
                cart_id,
                old_status: format!("{:?}", old_status).to_lowercase(),
                new_status: format!("{:?}", new_status).to_lowercase(),
            })
            .await;

        info!(
            "Cart {} moved from {:?} to {:?}",
            cart_id, old_status, new_status
        );
        Ok(updated)
    }

    async fn active_cart(
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let cart = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

        if cart.status != CartStatus::Active {
            return Err(ServiceError::InvalidOperation(
                "Cart is not active".to_string(),
            ));
        }

        Ok(cart)
    }

    /// Recomputes the cached total as the sum of line totals.
    async fn recalculate_cart_total(
        conn: &impl ConnectionTrait,
        cart_id: Uuid,
    ) -> Result<CartModel, ServiceError> {
        let lines = CartLine::find()
            .filter(cart_line::Column::CartId.eq(cart_id))
            .all(conn)
            .await?;

        let total: Decimal = lines.iter().map(|line| line.line_total).sum();

        let mut cart: cart::ActiveModel = Cart::find_by_id(cart_id)
            .one(conn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?
            .into();

        cart.total = Set(total);
        cart.updated_at = Set(Utc::now());

        Ok(cart.update(conn).await?)
    }
}

/// Cart with its lines
#[derive(Debug, Serialize)]
pub struct CartWithLines {
    pub cart: CartModel,
    pub lines: Vec<cart_line::Model>,
}

/// Input for validating (ordering) a cart
#[derive(Debug, Deserialize)]
pub struct ValidateCartInput {
    pub shipping_address: String,
    pub payment_method: String,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn line_total_is_quantity_times_unit_price() {
        let unit_price = dec!(25.50);
        let quantity = 3;
        assert_eq!(unit_price * Decimal::from(quantity), dec!(76.50));
    }

    #[test]
    fn cart_total_is_sum_of_line_totals() {
        let line_totals = [dec!(25.00), dec!(35.50), dec!(14.50)];
        let total: Decimal = line_totals.iter().sum();
        assert_eq!(total, dec!(75.00));
    }

    #[test]
    fn merged_quantity_is_checked_against_stock() {
        let stock = 10;
        let existing = 7;
        let added = 5;
        assert!(stock < existing + added);
    }
}
