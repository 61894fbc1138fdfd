use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::CommerceConfig,
    db::retry_on_conflict,
    entities::{
        earning::{self, EarningStatus, EarningType},
        entrepreneur,
        order::{self, OrderStatus, PaymentStatus},
        order_item, order_status_history, product, product_variation,
    },
    errors::{CartViolation, ServiceError},
    events::{Event, EventSender},
    services::{
        catalog::{CatalogStore, InventoryStore, SeaOrmCatalog, StockTarget},
        entrepreneurs,
        pricing::{PricingEngine, PricingLine, Quote},
        visibility::{OrderVisibility, Viewer},
    },
};

/// Keys every shipping address snapshot must carry.
pub const REQUIRED_ADDRESS_KEYS: [&str; 5] = ["full_name", "phone", "address", "city", "state"];

const MAX_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartLine {
    pub product_id: Uuid,
    pub variation_id: Option<Uuid>,
    #[validate(range(min = 1, max = 10000, message = "Quantity must be between 1 and 10000"))]
    pub quantity: i32,
    /// Resale price per unit chosen by the entrepreneur
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "Entrepreneur slug is required"))]
    pub entrepreneur_slug: String,
    #[validate(length(min = 1, message = "Cart must contain at least one item"))]
    pub items: Vec<CartLine>,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// An order together with its lines and audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub history: Vec<order_status_history::Model>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// A cart line after catalog resolution.
struct ResolvedLine {
    index: usize,
    product: product::Model,
    variation: Option<product_variation::Model>,
    target: StockTarget,
    quantity: i32,
    unit_price: Decimal,
}

impl ResolvedLine {
    fn pricing_line(&self) -> PricingLine {
        PricingLine {
            product_id: self.product.id,
            variation_id: self.variation.as_ref().map(|v| v.id),
            product_base_price: self.product.base_price,
            price_modifier: self.variation.as_ref().map(|v| v.price_modifier),
            quantity: self.quantity,
            unit_price: self.unit_price,
        }
    }

    fn display_name(&self) -> String {
        match &self.variation {
            Some(v) => format!("{} ({}: {})", self.product.name, v.variation_type, v.variation_value),
            None => self.product.name.clone(),
        }
    }
}

/// Checkout orchestration and the order read side.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<dyn CatalogStore>,
    inventory: Arc<dyn InventoryStore>,
    event_sender: EventSender,
    commerce: CommerceConfig,
}

impl OrderService {
    /// Creates an order service backed by the SQL catalog.
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        commerce: CommerceConfig,
    ) -> Self {
        Self::with_stores(
            db,
            Arc::new(SeaOrmCatalog),
            Arc::new(SeaOrmCatalog),
            event_sender,
            commerce,
        )
    }

    pub fn with_stores(
        db: Arc<DatabaseConnection>,
        catalog: Arc<dyn CatalogStore>,
        inventory: Arc<dyn InventoryStore>,
        event_sender: EventSender,
        commerce: CommerceConfig,
    ) -> Self {
        Self {
            db,
            catalog,
            inventory,
            event_sender,
            commerce,
        }
    }

    /// Converts a cart into a pending order, reserving stock and recording
    /// the entrepreneur's pending earnings. All or nothing.
    ///
    /// Every inventory shortfall, under-cost price and supplier mismatch is
    /// reported together in `ServiceError::CartRejected`.
    #[instrument(skip(self, request), fields(customer_id = %customer_id, entrepreneur = %request.entrepreneur_slug, lines = request.items.len()))]
    pub async fn create_order(
        &self,
        customer_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        request.validate()?;
        validate_cart_lines(&request.items)?;
        validate_shipping_address(&request.shipping_address)?;

        let result = retry_on_conflict("create_order", self.commerce.max_conflict_retries, |_| {
            self.create_order_once(customer_id, &request)
        })
        .await;

        let detail = match result {
            Ok(detail) => detail,
            Err(err) => {
                if let ServiceError::CartRejected(violations) = &err {
                    warn!(violations = violations.len(), "Cart rejected");
                    counter!("payjaro.orders.rejected", 1);
                }
                return Err(err);
            }
        };

        counter!("payjaro.orders.created", 1);
        info!(
            order_id = %detail.order.id,
            order_number = %detail.order.order_number,
            total = %detail.order.total_amount,
            "Order created successfully"
        );

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: detail.order.id,
                order_number: detail.order.order_number.clone(),
                entrepreneur_id: detail.order.entrepreneur_id,
                total_amount: detail.order.total_amount,
            })
            .await;

        Ok(detail)
    }

    async fn create_order_once(
        &self,
        customer_id: Uuid,
        request: &CreateOrderRequest,
    ) -> Result<OrderDetail, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let entrepreneur =
            entrepreneurs::find_active_by_slug(&txn, &request.entrepreneur_slug).await?;

        let (resolved, mut violations) = self.resolve_cart(&txn, &request.items).await?;

        let engine = PricingEngine::new(entrepreneur.commission_rate, self.commerce.shipping_fee);
        let pricing_lines: Vec<PricingLine> = resolved.iter().map(ResolvedLine::pricing_line).collect();
        let quote = match engine.quote(&pricing_lines) {
            Ok(quote) if violations.is_empty() => quote,
            Ok(_) => return Err(reject(violations)),
            Err(pricing_violations) => {
                violations.extend(pricing_violations);
                return Err(reject(violations));
            }
        };

        self.reserve_stock(&txn, &resolved).await?;

        let detail = persist_order(
            &txn,
            customer_id,
            &entrepreneur,
            &resolved,
            &quote,
            request,
            &self.commerce.currency,
        )
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %detail.order.id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        Ok(detail)
    }

    /// Resolves products and variations and checks stock. Missing products
    /// fail immediately; shortfalls and supplier mismatches are collected.
    async fn resolve_cart(
        &self,
        txn: &DatabaseTransaction,
        lines: &[CartLine],
    ) -> Result<(Vec<ResolvedLine>, Vec<CartViolation>), ServiceError> {
        let mut resolved = Vec::with_capacity(lines.len());
        let mut violations = Vec::new();
        let mut supplier_id: Option<Uuid> = None;
        // Units already claimed by earlier lines of the same cart
        let mut claimed: BTreeMap<StockTarget, i32> = BTreeMap::new();

        for (index, line) in lines.iter().enumerate() {
            let product = self
                .catalog
                .active_product(txn, line.product_id)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!(
                        "Product {} not found or inactive",
                        line.product_id
                    ))
                })?;

            let variation = match line.variation_id {
                Some(variation_id) => Some(
                    self.catalog
                        .variation(txn, product.id, variation_id)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Variation {} not found for product {}",
                                variation_id, product.id
                            ))
                        })?,
                ),
                None => None,
            };

            let expected_supplier = *supplier_id.get_or_insert(product.supplier_id);
            if product.supplier_id != expected_supplier {
                violations.push(CartViolation::SupplierMismatch {
                    line: index,
                    product_id: product.id,
                    expected_supplier_id: expected_supplier,
                    supplier_id: product.supplier_id,
                });
            }

            let target = StockTarget::for_line(product.id, line.variation_id);
            let in_stock = self.inventory.available(txn, target).await?;
            let already_claimed = claimed.entry(target).or_insert(0);
            let available = (in_stock - *already_claimed).max(0);
            if available < line.quantity {
                violations.push(CartViolation::InsufficientInventory {
                    line: index,
                    product_id: product.id,
                    variation_id: line.variation_id,
                    available,
                    requested: line.quantity,
                });
            }
            *already_claimed += line.quantity;

            resolved.push(ResolvedLine {
                index,
                product,
                variation,
                target,
                quantity: line.quantity,
                unit_price: line.unit_price,
            });
        }

        Ok((resolved, violations))
    }

    /// Decrements stock per row in a stable order. A row that no longer has
    /// enough units (a concurrent order won the race) rejects the whole cart.
    async fn reserve_stock(
        &self,
        txn: &DatabaseTransaction,
        resolved: &[ResolvedLine],
    ) -> Result<(), ServiceError> {
        let mut demand: BTreeMap<StockTarget, (usize, i32)> = BTreeMap::new();
        for line in resolved {
            let entry = demand.entry(line.target).or_insert((line.index, 0));
            entry.1 += line.quantity;
        }

        let mut shortfalls = Vec::new();
        for (target, (first_line, quantity)) in demand {
            if !self.inventory.decrement(txn, target, quantity).await? {
                let available = self.inventory.available(txn, target).await?;
                let line = &resolved[first_line];
                shortfalls.push(CartViolation::InsufficientInventory {
                    line: first_line,
                    product_id: line.product.id,
                    variation_id: line.variation.as_ref().map(|v| v.id),
                    available,
                    requested: quantity,
                });
            }
        }

        if shortfalls.is_empty() {
            Ok(())
        } else {
            warn!(rows = shortfalls.len(), "Stock changed between check and reservation");
            Err(reject(shortfalls))
        }
    }

    /// Fetches an order the viewer is allowed to see.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, viewer: &Viewer, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db;
        let order = order::Entity::find_by_id(order_id)
            .filter(viewer.scope())
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order from database");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?;

        let history = order_status_history::Entity::find()
            .filter(order_status_history::Column::OrderId.eq(order_id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(db)
            .await?;

        Ok(OrderDetail {
            order,
            items,
            history,
        })
    }

    /// Lists the viewer's orders, newest first. `page` is 1-based.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        viewer: &Viewer,
        page: u64,
        per_page: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db;
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_PER_PAGE);

        let paginator = order::Entity::find()
            .filter(viewer.scope())
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;
        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }
}

fn reject(mut violations: Vec<CartViolation>) -> ServiceError {
    violations.sort_by_key(CartViolation::line);
    ServiceError::CartRejected(violations)
}

async fn persist_order(
    txn: &DatabaseTransaction,
    customer_id: Uuid,
    entrepreneur: &entrepreneur::Model,
    resolved: &[ResolvedLine],
    quote: &Quote,
    request: &CreateOrderRequest,
    currency: &str,
) -> Result<OrderDetail, ServiceError> {
    let now = Utc::now();
    let order_id = Uuid::new_v4();
    // Lines are non-empty here, and every line shares the first line's supplier.
    let supplier_id = resolved
        .first()
        .map(|line| line.product.supplier_id)
        .ok_or_else(|| ServiceError::ValidationError("Cart must contain at least one item".into()))?;

    let order = order::ActiveModel {
        id: Set(order_id),
        order_number: Set(generate_order_number(now)),
        customer_id: Set(customer_id),
        entrepreneur_id: Set(entrepreneur.id),
        supplier_id: Set(supplier_id),
        status: Set(OrderStatus::Pending),
        payment_status: Set(PaymentStatus::Pending),
        payment_method: Set(None),
        subtotal: Set(quote.subtotal),
        markup_amount: Set(quote.markup_amount),
        commission_amount: Set(quote.commission_amount),
        shipping_fee: Set(quote.shipping_fee),
        total_amount: Set(quote.total_amount),
        currency: Set(currency.to_string()),
        shipping_address: Set(request.shipping_address.clone()),
        tracking_number: Set(None),
        notes: Set(request.notes.clone()),
        created_at: Set(now),
        updated_at: Set(now),
        version: Set(1),
    }
    .insert(txn)
    .await
    .map_err(|e| {
        error!(error = %e, order_id = %order_id, "Failed to create order in database");
        ServiceError::DatabaseError(e)
    })?;

    let mut items = Vec::with_capacity(resolved.len());
    for (line, priced) in resolved.iter().zip(quote.lines.iter()) {
        let item = order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product.id),
            variation_id: Set(priced.variation_id),
            product_name: Set(line.display_name()),
            quantity: Set(priced.quantity),
            unit_price: Set(priced.unit_price),
            base_price: Set(priced.base_price),
            markup_amount: Set(priced.markup_amount),
            total_price: Set(priced.total_price),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;
        items.push(item);
    }

    let history = order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(OrderStatus::Pending),
        notes: Set(Some("Order created".to_string())),
        created_by: Set(Some(customer_id)),
        created_at: Set(now),
    }
    .insert(txn)
    .await?;

    for (earning_type, amount) in [
        (EarningType::Markup, quote.markup_amount),
        (EarningType::Commission, quote.commission_amount),
    ] {
        earning::ActiveModel {
            id: Set(Uuid::new_v4()),
            entrepreneur_id: Set(entrepreneur.id),
            order_id: Set(order_id),
            earning_type: Set(earning_type),
            amount: Set(amount),
            status: Set(EarningStatus::Pending),
            payout_date: Set(None),
            created_at: Set(now),
        }
        .insert(txn)
        .await?;
    }

    Ok(OrderDetail {
        order,
        items,
        history: vec![history],
    })
}

/// `PAY{YYYYMMDD}{8 upper-case hex}`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("PAY{}{}", now.format("%Y%m%d"), &suffix[..8])
}

fn validate_cart_lines(lines: &[CartLine]) -> Result<(), ServiceError> {
    for (index, line) in lines.iter().enumerate() {
        line.validate().map_err(|e| {
            ServiceError::ValidationError(format!("items[{}]: {}", index, e))
        })?;
        if line.unit_price <= Decimal::ZERO || line.unit_price.scale() > 2 {
            return Err(ServiceError::ValidationError(format!(
                "items[{}]: unit_price must be positive with at most two decimal places",
                index
            )));
        }
    }
    Ok(())
}

/// The address is stored as an opaque snapshot but must carry the
/// delivery essentials as non-empty strings.
pub fn validate_shipping_address(address: &serde_json::Value) -> Result<(), ServiceError> {
    let object = address.as_object().ok_or_else(|| {
        ServiceError::ValidationError("shipping_address must be an object".to_string())
    })?;

    let missing: Vec<&str> = REQUIRED_ADDRESS_KEYS
        .iter()
        .copied()
        .filter(|key| {
            object
                .get(*key)
                .and_then(|v| v.as_str())
                .map_or(true, |v| v.trim().is_empty())
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "shipping_address is missing: {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn order_number_is_date_stamped() {
        let now = DateTime::parse_from_rfc3339("2024-03-09T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let number = generate_order_number(now);
        assert!(number.starts_with("PAY20240309"));
        assert_eq!(number.len(), 19);
        assert!(number[11..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn shipping_address_requires_delivery_keys() {
        let complete = json!({
            "full_name": "Ada Obi",
            "phone": "+2348000000000",
            "address": "1 Marina",
            "city": "Lagos",
            "state": "Lagos"
        });
        assert!(validate_shipping_address(&complete).is_ok());

        let partial = json!({"full_name": "Ada Obi", "city": " "});
        let err = validate_shipping_address(&partial).unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) if msg.contains("phone") && msg.contains("city"));

        assert!(validate_shipping_address(&json!("Lagos")).is_err());
    }

    #[test]
    fn cart_lines_reject_bad_quantities_and_prices() {
        let line = |quantity, unit_price| CartLine {
            product_id: Uuid::new_v4(),
            variation_id: None,
            quantity,
            unit_price,
        };
        assert!(validate_cart_lines(&[line(1, dec!(10.00))]).is_ok());
        assert!(validate_cart_lines(&[line(0, dec!(10.00))]).is_err());
        assert!(validate_cart_lines(&[line(1, dec!(0))]).is_err());
        assert!(validate_cart_lines(&[line(1, dec!(10.005))]).is_err());
    }
}
