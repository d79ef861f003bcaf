use chrono::{DateTime, Utc};
use metrics::counter;
use rand::Rng;
use sea_orm::{DatabaseConnection, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::config::OrdersConfig;
use crate::entities::order::{
    ActiveModel as OrderActiveModel, FulfillmentStatus, Model as OrderModel, PaymentMethod,
    PaymentStatus,
};
use crate::entities::{order_item, order_note, store};
use crate::errors::ServiceError;
use crate::repositories::catalog_repository::CatalogRepository;
use crate::repositories::is_unique_violation;
use crate::repositories::order_repository::OrderRepository;
use crate::services::commissions::CommissionService;

const ORDER_NUMBER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ORDER_NUMBER_SUFFIX_LEN: usize = 6;
const ORDER_NUMBER_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[validate(length(min = 1, max = 200, message = "Customer name is required"))]
    pub name: String,
    #[validate(email(message = "Customer email is invalid"))]
    pub email: String,
    #[validate(length(min = 1, max = 32, message = "Customer phone is required"))]
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress {
    #[validate(length(min = 1, max = 200, message = "Recipient name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "address1 is required"))]
    pub address1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address2: Option<String>,
    #[validate(length(min = 1, message = "city is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "state is required"))]
    pub state: String,
    #[validate(length(min = 1, max = 16, message = "zip is required"))]
    pub zip: String,
    #[validate(length(min = 1, message = "country is required"))]
    pub country: String,
    #[validate(length(min = 1, max = 32, message = "phone is required"))]
    pub phone: String,
}

/// Cart line as submitted by the storefront. Any client-side price is
/// ignored; unit prices always come from the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[serde(default)]
    pub variant: Option<String>,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate]
    pub customer: Customer,
    #[validate]
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItemInput>,
    /// Shipping charge in minor units
    #[serde(default)]
    #[validate(range(min = 0, message = "shipping must not be negative"))]
    pub shipping: i64,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemView {
    pub product_id: Uuid,
    pub product_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub quantity: i32,
    pub price: i64,
    pub line_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderNoteView {
    pub id: Uuid,
    pub text: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
}

impl From<order_note::Model> for OrderNoteView {
    fn from(note: order_note::Model) -> Self {
        Self {
            id: note.id,
            text: note.text,
            added_by: note.added_by,
            added_at: note.added_at,
        }
    }
}

/// Order as returned to shoppers and staff
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(rename = "orderId")]
    pub order_number: String,
    pub store_id: Uuid,
    pub customer: Customer,
    pub shipping_address: ShippingAddress,
    pub items: Vec<OrderItemView>,
    pub subtotal: i64,
    pub shipping: i64,
    pub total: i64,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_subscription_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_payment_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referral_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<OrderNoteView>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderView {
    pub fn from_parts(
        order: OrderModel,
        items: Vec<order_item::Model>,
        notes: Option<Vec<order_note::Model>>,
    ) -> Self {
        let items = items
            .into_iter()
            .map(|item| OrderItemView {
                line_total: item.line_total(),
                product_id: item.product_id,
                product_name: item.product_name,
                variant: item.variant,
                quantity: item.quantity,
                price: item.price,
            })
            .collect();

        Self {
            id: order.id,
            order_number: order.order_number,
            store_id: order.store_id,
            customer: Customer {
                name: order.customer_name,
                email: order.customer_email,
                phone: order.customer_phone,
            },
            shipping_address: ShippingAddress {
                name: order.ship_name,
                address1: order.ship_address1,
                address2: order.ship_address2,
                city: order.ship_city,
                state: order.ship_state,
                zip: order.ship_zip,
                country: order.ship_country,
                phone: order.ship_phone,
            },
            items,
            subtotal: order.subtotal,
            shipping: order.shipping,
            total: order.total,
            currency: order.currency,
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            fulfillment_status: order.fulfillment_status,
            gateway_order_id: order.gateway_order_id,
            gateway_subscription_id: order.gateway_subscription_id,
            gateway_payment_id: order.gateway_payment_id,
            referral_code: order.referral_code,
            paid_at: order.paid_at,
            notes: notes.map(|n| n.into_iter().map(OrderNoteView::from).collect()),
            created_at: order.created_at,
            updated_at: order.updated_at,
        }
    }
}

/// Loads items (and optionally notes) and assembles the view
pub async fn load_order_view(
    repo: &OrderRepository,
    order: OrderModel,
    with_notes: bool,
) -> Result<OrderView, ServiceError> {
    let items = repo.items(order.id).await?;
    let notes = if with_notes {
        Some(repo.notes(order.id).await?)
    } else {
        None
    };
    Ok(OrderView::from_parts(order, items, notes))
}

/// A cart line after catalog resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub unit_price: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: i64,
    pub shipping: i64,
    pub total: i64,
}

/// `subtotal = Σ unit_price × quantity`, `total = subtotal + shipping`.
/// Overflow and negative inputs are rejected.
pub fn compute_totals(lines: &[PricedLine], shipping: i64) -> Result<OrderTotals, ServiceError> {
    if shipping < 0 {
        return Err(ServiceError::InvalidOrder(
            "shipping must not be negative".into(),
        ));
    }

    let overflow = || ServiceError::InvalidOrder("order amount out of range".into());
    let mut subtotal: i64 = 0;
    for line in lines {
        if line.unit_price < 0 || line.quantity < 1 {
            return Err(ServiceError::InvalidOrder(
                "line price and quantity must be positive".into(),
            ));
        }
        let line_total = line
            .unit_price
            .checked_mul(line.quantity)
            .ok_or_else(overflow)?;
        subtotal = subtotal.checked_add(line_total).ok_or_else(overflow)?;
    }
    let total = subtotal.checked_add(shipping).ok_or_else(overflow)?;

    Ok(OrderTotals {
        subtotal,
        shipping,
        total,
    })
}

/// `ORD-YYYYMMDD-XXXXXX` with six random upper-case alphanumerics
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_NUMBER_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.gen_range(0..ORDER_NUMBER_ALPHABET.len());
            ORDER_NUMBER_ALPHABET[idx] as char
        })
        .collect();
    format!("ORD-{}-{}", now.format("%Y%m%d"), suffix)
}

fn required(value: &str, field: &str) -> Result<String, ServiceError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Service for storefront order creation
#[derive(Clone)]
pub struct OrderService {
    orders: OrderRepository,
    catalog: CatalogRepository,
    commissions: CommissionService,
    default_currency: String,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, config: &OrdersConfig) -> Self {
        let catalog = CatalogRepository::new(db.clone());
        Self {
            orders: OrderRepository::new(db),
            commissions: CommissionService::new(catalog.clone()),
            catalog,
            default_currency: config.default_currency.clone(),
        }
    }

    /// Resolves a storefront slug to an active store
    pub async fn resolve_store(&self, slug: &str) -> Result<store::Model, ServiceError> {
        self.catalog
            .find_active_store(slug)
            .await?
            .ok_or_else(|| ServiceError::StoreNotFound(slug.to_string()))
    }

    /// Creates an order from a storefront cart.
    ///
    /// The order starts `pending/pending`. Order, items and any referral
    /// commission are written in one transaction.
    #[instrument(skip(self, request), fields(store_slug = %store_slug, items = request.items.len()))]
    pub async fn create_order(
        &self,
        store_slug: &str,
        request: CreateOrderRequest,
    ) -> Result<OrderView, ServiceError> {
        let store = self.resolve_store(store_slug).await?;

        if request.items.is_empty() {
            return Err(ServiceError::InvalidOrder(
                "order must contain at least one item".into(),
            ));
        }
        request.validate()?;

        let customer_name = required(&request.customer.name, "customer.name")?;
        let customer_email = required(&request.customer.email, "customer.email")?;
        let customer_phone = required(&request.customer.phone, "customer.phone")?;
        let address = &request.shipping_address;
        let ship_name = required(&address.name, "shippingAddress.name")?;
        let ship_address1 = required(&address.address1, "shippingAddress.address1")?;
        let ship_city = required(&address.city, "shippingAddress.city")?;
        let ship_state = required(&address.state, "shippingAddress.state")?;
        let ship_zip = required(&address.zip, "shippingAddress.zip")?;
        let ship_country = required(&address.country, "shippingAddress.country")?;
        let ship_phone = required(&address.phone, "shippingAddress.phone")?;

        let order_id = Uuid::new_v4();
        let mut priced = Vec::with_capacity(request.items.len());
        let mut item_models = Vec::with_capacity(request.items.len());

        for (position, item) in request.items.iter().enumerate() {
            if item.quantity < 1 {
                return Err(ServiceError::InvalidOrder(format!(
                    "item {} quantity must be at least 1",
                    position + 1
                )));
            }
            let quantity = i32::try_from(item.quantity).map_err(|_| {
                ServiceError::InvalidOrder(format!("item {} quantity is too large", position + 1))
            })?;

            let product = self
                .catalog
                .find_product(store.id, item.product_id)
                .await?
                .ok_or_else(|| ServiceError::ProductNotFound(item.product_id.to_string()))?;
            if !product.active {
                return Err(ServiceError::InvalidOrder(format!(
                    "product {} is not available",
                    product.id
                )));
            }

            let variant = optional(item.variant.clone());
            let unit_price = match &variant {
                Some(name) => {
                    let found = self
                        .catalog
                        .find_variant(product.id, name)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::InvalidOrder(format!(
                                "variant '{}' does not exist for product {}",
                                name, product.id
                            ))
                        })?;
                    found.price.unwrap_or(product.price)
                }
                None => product.price,
            };

            priced.push(PricedLine {
                unit_price,
                quantity: item.quantity,
            });
            item_models.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                position: Set(position as i32),
                product_id: Set(product.id),
                product_name: Set(product.name),
                variant: Set(variant),
                quantity: Set(quantity),
                price: Set(unit_price),
            });
        }

        let totals = compute_totals(&priced, request.shipping)?;
        debug_assert_eq!(totals.total, totals.subtotal + totals.shipping);

        let referral_code = optional(request.referral_code.clone());
        let commission = match &referral_code {
            Some(code) => {
                self.commissions
                    .prepare(store.id, order_id, code, totals.subtotal)
                    .await?
            }
            None => None,
        };

        let currency = if store.currency.trim().is_empty() {
            self.default_currency.clone()
        } else {
            store.currency.clone()
        };

        let now = Utc::now();
        let mut attempt = 0;
        let saved = loop {
            attempt += 1;
            let order_number = generate_order_number(now);
            if self.orders.order_number_exists(store.id, &order_number).await? {
                warn!(%order_number, attempt, "Order number collision, regenerating");
                if attempt >= ORDER_NUMBER_ATTEMPTS {
                    return Err(ServiceError::InternalError(
                        "could not allocate a unique order number".into(),
                    ));
                }
                continue;
            }

            let order = OrderActiveModel {
                id: Set(order_id),
                store_id: Set(store.id),
                order_number: Set(order_number.clone()),
                customer_name: Set(customer_name.clone()),
                customer_email: Set(customer_email.clone()),
                customer_phone: Set(customer_phone.clone()),
                ship_name: Set(ship_name.clone()),
                ship_address1: Set(ship_address1.clone()),
                ship_address2: Set(optional(address.address2.clone())),
                ship_city: Set(ship_city.clone()),
                ship_state: Set(ship_state.clone()),
                ship_zip: Set(ship_zip.clone()),
                ship_country: Set(ship_country.clone()),
                ship_phone: Set(ship_phone.clone()),
                subtotal: Set(totals.subtotal),
                shipping: Set(totals.shipping),
                total: Set(totals.total),
                currency: Set(currency.clone()),
                payment_method: Set(request.payment_method),
                payment_status: Set(PaymentStatus::Pending),
                fulfillment_status: Set(FulfillmentStatus::Pending),
                gateway_order_id: Set(None),
                gateway_subscription_id: Set(None),
                gateway_payment_id: Set(None),
                referral_code: Set(referral_code.clone()),
                paid_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            };

            match self
                .orders
                .insert_with_items(order, item_models.clone(), commission.clone())
                .await
            {
                Ok(saved) => break saved,
                Err(e) if is_unique_violation(&e) && attempt < ORDER_NUMBER_ATTEMPTS => {
                    warn!(%order_number, attempt, "Order number taken concurrently, retrying");
                }
                Err(e) => {
                    error!(error = %e, order_id = %order_id, "Failed to persist order");
                    return Err(e.into());
                }
            }
        };

        counter!(
            "storefront_orders_created_total",
            1,
            "payment_method" => saved.payment_method.to_string()
        );
        info!(
            order_id = %saved.id,
            order_number = %saved.order_number,
            total = saved.total,
            payment_method = %saved.payment_method,
            "Order created"
        );

        load_order_view(&self.orders, saved, false).await
    }
}
