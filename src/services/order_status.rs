use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::config::OrdersConfig;
use crate::entities::order::{FulfillmentStatus, Model as OrderModel, PaymentStatus};
use crate::errors::ServiceError;
use crate::repositories::order_repository::{
    OrderListFilter, OrderRepository, StaffUpdateOutcome,
};
use crate::services::orders::{load_order_view, OrderNoteView, OrderView};

const MAX_NOTE_CHARS: usize = 2000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOrderStatusRequest {
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default)]
    pub fulfillment_status: Option<FulfillmentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddNoteRequest {
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ListOrdersQuery {
    /// 1-based page number
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderPage {
    pub orders: Vec<OrderView>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Fulfillment moves forward only: `pending -> fulfilled | cancelled`,
/// `fulfilled -> shipped | cancelled`. `shipped` and `cancelled` are terminal.
pub fn is_valid_fulfillment_transition(from: FulfillmentStatus, to: FulfillmentStatus) -> bool {
    use crate::entities::order::FulfillmentStatus::*;
    matches!(
        (from, to),
        (Pending, Fulfilled) | (Pending, Cancelled) | (Fulfilled, Shipped) | (Fulfilled, Cancelled)
    )
}

/// Trims a staff note and enforces 1..=2000 characters
pub fn normalize_note(text: &str) -> Result<String, ServiceError> {
    let trimmed = text.trim();
    let chars = trimmed.chars().count();
    if chars == 0 {
        return Err(ServiceError::ValidationError("note text is required".into()));
    }
    if chars > MAX_NOTE_CHARS {
        return Err(ServiceError::ValidationError(format!(
            "note text must be at most {} characters",
            MAX_NOTE_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// Staff-side order operations: status changes, notes and reads
#[derive(Clone)]
pub struct OrderStatusService {
    orders: OrderRepository,
    allow_any_fulfillment_transition: bool,
    default_page_size: u64,
    max_page_size: u64,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>, config: &OrdersConfig) -> Self {
        Self {
            orders: OrderRepository::new(db),
            allow_any_fulfillment_transition: config.allow_any_fulfillment_transition,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    async fn load(&self, store_id: Uuid, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        self.orders
            .find_in_store(store_id, order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))
    }

    fn fulfillment_allowed(&self, from: FulfillmentStatus, to: FulfillmentStatus) -> bool {
        self.allow_any_fulfillment_transition || is_valid_fulfillment_transition(from, to)
    }

    /// Applies a staff status change.
    ///
    /// Staff may only request `refunded`, and only from `paid`. Fulfillment
    /// follows the transition table unless the permissive switch is on.
    /// Both requested changes are checked first and then written in one
    /// transaction, so a lost race leaves the order untouched.
    #[instrument(skip(self, request), fields(store_id = %store_id, order_id = %order_id, actor = %actor))]
    pub async fn update_status(
        &self,
        store_id: Uuid,
        order_id: Uuid,
        request: UpdateOrderStatusRequest,
        actor: &str,
    ) -> Result<OrderView, ServiceError> {
        if request.payment_status.is_none() && request.fulfillment_status.is_none() {
            return Err(ServiceError::ValidationError(
                "paymentStatus or fulfillmentStatus is required".into(),
            ));
        }

        let order = self.load(store_id, order_id).await?;

        if let Some(requested) = request.payment_status {
            if requested != PaymentStatus::Refunded {
                return Err(ServiceError::Conflict(format!(
                    "payment status '{}' is set by payment verification only",
                    requested
                )));
            }
            if order.payment_status != PaymentStatus::Paid {
                return Err(ServiceError::Conflict(format!(
                    "cannot refund an order whose payment is {}",
                    order.payment_status
                )));
            }
        }

        let fulfillment_change = match request.fulfillment_status {
            Some(next) if next == order.fulfillment_status => None,
            Some(next) => {
                if !self.fulfillment_allowed(order.fulfillment_status, next) {
                    return Err(ServiceError::Conflict(format!(
                        "cannot move fulfillment from {} to {}",
                        order.fulfillment_status, next
                    )));
                }
                Some((order.fulfillment_status, next))
            }
            None => None,
        };

        let refund = request.payment_status.is_some();
        match self
            .orders
            .apply_staff_update(order.id, refund, fulfillment_change)
            .await?
        {
            StaffUpdateOutcome::Applied => {}
            StaffUpdateOutcome::PaymentChanged => {
                warn!("Refund lost a race with another update");
                return Err(ServiceError::Conflict(
                    "order payment changed concurrently".into(),
                ));
            }
            StaffUpdateOutcome::FulfillmentChanged => {
                warn!("Fulfillment update lost a race with another update");
                return Err(ServiceError::Conflict(
                    "order fulfillment changed concurrently".into(),
                ));
            }
        }

        if refund {
            info!(from = %order.payment_status, to = %PaymentStatus::Refunded, "Payment status updated");
        }
        if let Some((from, to)) = fulfillment_change {
            info!(%from, %to, "Fulfillment status updated");
        }

        let updated = self.load(store_id, order_id).await?;
        load_order_view(&self.orders, updated, true).await
    }

    /// Appends a staff note
    #[instrument(skip(self, text), fields(store_id = %store_id, order_id = %order_id, actor = %actor))]
    pub async fn add_note(
        &self,
        store_id: Uuid,
        order_id: Uuid,
        text: &str,
        actor: &str,
    ) -> Result<OrderNoteView, ServiceError> {
        let text = normalize_note(text)?;
        let order = self.load(store_id, order_id).await?;
        let note = self
            .orders
            .add_note(order.id, text, actor.to_string())
            .await?;
        info!(note_id = %note.id, "Note added");
        Ok(note.into())
    }

    /// Single order with items and notes
    #[instrument(skip(self), fields(store_id = %store_id, order_id = %order_id))]
    pub async fn get_order(&self, store_id: Uuid, order_id: Uuid) -> Result<OrderView, ServiceError> {
        let order = self.load(store_id, order_id).await?;
        load_order_view(&self.orders, order, true).await
    }

    /// Newest-first page of a store's orders
    #[instrument(skip(self, query), fields(store_id = %store_id))]
    pub async fn list_orders(
        &self,
        store_id: Uuid,
        query: ListOrdersQuery,
    ) -> Result<OrderPage, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);
        let filter = OrderListFilter {
            payment_status: query.payment_status,
            fulfillment_status: query.fulfillment_status,
        };

        let (models, total) = self
            .orders
            .list_for_store(store_id, &filter, page, per_page)
            .await?;

        let mut orders = Vec::with_capacity(models.len());
        for model in models {
            orders.push(load_order_view(&self.orders, model, false).await?);
        }

        info!(total, page, per_page, returned = orders.len(), "Orders listed");
        Ok(OrderPage {
            orders,
            total,
            page,
            per_page,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;
    use crate::entities::order::FulfillmentStatus::*;

    #[rstest]
    #[case(Pending, Fulfilled, true)]
    #[case(Pending, Cancelled, true)]
    #[case(Fulfilled, Shipped, true)]
    #[case(Fulfilled, Cancelled, true)]
    #[case(Pending, Shipped, false)]
    #[case(Shipped, Pending, false)]
    #[case(Shipped, Cancelled, false)]
    #[case(Cancelled, Fulfilled, false)]
    #[case(Fulfilled, Pending, false)]
    fn fulfillment_transition_table(
        #[case] from: FulfillmentStatus,
        #[case] to: FulfillmentStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(is_valid_fulfillment_transition(from, to), allowed);
    }

    #[test]
    fn notes_are_trimmed_and_bounded() {
        assert_eq!(normalize_note("  packed  ").unwrap(), "packed");
        assert_matches!(normalize_note("   "), Err(ServiceError::ValidationError(_)));
        assert!(normalize_note(&"é".repeat(MAX_NOTE_CHARS)).is_ok());
        assert_matches!(
            normalize_note(&"x".repeat(MAX_NOTE_CHARS + 1)),
            Err(ServiceError::ValidationError(_))
        );
    }

    #[test]
    fn status_request_parses_lowercase_values() {
        let request: UpdateOrderStatusRequest =
            serde_json::from_str(r#"{"fulfillmentStatus":"shipped"}"#).unwrap();
        assert_eq!(request.fulfillment_status, Some(Shipped));
        assert!(request.payment_status.is_none());
    }
}
