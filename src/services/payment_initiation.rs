//! Requests a gateway order or subscription handle for a pending order.

use metrics::counter;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::PaymentConfig;
use crate::entities::order::{Model as OrderModel, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::gateway::{
    CreateGatewayOrder, CreateGatewaySubscription, GatewayError, GatewayReference,
    PaymentGateway,
};
use crate::repositories::order_repository::OrderRepository;

/// Recurring billing request; present only for subscription checkouts
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecurringRequest {
    pub plan_id: String,
    #[serde(default = "default_total_count")]
    pub total_count: u32,
}

fn default_total_count() -> u32 {
    12
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentRequest {
    #[serde(default)]
    pub recurring: Option<RecurringRequest>,
}

/// Handle the checkout widget needs to collect payment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentHandle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_subscription_id: Option<String>,
    /// Always the persisted order total, in minor units
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub test_mode: bool,
}

impl PaymentHandle {
    fn new(order: &OrderModel, reference: &GatewayReference, config: &PaymentConfig) -> Self {
        let (gateway_order_id, gateway_subscription_id) = match reference {
            GatewayReference::Order(id) => (Some(id.clone()), None),
            GatewayReference::Subscription(id) => (None, Some(id.clone())),
        };
        Self {
            gateway_order_id,
            gateway_subscription_id,
            amount: order.total,
            currency: order.currency.clone(),
            key_id: config.public_key_id(),
            test_mode: config.test_mode,
        }
    }
}

fn test_handle(recurring: bool) -> GatewayReference {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    let suffix = hex::encode(bytes);
    if recurring {
        GatewayReference::Subscription(format!("sub_test_{}", suffix))
    } else {
        GatewayReference::Order(format!("order_test_{}", suffix))
    }
}

#[derive(Clone)]
pub struct PaymentInitiationService {
    orders: OrderRepository,
    gateway: Option<Arc<dyn PaymentGateway>>,
    config: PaymentConfig,
}

impl PaymentInitiationService {
    pub fn new(
        orders: OrderRepository,
        gateway: Option<Arc<dyn PaymentGateway>>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            orders,
            gateway,
            config,
        }
    }

    /// Returns the order's gateway handle, creating it on first call.
    ///
    /// Repeated calls return the stored handle without contacting the
    /// provider. COD orders and orders no longer pending are refused.
    #[instrument(skip(self, request), fields(store_id = %store_id, order_id = %order_id))]
    pub async fn initiate(
        &self,
        store_id: Uuid,
        order_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> Result<PaymentHandle, ServiceError> {
        let order = self
            .orders
            .find_in_store(store_id, order_id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;

        if order.payment_method == PaymentMethod::Cod {
            return Err(ServiceError::Conflict(
                "cash-on-delivery orders are not paid online".into(),
            ));
        }
        if order.payment_status != PaymentStatus::Pending {
            return Err(ServiceError::Conflict(format!(
                "order payment is already {}",
                order.payment_status
            )));
        }

        if let Some(existing) = order.gateway_reference() {
            info!(reference = %existing.id(), "Returning existing gateway handle");
            return Ok(PaymentHandle::new(&order, &existing, &self.config));
        }

        let reference = self.create_reference(&order, request.recurring).await?;

        if self
            .orders
            .set_gateway_reference_if_absent(order.id, &reference)
            .await?
        {
            info!(reference = %reference.id(), "Gateway handle stored");
            return Ok(PaymentHandle::new(&order, &reference, &self.config));
        }

        // Another request stored a handle first, or the order moved on
        let current = self
            .orders
            .find_by_id(order.id)
            .await?
            .ok_or_else(|| ServiceError::OrderNotFound(order_id.to_string()))?;
        match current.gateway_reference() {
            Some(winner) if current.payment_status == PaymentStatus::Pending => {
                warn!(
                    discarded = %reference.id(),
                    kept = %winner.id(),
                    "Concurrent initiation; returning the stored handle"
                );
                Ok(PaymentHandle::new(&current, &winner, &self.config))
            }
            _ => Err(ServiceError::Conflict(format!(
                "order payment is already {}",
                current.payment_status
            ))),
        }
    }

    async fn create_reference(
        &self,
        order: &OrderModel,
        recurring: Option<RecurringRequest>,
    ) -> Result<GatewayReference, ServiceError> {
        if self.config.test_mode {
            let reference = test_handle(recurring.is_some());
            info!(reference = %reference.id(), "Test mode: minted local gateway handle");
            return Ok(reference);
        }

        let gateway = self.gateway.as_ref().ok_or_else(|| {
            ServiceError::ServiceUnavailable("payment gateway is not configured".into())
        })?;

        let mut notes = HashMap::new();
        notes.insert("order_id".to_string(), order.order_number.clone());
        notes.insert("store_id".to_string(), order.store_id.to_string());

        let result = match recurring {
            Some(plan) => {
                if plan.plan_id.trim().is_empty() || plan.total_count == 0 {
                    return Err(ServiceError::ValidationError(
                        "recurring.planId and a positive totalCount are required".into(),
                    ));
                }
                let plan_id = plan.plan_id.trim();
                self.check_plan_matches_order(gateway.as_ref(), plan_id, order)
                    .await?;
                gateway
                    .create_subscription(&CreateGatewaySubscription {
                        plan_id: plan_id.to_string(),
                        total_count: plan.total_count,
                        notes,
                    })
                    .await
                    .map(|sub| GatewayReference::Subscription(sub.id))
            }
            None => gateway
                .create_order(&CreateGatewayOrder {
                    amount: order.total,
                    currency: order.currency.clone(),
                    receipt: order.order_number.clone(),
                    notes,
                })
                .await
                .map(|created| GatewayReference::Order(created.id)),
        };

        result.map_err(gateway_failure)
    }

    /// The plan decides what each cycle charges, so it must bill exactly the
    /// persisted order total in the order's currency.
    async fn check_plan_matches_order(
        &self,
        gateway: &dyn PaymentGateway,
        plan_id: &str,
        order: &OrderModel,
    ) -> Result<(), ServiceError> {
        let plan = match gateway.fetch_plan(plan_id).await {
            Ok(plan) => plan,
            Err(GatewayError::Provider { status, .. }) if (400..500).contains(&status) => {
                warn!(plan_id, status, "Subscription plan lookup rejected");
                return Err(ServiceError::ValidationError(format!(
                    "unknown subscription plan '{}'",
                    plan_id
                )));
            }
            Err(e) => return Err(gateway_failure(e)),
        };

        if plan.item.amount != order.total
            || !plan.item.currency.eq_ignore_ascii_case(&order.currency)
        {
            counter!("storefront_plan_mismatch_total", 1);
            warn!(
                plan_id,
                plan_amount = plan.item.amount,
                plan_currency = %plan.item.currency,
                order_total = order.total,
                "SECURITY: subscription plan does not bill the order total"
            );
            return Err(ServiceError::ValidationError(
                "subscription plan amount does not match the order total".into(),
            ));
        }
        Ok(())
    }
}

fn gateway_failure(e: GatewayError) -> ServiceError {
    counter!("storefront_gateway_failures_total", 1);
    error!(error = %e, "Gateway handle creation failed");
    ServiceError::from(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_prefixed_and_unique() {
        let a = test_handle(false);
        let b = test_handle(false);
        assert!(a.id().starts_with("order_test_"));
        assert_ne!(a, b);
        assert!(test_handle(true).id().starts_with("sub_test_"));
    }

    #[test]
    fn recurring_total_count_defaults() {
        let request: InitiatePaymentRequest =
            serde_json::from_str(r#"{"recurring":{"planId":"plan_x"}}"#).unwrap();
        assert_eq!(request.recurring.unwrap().total_count, 12);
        let empty: InitiatePaymentRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.recurring.is_none());
    }
}
