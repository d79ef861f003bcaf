//! Applies gateway webhook events to orders.
//!
//! Signature checks happen at the HTTP boundary; this service only sees
//! authenticated payloads. Every order change is conditional on the current
//! payment state, so replays and races with checkout verification are safe.

use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::gateway::GatewayReference;
use crate::repositories::order_repository::OrderRepository;
use crate::repositories::webhook_event_repository::WebhookEventRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WebhookOutcome {
    /// The order changed state
    Processed,
    /// The event id was seen before
    Duplicate,
    /// Event type not handled, or the order was not in a state to change
    Ignored,
    /// No order carries the referenced gateway handle
    UnknownReference,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub outcome: WebhookOutcome,
}

/// What an event asks us to do, extracted from the raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    MarkPaid {
        reference: GatewayReference,
        payment_id: Option<String>,
    },
    MarkFailed {
        reference: GatewayReference,
    },
    Ignore,
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Event type as named by the provider (`event`), falling back to `type`
pub fn event_type(body: &Value) -> &str {
    str_at(body, "/event")
        .or_else(|| str_at(body, "/type"))
        .unwrap_or("")
}

/// Maps a provider event onto an order action
pub fn classify(body: &Value) -> WebhookAction {
    let payment_id = str_at(body, "/payload/payment/entity/id").map(str::to_string);
    let payment_order = str_at(body, "/payload/payment/entity/order_id");

    match event_type(body) {
        "payment.captured" => match payment_order {
            Some(order_id) => WebhookAction::MarkPaid {
                reference: GatewayReference::Order(order_id.to_string()),
                payment_id,
            },
            None => WebhookAction::Ignore,
        },
        "order.paid" => match payment_order.or_else(|| str_at(body, "/payload/order/entity/id")) {
            Some(order_id) => WebhookAction::MarkPaid {
                reference: GatewayReference::Order(order_id.to_string()),
                payment_id,
            },
            None => WebhookAction::Ignore,
        },
        "payment.failed" => match payment_order {
            Some(order_id) => WebhookAction::MarkFailed {
                reference: GatewayReference::Order(order_id.to_string()),
            },
            None => WebhookAction::Ignore,
        },
        "subscription.charged" => match str_at(body, "/payload/subscription/entity/id") {
            Some(sub_id) => WebhookAction::MarkPaid {
                reference: GatewayReference::Subscription(sub_id.to_string()),
                payment_id,
            },
            None => WebhookAction::Ignore,
        },
        _ => WebhookAction::Ignore,
    }
}

#[derive(Clone)]
pub struct WebhookService {
    orders: OrderRepository,
    events: WebhookEventRepository,
}

impl WebhookService {
    pub fn new(orders: OrderRepository, events: WebhookEventRepository) -> Self {
        Self { orders, events }
    }

    /// Applies one authenticated delivery. `event_id` deduplicates
    /// redeliveries when the provider supplies one.
    #[instrument(skip(self, body), fields(event_id = event_id.unwrap_or("-"), event = %event_type(body)))]
    pub async fn handle(
        &self,
        event_id: Option<&str>,
        body: &Value,
    ) -> Result<WebhookOutcome, ServiceError> {
        if let Some(id) = event_id {
            if self.events.exists(id).await? {
                info!("Webhook redelivery ignored");
                return Ok(WebhookOutcome::Duplicate);
            }
        }

        let outcome = self.apply(classify(body)).await?;

        if let Some(id) = event_id {
            if !self.events.record(id, event_type(body)).await? {
                info!("Webhook event recorded concurrently");
            }
        }

        counter!("storefront_webhooks_total", 1, "outcome" => outcome.to_string());
        Ok(outcome)
    }

    async fn apply(&self, action: WebhookAction) -> Result<WebhookOutcome, ServiceError> {
        let (reference, paid, payment_id) = match action {
            WebhookAction::Ignore => {
                info!("Webhook event not handled");
                return Ok(WebhookOutcome::Ignored);
            }
            WebhookAction::MarkPaid {
                reference,
                payment_id,
            } => (reference, true, payment_id),
            WebhookAction::MarkFailed { reference } => (reference, false, None),
        };

        let Some(order) = self.orders.find_by_gateway_reference(&reference).await? else {
            warn!(reference = %reference.id(), "Webhook references an unknown gateway handle");
            return Ok(WebhookOutcome::UnknownReference);
        };

        let changed = if paid {
            self.orders
                .mark_paid_if_pending(order.id, payment_id, Utc::now())
                .await?
        } else {
            self.orders.mark_failed_if_pending(order.id).await?
        };

        if changed {
            info!(order_id = %order.id, paid, "Order payment updated from webhook");
            Ok(WebhookOutcome::Processed)
        } else {
            info!(
                order_id = %order.id,
                payment_status = %order.payment_status,
                "Order not pending; webhook left it unchanged"
            );
            Ok(WebhookOutcome::Ignored)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn captured_payment_marks_gateway_order_paid() {
        let body = json!({
            "event": "payment.captured",
            "payload": {"payment": {"entity": {"id": "pay_1", "order_id": "order_1"}}}
        });
        assert_eq!(
            classify(&body),
            WebhookAction::MarkPaid {
                reference: GatewayReference::Order("order_1".into()),
                payment_id: Some("pay_1".into()),
            }
        );
    }

    #[test]
    fn order_paid_falls_back_to_order_entity() {
        let body = json!({
            "event": "order.paid",
            "payload": {"order": {"entity": {"id": "order_9"}}}
        });
        assert_eq!(
            classify(&body),
            WebhookAction::MarkPaid {
                reference: GatewayReference::Order("order_9".into()),
                payment_id: None,
            }
        );
    }

    #[test]
    fn failed_payment_and_subscription_charge() {
        let failed = json!({
            "event": "payment.failed",
            "payload": {"payment": {"entity": {"id": "pay_2", "order_id": "order_2"}}}
        });
        assert_eq!(
            classify(&failed),
            WebhookAction::MarkFailed {
                reference: GatewayReference::Order("order_2".into())
            }
        );

        let charged = json!({
            "event": "subscription.charged",
            "payload": {
                "subscription": {"entity": {"id": "sub_1"}},
                "payment": {"entity": {"id": "pay_3"}}
            }
        });
        assert_eq!(
            classify(&charged),
            WebhookAction::MarkPaid {
                reference: GatewayReference::Subscription("sub_1".into()),
                payment_id: Some("pay_3".into()),
            }
        );
    }

    #[test]
    fn unknown_or_incomplete_events_are_ignored() {
        assert_eq!(classify(&json!({"event": "refund.created"})), WebhookAction::Ignore);
        assert_eq!(classify(&json!({"event": "payment.captured"})), WebhookAction::Ignore);
        assert_eq!(classify(&json!({})), WebhookAction::Ignore);
    }
}
