use axum::{extract::State, http::HeaderMap, response::Response};
use bytes::Bytes;
use metrics::counter;
use serde_json::Value;
use tracing::warn;

use super::common::success_response;
use crate::gateway::signature;
use crate::services::webhooks::WebhookAck;
use crate::{errors::ServiceError, AppState};

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";
pub const EVENT_ID_HEADER: &str = "x-razorpay-event-id";

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Delivery id from the provider header, else the body `id`
fn event_id(headers: &HeaderMap, body: &Value) -> Option<String> {
    header_str(headers, EVENT_ID_HEADER)
        .map(str::to_string)
        .or_else(|| {
            body.get("id")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
}

// POST /api/webhooks/razorpay
#[utoipa::path(
    post,
    path = "/api/webhooks/razorpay",
    request_body = String,
    params(
        ("X-Razorpay-Signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body"),
        ("X-Razorpay-Event-Id" = Option<String>, Header, description = "Delivery id used for deduplication")
    ),
    responses(
        (status = 200, description = "Webhook accepted", body = WebhookAck),
        (status = 400, description = "Invalid signature or payload", body = crate::errors::ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Bytes,
) -> Result<Response, ServiceError> {
    let secret = state
        .config
        .payment
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ServiceError::ServiceUnavailable("webhook secret is not configured".into())
        })?;

    let valid = header_str(&headers, SIGNATURE_HEADER)
        .map(|sig| signature::verify(secret, &payload, sig))
        .unwrap_or(false);
    if !valid {
        counter!("storefront_signature_mismatch_total", 1, "source" => "webhook");
        warn!("SECURITY: payment webhook signature verification failed");
        return Err(ServiceError::SignatureMismatch);
    }

    let body: Value = serde_json::from_slice(&payload)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {}", e)))?;

    let event_id = event_id(&headers, &body);
    let outcome = state
        .services
        .webhooks
        .handle(event_id.as_deref(), &body)
        .await?;

    Ok(success_response(WebhookAck { outcome }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    #[test]
    fn event_id_prefers_header() {
        let mut headers = HeaderMap::new();
        let body = json!({"id": "evt_body"});
        assert_eq!(event_id(&headers, &body).as_deref(), Some("evt_body"));

        headers.insert(EVENT_ID_HEADER, HeaderValue::from_static("evt_header"));
        assert_eq!(event_id(&headers, &body).as_deref(), Some("evt_header"));

        assert_eq!(event_id(&HeaderMap::new(), &json!({})), None);
    }
}
