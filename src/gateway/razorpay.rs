use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

use super::{
    CreateGatewayOrder, CreateGatewaySubscription, GatewayError, GatewayOrder, GatewayPlan,
    GatewaySubscription, PaymentGateway,
};
use crate::config::PaymentConfig;

/// Razorpay REST client
#[derive(Clone)]
pub struct RazorpayClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Serialize)]
struct SubscriptionBody<'a> {
    plan_id: &'a str,
    total_count: u32,
    customer_notify: u8,
    notes: &'a HashMap<String, String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl RazorpayClient {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    /// Builds a client from configuration. Returns `None` when credentials
    /// are absent, which config validation only allows in test mode.
    pub fn from_config(config: &PaymentConfig) -> Result<Option<Self>, GatewayError> {
        match (&config.key_id, &config.key_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.trim().is_empty() => {
                Self::new(
                    config.api_base_url.clone(),
                    id.clone(),
                    secret.clone(),
                    config.timeout(),
                )
                .map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, GatewayError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, path);
        self.execute(self.client.post(&url).json(body), path).await
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, GatewayError> {
        let url = format!("{}/{}", self.base_url, path);
        self.execute(self.client.get(&url), path).await
    }

    async fn execute<R: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<R, GatewayError> {
        let response = request
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .map(|env| {
                    format!(
                        "{}: {}",
                        env.error.code.unwrap_or_else(|| "ERROR".into()),
                        env.error.description.unwrap_or_default()
                    )
                })
                .unwrap_or_else(|| status.to_string());
            warn!(status = status.as_u16(), %message, path, "Razorpay API error");
            return Err(GatewayError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Decode(e.to_string())
            }
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    #[instrument(skip(self, request), fields(receipt = %request.receipt, amount = request.amount))]
    async fn create_order(
        &self,
        request: &CreateGatewayOrder,
    ) -> Result<GatewayOrder, GatewayError> {
        let order: GatewayOrder = self.post("orders", request).await?;
        if order.amount != request.amount {
            return Err(GatewayError::Decode(format!(
                "gateway order {} amount {} does not match requested {}",
                order.id, order.amount, request.amount
            )));
        }
        info!(gateway_order_id = %order.id, "Razorpay order created");
        Ok(order)
    }

    #[instrument(skip(self, request), fields(plan_id = %request.plan_id))]
    async fn create_subscription(
        &self,
        request: &CreateGatewaySubscription,
    ) -> Result<GatewaySubscription, GatewayError> {
        let body = SubscriptionBody {
            plan_id: &request.plan_id,
            total_count: request.total_count,
            customer_notify: 1,
            notes: &request.notes,
        };
        let subscription: GatewaySubscription = self.post("subscriptions", &body).await?;
        info!(gateway_subscription_id = %subscription.id, "Razorpay subscription created");
        Ok(subscription)
    }

    #[instrument(skip(self))]
    async fn fetch_plan(&self, plan_id: &str) -> Result<GatewayPlan, GatewayError> {
        self.get(&format!("plans/{}", plan_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order_request() -> CreateGatewayOrder {
        CreateGatewayOrder {
            amount: 1100,
            currency: "INR".into(),
            receipt: "ORD-20240101-ABC123".into(),
            notes: HashMap::new(),
        }
    }

    fn client(server: &MockServer, timeout: Duration) -> RazorpayClient {
        RazorpayClient::new(server.uri(), "rzp_test_key", "secret", timeout).unwrap()
    }

    #[tokio::test]
    async fn create_order_posts_amount_and_parses_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "amount": 1100,
                "currency": "INR",
                "receipt": "ORD-20240101-ABC123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_EKwxwAgItmmXdp",
                "entity": "order",
                "amount": 1100,
                "currency": "INR",
                "receipt": "ORD-20240101-ABC123",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server, Duration::from_secs(5))
            .create_order(&order_request())
            .await
            .unwrap();
        assert_eq!(order.id, "order_EKwxwAgItmmXdp");
        assert_eq!(order.status.as_deref(), Some("created"));
    }

    #[tokio::test]
    async fn provider_error_is_translated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": "BAD_REQUEST_ERROR",
                    "description": "Order amount less than minimum amount allowed"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .create_order(&order_request())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Provider { status: 400, ref message } if message.contains("BAD_REQUEST_ERROR"));
        assert!(!err.is_outage());
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(json!({"id": "order_x", "amount": 1100, "currency": "INR"})),
            )
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_millis(100))
            .create_order(&order_request())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Timeout);
        assert!(err.is_outage());
    }

    #[tokio::test]
    async fn amount_mismatch_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_x", "amount": 999, "currency": "INR"
            })))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .create_order(&order_request())
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Decode(_));
    }

    #[tokio::test]
    async fn create_subscription_sends_plan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/subscriptions"))
            .and(body_partial_json(json!({"plan_id": "plan_basic", "total_count": 12})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "sub_00000000000001",
                "plan_id": "plan_basic",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sub = client(&server, Duration::from_secs(5))
            .create_subscription(&CreateGatewaySubscription {
                plan_id: "plan_basic".into(),
                total_count: 12,
                notes: HashMap::new(),
            })
            .await
            .unwrap();
        assert_eq!(sub.id, "sub_00000000000001");
    }

    #[tokio::test]
    async fn fetch_plan_reads_billing_item() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plans/plan_basic"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "plan_basic",
                "entity": "plan",
                "interval": 1,
                "period": "monthly",
                "item": {
                    "id": "item_00000000000001",
                    "name": "Monthly box",
                    "amount": 69900,
                    "currency": "INR"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let plan = client(&server, Duration::from_secs(5))
            .fetch_plan("plan_basic")
            .await
            .unwrap();
        assert_eq!(plan.item.amount, 69900);
        assert_eq!(plan.item.currency, "INR");
    }

    #[tokio::test]
    async fn unknown_plan_is_a_provider_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plans/plan_missing"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": "BAD_REQUEST_ERROR",
                    "description": "The id provided does not exist"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server, Duration::from_secs(5))
            .fetch_plan("plan_missing")
            .await
            .unwrap_err();
        assert_matches!(err, GatewayError::Provider { status: 400, .. });
        assert!(!err.is_outage());
    }

    #[test]
    fn from_config_requires_both_credentials() {
        let mut cfg = PaymentConfig {
            key_id: Some("rzp_test".into()),
            ..Default::default()
        };
        assert!(RazorpayClient::from_config(&cfg).unwrap().is_none());
        cfg.key_secret = Some("secret".into());
        assert!(RazorpayClient::from_config(&cfg).unwrap().is_some());
    }
}
