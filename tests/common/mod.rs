use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::{json, Value};
use storefront_api::{
    auth::ADMIN_ROLE,
    config::AppConfig,
    db::{self, DbConfig},
    entities::{affiliate, product, product_variant, store},
    gateway::{
        CreateGatewayOrder, CreateGatewaySubscription, GatewayError, GatewayOrder, GatewayPlan,
        GatewayPlanItem, GatewaySubscription, PaymentGateway,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const KEY_SECRET: &str = "test_key_secret";
pub const WEBHOOK_SECRET: &str = "whsec";
pub const STORE_SLUG: &str = "acme";
pub const PRODUCT_PRICE: i64 = 500;
pub const VARIANT_PRICE: i64 = 700;
pub const REFERRAL_CODE: &str = "FRIEND10";
/// Total of [`TestApp::create_order`]: two units plus shipping
pub const ORDER_TOTAL: i64 = 2 * PRODUCT_PRICE + 100;

/// Gateway double that counts calls and can simulate an outage.
#[derive(Default)]
pub struct CountingGateway {
    orders: AtomicUsize,
    subscriptions: AtomicUsize,
    down: AtomicBool,
    plans: Mutex<HashMap<String, GatewayPlan>>,
}

impl CountingGateway {
    pub fn order_calls(&self) -> usize {
        self.orders.load(Ordering::SeqCst)
    }

    pub fn subscription_calls(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub fn add_plan(&self, id: &str, amount: i64, currency: &str) {
        self.plans.lock().unwrap().insert(
            id.to_string(),
            GatewayPlan {
                id: id.to_string(),
                item: GatewayPlanItem {
                    amount,
                    currency: currency.to_string(),
                },
            },
        );
    }
}

#[async_trait]
impl PaymentGateway for CountingGateway {
    async fn create_order(
        &self,
        request: &CreateGatewayOrder,
    ) -> Result<GatewayOrder, GatewayError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        Ok(GatewayOrder {
            id: format!("order_mock{:04}", n),
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: Some("created".into()),
        })
    }

    async fn create_subscription(
        &self,
        request: &CreateGatewaySubscription,
    ) -> Result<GatewaySubscription, GatewayError> {
        let n = self.subscriptions.fetch_add(1, Ordering::SeqCst) + 1;
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        Ok(GatewaySubscription {
            id: format!("sub_mock{:04}", n),
            plan_id: Some(request.plan_id.clone()),
            status: Some("created".into()),
        })
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<GatewayPlan, GatewayError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::Timeout);
        }
        self.plans
            .lock()
            .unwrap()
            .get(plan_id)
            .cloned()
            .ok_or_else(|| GatewayError::Provider {
                status: 400,
                message: "BAD_REQUEST_ERROR: The id provided does not exist".into(),
            })
    }
}

/// Application backed by a private in-memory SQLite database with a seeded
/// catalog: one store with a product, a variant and an affiliate, plus a
/// second store the default staff token cannot access.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<CountingGateway>,
    pub store: store::Model,
    pub other_store: store::Model,
    pub product: product::Model,
    pub affiliate: affiliate::Model,
    staff_token: String,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Builds the app after letting the caller adjust configuration.
    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "test_secret_key_for_testing_purposes_only_32chars".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.payment.key_id = Some("rzp_test_key".into());
        cfg.payment.key_secret = Some(KEY_SECRET.into());
        cfg.payment.webhook_secret = Some(WEBHOOK_SECRET.into());
        configure(&mut cfg);

        // A single connection keeps every query on the same in-memory database
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        })
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let store = insert_store(&pool, STORE_SLUG).await;
        let other_store = insert_store(&pool, "other-shop").await;

        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store.id),
            name: Set("Classic Tee".into()),
            price: Set(PRODUCT_PRICE),
            active: Set(true),
        }
        .insert(&pool)
        .await
        .expect("seed product");

        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            name: Set("XL".into()),
            price: Set(Some(VARIANT_PRICE)),
        }
        .insert(&pool)
        .await
        .expect("seed variant");

        let affiliate = affiliate::ActiveModel {
            id: Set(Uuid::new_v4()),
            store_id: Set(store.id),
            code: Set(REFERRAL_CODE.into()),
            commission_bps: Set(1_000),
            active: Set(true),
        }
        .insert(&pool)
        .await
        .expect("seed affiliate");

        let gateway = Arc::new(CountingGateway::default());
        gateway.add_plan("plan_monthly", ORDER_TOTAL, "INR");
        gateway.add_plan("plan_one_rupee", 100, "INR");
        gateway.add_plan("plan_usd", ORDER_TOTAL, "USD");
        let state = AppState::with_gateway(Arc::new(pool), cfg, gateway.clone());
        let staff_token = state
            .auth
            .issue_token(
                "staff-1",
                Some("Store Staff"),
                &["staff"],
                &[store.id],
                Duration::from_secs(3600),
            )
            .expect("issue staff token");

        Self {
            router: storefront_api::app_router(state.clone()),
            state,
            gateway,
            store,
            other_store,
            product,
            affiliate,
            staff_token,
        }
    }

    pub fn staff_token(&self) -> &str {
        &self.staff_token
    }

    pub fn admin_token(&self) -> String {
        self.state
            .auth
            .issue_token(
                "admin-1",
                Some("Admin"),
                &[ADMIN_ROLE],
                &[],
                Duration::from_secs(3600),
            )
            .expect("issue admin token")
    }

    /// Sends a JSON request and returns the status with the decoded body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("serialize request body"))
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).expect("build request")).await
    }

    /// Sends a raw body with arbitrary headers, as a webhook delivery would.
    pub async fn request_raw(
        &self,
        uri: &str,
        payload: &[u8],
        headers: &[(&str, &str)],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(
            builder
                .body(Body::from(payload.to_vec()))
                .expect("build request"),
        )
        .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body bytes");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json response")
        };
        (status, value)
    }

    /// Cart body for the seeded product
    pub fn order_body(&self, payment_method: &str, quantity: i64, shipping: i64) -> Value {
        json!({
            "customer": {
                "name": "Asha Rao",
                "email": "asha@example.com",
                "phone": "+919800000000"
            },
            "shippingAddress": {
                "name": "Asha Rao",
                "address1": "12 MG Road",
                "city": "Bengaluru",
                "state": "KA",
                "zip": "560001",
                "country": "IN",
                "phone": "+919800000000"
            },
            "items": [{"productId": self.product.id, "quantity": quantity}],
            "shipping": shipping,
            "paymentMethod": payment_method
        })
    }

    /// Creates an order through the API and returns its `_id`.
    pub async fn create_order(&self, payment_method: &str) -> Uuid {
        let (status, body) = self
            .request(
                Method::POST,
                &format!("/api/storefront/{}/orders", STORE_SLUG),
                Some(self.order_body(payment_method, 2, 100)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "order creation failed: {body}");
        body["_id"]
            .as_str()
            .and_then(|id| Uuid::parse_str(id).ok())
            .expect("order id in response")
    }

    pub async fn initiate_payment(&self, order_id: Uuid, body: Option<Value>) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/api/storefront/{}/orders/{}/payment", STORE_SLUG, order_id),
            body,
            None,
        )
        .await
    }

    pub async fn verify_payment(&self, order_id: Uuid, body: Value) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            &format!("/api/storefront/{}/orders/{}/verify", STORE_SLUG, order_id),
            Some(body),
            None,
        )
        .await
    }

    /// Reads an order through the staff API.
    pub async fn fetch_order(&self, order_id: Uuid) -> Value {
        let (status, body) = self
            .request(
                Method::GET,
                &format!("/api/stores/{}/orders/{}", self.store.id, order_id),
                None,
                Some(self.staff_token()),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "order fetch failed: {body}");
        body
    }
}

async fn insert_store(pool: &db::DbPool, slug: &str) -> store::Model {
    store::ActiveModel {
        id: Set(Uuid::new_v4()),
        slug: Set(slug.into()),
        name: Set(format!("Store {}", slug)),
        currency: Set("INR".into()),
        active: Set(true),
        created_at: Set(Utc::now()),
    }
    .insert(pool)
    .await
    .expect("seed store")
}
