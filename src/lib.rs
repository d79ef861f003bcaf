//! Storefront API Library
//!
//! Order capture, payment collection and staff order management for
//! multi-tenant storefronts.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod gateway;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod repositories;
pub mod services;
pub mod tracing;

use axum::{
    extract::{FromRef, State},
    response::Json,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::auth::AuthService;
use crate::circuit_breaker::CircuitBreaker;
use crate::gateway::{GuardedGateway, PaymentGateway, RazorpayClient};

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub services: handlers::AppServices,
    pub auth: Arc<AuthService>,
    pub breaker: Arc<CircuitBreaker>,
}

impl AppState {
    /// Builds state with the Razorpay client configured in `config.payment`.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> Result<Self, gateway::GatewayError> {
        let client = RazorpayClient::from_config(&config.payment)?
            .map(|client| Arc::new(client) as Arc<dyn PaymentGateway>);
        if client.is_none() {
            ::tracing::warn!("payment gateway credentials not configured");
        }
        Ok(Self::build(db, config, client))
    }

    /// Builds state around a caller-supplied gateway implementation.
    pub fn with_gateway(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self::build(db, config, Some(gateway))
    }

    fn build(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(
            config.payment.breaker_failure_threshold,
            config.payment.breaker_reset(),
            1,
        ));
        let gateway = gateway.map(|inner| {
            Arc::new(GuardedGateway::new(inner, breaker.clone())) as Arc<dyn PaymentGateway>
        });
        let services = handlers::AppServices::new(db.clone(), &config, gateway);
        let auth = Arc::new(AuthService::new(&config.jwt_secret));

        Self {
            db,
            config,
            services,
            auth,
            breaker,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

// Common response wrapper; the payload's fields sit beside `success`.
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Public storefront routes, keyed by store slug
fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/:slug/orders", post(handlers::storefront::create_order))
        .route(
            "/:slug/orders/:id/payment",
            post(handlers::storefront::initiate_payment),
        )
        .route(
            "/:slug/orders/:id/verify",
            post(handlers::storefront::verify_payment),
        )
}

/// Staff routes; every handler authenticates through the `AuthUser` extractor
fn store_admin_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/:store_id/orders",
            get(handlers::store_orders::list_orders),
        )
        .route(
            "/:store_id/orders/:id",
            get(handlers::store_orders::get_order)
                .patch(handlers::store_orders::update_order_status),
        )
        .route(
            "/:store_id/orders/:id/notes",
            post(handlers::store_orders::add_note),
        )
}

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/storefront", storefront_routes())
        .nest("/stores", store_admin_routes())
        // Signature-verified instead of token-authenticated
        .route(
            "/webhooks/razorpay",
            post(handlers::payment_webhooks::razorpay_webhook),
        )
}

/// Full application router without the transport layers added in `main`.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(api_status))
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        .with_state(state)
}

async fn api_status(State(state): State<AppState>) -> ApiResult<Value> {
    let version = env!("CARGO_PKG_VERSION");
    let git = option_env!("GIT_HASH").unwrap_or("unknown");
    let status_data = json!({
        "status": "ok",
        "version": version,
        "git": git,
        "service": "storefront-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "environment": state.config.environment,
        "paymentTestMode": state.config.payment.test_mode,
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(State(state): State<AppState>) -> ApiResult<Value> {
    let db_status = match db::check_connection(&state.db).await {
        Ok(()) => "healthy",
        Err(err) => {
            ::tracing::warn!(error = %err, "database health check failed");
            "unhealthy"
        }
    };
    let breaker_state = format!("{:?}", state.breaker.state()).to_lowercase();

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
            "paymentGateway": breaker_state,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}

#[cfg(test)]
mod response_tests {
    use super::*;

    #[derive(Serialize)]
    struct Payload {
        #[serde(rename = "orderId")]
        order_id: &'static str,
    }

    #[test]
    fn success_response_flattens_payload() {
        let body = serde_json::to_value(ApiResponse::success(Payload {
            order_id: "ORD-20240101-ABC123",
        }))
        .unwrap();
        assert_eq!(
            body,
            json!({"success": true, "orderId": "ORD-20240101-ABC123"})
        );
    }
}
