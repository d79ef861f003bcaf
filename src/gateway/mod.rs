//! Payment gateway client.
//!
//! The [`PaymentGateway`] trait is the seam between the order services and
//! the external provider. [`RazorpayClient`] is the production implementation;
//! tests substitute their own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};

pub mod razorpay;
pub mod signature;

pub use razorpay::RazorpayClient;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,

    #[error("gateway transport error: {0}")]
    Transport(String),

    #[error("gateway rejected request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("unexpected gateway response: {0}")]
    Decode(String),

    #[error("gateway circuit open")]
    CircuitOpen,
}

impl GatewayError {
    /// Failures that say something about provider health rather than about
    /// the request itself.
    pub fn is_outage(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Provider { status, .. } => *status >= 500 || *status == 429,
            Self::Decode(_) | Self::CircuitOpen => false,
        }
    }
}

/// External reference tying an internal order to the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayReference {
    Order(String),
    Subscription(String),
}

impl GatewayReference {
    pub fn id(&self) -> &str {
        match self {
            Self::Order(id) | Self::Subscription(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGatewayOrder {
    /// Amount in minor units
    pub amount: i64,
    pub currency: String,
    /// Merchant-side receipt, the public order number
    pub receipt: String,
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateGatewaySubscription {
    pub plan_id: String,
    pub total_count: u32,
    pub notes: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewaySubscription {
    pub id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Billing item of a subscription plan; the amount charged per cycle
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewayPlanItem {
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct GatewayPlan {
    pub id: String,
    pub item: GatewayPlanItem,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &CreateGatewayOrder)
        -> Result<GatewayOrder, GatewayError>;

    async fn create_subscription(
        &self,
        request: &CreateGatewaySubscription,
    ) -> Result<GatewaySubscription, GatewayError>;

    async fn fetch_plan(&self, plan_id: &str) -> Result<GatewayPlan, GatewayError>;
}

/// Routes gateway calls through the shared circuit breaker. Only outages
/// count toward opening it; provider rejections of a bad request do not.
pub struct GuardedGateway {
    inner: Arc<dyn PaymentGateway>,
    breaker: Arc<CircuitBreaker>,
}

impl GuardedGateway {
    pub fn new(inner: Arc<dyn PaymentGateway>, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }
}

fn unwrap_breaker(err: CircuitBreakerError<GatewayError>) -> GatewayError {
    match err {
        CircuitBreakerError::CircuitOpen => GatewayError::CircuitOpen,
        CircuitBreakerError::ServiceFailure(inner) => inner,
    }
}

#[async_trait]
impl PaymentGateway for GuardedGateway {
    async fn create_order(
        &self,
        request: &CreateGatewayOrder,
    ) -> Result<GatewayOrder, GatewayError> {
        self.breaker
            .call(|| self.inner.create_order(request), GatewayError::is_outage)
            .await
            .map_err(unwrap_breaker)
    }

    async fn create_subscription(
        &self,
        request: &CreateGatewaySubscription,
    ) -> Result<GatewaySubscription, GatewayError> {
        self.breaker
            .call(
                || self.inner.create_subscription(request),
                GatewayError::is_outage,
            )
            .await
            .map_err(unwrap_breaker)
    }

    async fn fetch_plan(&self, plan_id: &str) -> Result<GatewayPlan, GatewayError> {
        self.breaker
            .call(|| self.inner.fetch_plan(plan_id), GatewayError::is_outage)
            .await
            .map_err(unwrap_breaker)
    }
}
