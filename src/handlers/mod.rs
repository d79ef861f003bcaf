pub mod common;
pub mod payment_webhooks;
pub mod store_orders;
pub mod storefront;

use sea_orm::DatabaseConnection;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::gateway::PaymentGateway;
use crate::repositories::order_repository::OrderRepository;
use crate::repositories::webhook_event_repository::WebhookEventRepository;
use crate::services::{
    order_status::OrderStatusService, orders::OrderService,
    payment_initiation::PaymentInitiationService,
    payment_verification::PaymentVerificationService, webhooks::WebhookService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub payment_initiation: Arc<PaymentInitiationService>,
    pub payment_verification: Arc<PaymentVerificationService>,
    pub order_status: Arc<OrderStatusService>,
    pub webhooks: Arc<WebhookService>,
}

impl AppServices {
    /// Wires every service against one connection pool. `gateway` is `None`
    /// when no provider credentials are configured.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        gateway: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone(), &config.orders));
        let payment_initiation = Arc::new(PaymentInitiationService::new(
            OrderRepository::new(db.clone()),
            gateway,
            config.payment.clone(),
        ));
        let payment_verification = Arc::new(PaymentVerificationService::new(
            OrderRepository::new(db.clone()),
            config.payment.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(db.clone(), &config.orders));
        let webhooks = Arc::new(WebhookService::new(
            OrderRepository::new(db.clone()),
            WebhookEventRepository::new(db),
        ));

        Self {
            orders,
            payment_initiation,
            payment_verification,
            order_status,
            webhooks,
        }
    }
}
