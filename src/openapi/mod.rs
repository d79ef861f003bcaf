use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront order and payment API

Order lifecycle and payment confirmation for multi-tenant storefronts.

## Authentication

Storefront endpoints are public. Store endpoints require a staff JWT:

```
Authorization: Bearer <your-jwt-token>
```

## Responses

Success bodies are `{ "success": true, ...payload }`. Errors are:

```json
{
  "success": false,
  "error": "Order not found: 550e8400-e29b-41d4-a716-446655440000",
  "requestId": "req-abc123xyz"
}
```

Amounts are integers in minor units (paise, cents).
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    tags(
        (name = "Storefront", description = "Public checkout endpoints"),
        (name = "Store orders", description = "Staff order management"),
        (name = "Payments", description = "Payment gateway callbacks"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::storefront::create_order,
        crate::handlers::storefront::initiate_payment,
        crate::handlers::storefront::verify_payment,
        crate::handlers::store_orders::list_orders,
        crate::handlers::store_orders::get_order,
        crate::handlers::store_orders::update_order_status,
        crate::handlers::store_orders::add_note,
        crate::handlers::payment_webhooks::razorpay_webhook,
    ),
    components(
        schemas(
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::Customer,
            crate::services::orders::ShippingAddress,
            crate::services::orders::OrderItemInput,
            crate::services::orders::OrderView,
            crate::services::orders::OrderItemView,
            crate::services::orders::OrderNoteView,
            crate::services::payment_initiation::InitiatePaymentRequest,
            crate::services::payment_initiation::RecurringRequest,
            crate::services::payment_initiation::PaymentHandle,
            crate::services::payment_verification::VerifyPaymentRequest,
            crate::services::payment_verification::VerificationOutcome,
            crate::services::order_status::UpdateOrderStatusRequest,
            crate::services::order_status::AddNoteRequest,
            crate::services::order_status::OrderPage,
            crate::services::webhooks::WebhookAck,
            crate::services::webhooks::WebhookOutcome,
            crate::entities::order::PaymentMethod,
            crate::entities::order::PaymentStatus,
            crate::entities::order::FulfillmentStatus,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_order_flow() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/storefront/{slug}/orders/{id}/verify"));
        assert!(json.contains("/api/webhooks/razorpay"));
        assert!(json.contains("bearer_auth"));
    }
}
