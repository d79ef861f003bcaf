//! Public storefront endpoints: checkout, payment handle, verification.

use axum::{extract::State, response::Response};
use uuid::Uuid;

use super::common::{created_response, success_response, AppJson, AppPath};
use crate::errors::ServiceError;
use crate::services::orders::CreateOrderRequest;
use crate::services::payment_initiation::InitiatePaymentRequest;
use crate::services::payment_verification::VerifyPaymentRequest;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/api/storefront/{slug}/orders",
    params(("slug" = String, Path, description = "Store slug")),
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = crate::services::orders::OrderView),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 404, description = "Store or product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Storefront"
)]
pub async fn create_order(
    State(state): State<AppState>,
    AppPath(slug): AppPath<String>,
    AppJson(request): AppJson<CreateOrderRequest>,
) -> Result<Response, ServiceError> {
    let order = state.services.orders.create_order(&slug, request).await?;
    Ok(created_response(order))
}

#[utoipa::path(
    post,
    path = "/api/storefront/{slug}/orders/{id}/payment",
    params(
        ("slug" = String, Path, description = "Store slug"),
        ("id" = Uuid, Path, description = "Order id")
    ),
    request_body(content = InitiatePaymentRequest, description = "Optional recurring plan"),
    responses(
        (status = 200, description = "Gateway handle", body = crate::services::payment_initiation::PaymentHandle),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order is COD or not pending", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Storefront"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    AppPath((slug, order_id)): AppPath<(String, Uuid)>,
    body: Option<AppJson<InitiatePaymentRequest>>,
) -> Result<Response, ServiceError> {
    let store = state.services.orders.resolve_store(&slug).await?;
    let request = body.map(|AppJson(r)| r).unwrap_or_default();
    let handle = state
        .services
        .payment_initiation
        .initiate(store.id, order_id, request)
        .await?;
    Ok(success_response(handle))
}

#[utoipa::path(
    post,
    path = "/api/storefront/{slug}/orders/{id}/verify",
    params(
        ("slug" = String, Path, description = "Store slug"),
        ("id" = Uuid, Path, description = "Order id")
    ),
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified", body = crate::services::payment_verification::VerificationOutcome),
        (status = 400, description = "Signature mismatch", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order cannot be verified", body = crate::errors::ErrorResponse)
    ),
    tag = "Storefront"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    AppPath((slug, order_id)): AppPath<(String, Uuid)>,
    AppJson(request): AppJson<VerifyPaymentRequest>,
) -> Result<Response, ServiceError> {
    let store = state.services.orders.resolve_store(&slug).await?;
    let outcome = state
        .services
        .payment_verification
        .verify(store.id, order_id, request)
        .await?;
    Ok(success_response(outcome))
}
