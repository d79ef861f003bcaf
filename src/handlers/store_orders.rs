//! Staff endpoints for a store's orders. Every handler checks that the
//! caller may manage the store in the path.

use axum::{extract::State, response::Response};
use uuid::Uuid;

use super::common::{created_response, success_response, AppJson, AppPath, AppQuery};
use crate::auth::AuthUser;
use crate::errors::ServiceError;
use crate::services::order_status::{AddNoteRequest, ListOrdersQuery, UpdateOrderStatusRequest};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/api/stores/{store_id}/orders",
    params(("store_id" = Uuid, Path, description = "Store id"), ListOrdersQuery),
    responses(
        (status = 200, description = "Page of orders", body = crate::services::order_status::OrderPage),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
        (status = 403, description = "No access to store", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Store orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(store_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<ListOrdersQuery>,
) -> Result<Response, ServiceError> {
    user.ensure_store_access(store_id)?;
    let page = state
        .services
        .order_status
        .list_orders(store_id, query)
        .await?;
    Ok(success_response(page))
}

#[utoipa::path(
    get,
    path = "/api/stores/{store_id}/orders/{id}",
    params(
        ("store_id" = Uuid, Path, description = "Store id"),
        ("id" = Uuid, Path, description = "Order id")
    ),
    responses(
        (status = 200, description = "Order with items and notes", body = crate::services::orders::OrderView),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Store orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath((store_id, order_id)): AppPath<(Uuid, Uuid)>,
) -> Result<Response, ServiceError> {
    user.ensure_store_access(store_id)?;
    let order = state
        .services
        .order_status
        .get_order(store_id, order_id)
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    patch,
    path = "/api/stores/{store_id}/orders/{id}",
    params(
        ("store_id" = Uuid, Path, description = "Store id"),
        ("id" = Uuid, Path, description = "Order id")
    ),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Updated order", body = crate::services::orders::OrderView),
        (status = 400, description = "Nothing to update", body = crate::errors::ErrorResponse),
        (status = 409, description = "Transition not allowed", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Store orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath((store_id, order_id)): AppPath<(Uuid, Uuid)>,
    AppJson(request): AppJson<UpdateOrderStatusRequest>,
) -> Result<Response, ServiceError> {
    user.ensure_store_access(store_id)?;
    let order = state
        .services
        .order_status
        .update_status(store_id, order_id, request, user.display_name())
        .await?;
    Ok(success_response(order))
}

#[utoipa::path(
    post,
    path = "/api/stores/{store_id}/orders/{id}/notes",
    params(
        ("store_id" = Uuid, Path, description = "Store id"),
        ("id" = Uuid, Path, description = "Order id")
    ),
    request_body = AddNoteRequest,
    responses(
        (status = 201, description = "Note added", body = crate::services::orders::OrderNoteView),
        (status = 400, description = "Empty or oversized note", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Store orders"
)]
pub async fn add_note(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath((store_id, order_id)): AppPath<(Uuid, Uuid)>,
    AppJson(request): AppJson<AddNoteRequest>,
) -> Result<Response, ServiceError> {
    user.ensure_store_access(store_id)?;
    let note = state
        .services
        .order_status
        .add_note(store_id, order_id, &request.text, user.display_name())
        .await?;
    Ok(created_response(note))
}
