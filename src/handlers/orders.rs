use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::order::{self, OrderStatus},
    errors::ServiceError,
    handlers::{Caller, CallerRole},
    services::{
        order_status::TransitionRequest,
        orders::{CreateOrderRequest, OrderDetail, OrderListResponse},
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListOrdersQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 {
    1
}
fn default_per_page() -> u64 {
    20
}

#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Convert a cart into a pending order. Every inventory shortfall, under-cost price and supplier mismatch is reported in one response.",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created successfully", body = ApiResponse<OrderDetail>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Storefront or product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Concurrent update, retry", body = crate::errors::ErrorResponse),
        (status = 422, description = "Cart rejected", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderDetail>>), ServiceError> {
    let detail = state
        .services
        .orders
        .create_order(caller.user_id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::success(detail))))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Orders visible to the caller, newest first",
    params(ListOrdersQuery),
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<OrderListResponse>),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: Caller,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<OrderListResponse> {
    let viewer = caller.viewer(&state).await?;
    let orders = state
        .services
        .orders
        .list_orders(&viewer, query.page, query.per_page)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    summary = "Get order",
    description = "An order with its items and status history",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderDetail>),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetail> {
    let viewer = caller.viewer(&state).await?;
    let detail = state.services.orders.get_order(&viewer, id).await?;
    Ok(Json(ApiResponse::success(detail)))
}

#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/status",
    summary = "Transition order status",
    description = "Move an order along its lifecycle. Cancelling a pending order returns its stock.",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<order::Model>),
        (status = 400, description = "Invalid status or transition", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller may not make this change", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> ApiResult<order::Model> {
    request.validate()?;

    // Customers may withdraw their own order but not drive fulfilment.
    if caller.role == CallerRole::Customer
        && request.status.trim() != OrderStatus::Cancelled.as_ref()
    {
        return Err(ServiceError::Forbidden(
            "Customers can only cancel orders".to_string(),
        ));
    }

    let viewer = caller.viewer(&state).await?;
    state.services.orders.get_order(&viewer, id).await?;

    let updated = state
        .services
        .order_status
        .transition_status(
            id,
            &request.status,
            Some(caller.user_id),
            request.notes,
            request.tracking_number,
        )
        .await?;

    info!(order_id = %id, status = updated.status.as_ref(), role = caller.role.as_ref(), "Order status changed via API");
    let message = format!("Order status updated to {}", updated.status.as_ref());
    Ok(Json(ApiResponse::with_message(updated, message)))
}
