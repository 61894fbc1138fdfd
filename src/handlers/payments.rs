use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::{
    errors::ServiceError,
    handlers::Caller,
    services::payments::{InitiatePaymentRequest, InitiatePaymentResponse},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    post,
    path = "/api/v1/payments/initialize",
    summary = "Start payment",
    description = "Open a provider checkout session for one of the caller's pending orders",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Checkout session created", body = ApiResponse<InitiatePaymentResponse>),
        (status = 400, description = "Order cannot be paid or provider unsupported", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse),
    ),
    tag = "payments"
)]
pub async fn initiate_payment(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<InitiatePaymentRequest>,
) -> ApiResult<InitiatePaymentResponse> {
    let session = state
        .services
        .payments
        .initiate_payment(caller.user_id, request)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

// POST /api/v1/payments/webhooks/{provider}
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhooks/{provider}",
    params(("provider" = String, Path, description = "Registered provider, e.g. paystack")),
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted"),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 400, description = "Invalid payload or unsupported provider", body = crate::errors::ErrorResponse)
    ),
    tag = "payments"
)]
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ServiceError> {
    let payments = &state.services.payments;
    let signature = headers
        .get(payments.signature_header(&provider)?)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let outcome = payments.handle_webhook(&provider, &body, signature).await?;

    // Every verified delivery is acknowledged so the provider stops retrying.
    Ok((
        StatusCode::OK,
        Json(json!({ "status": "ok", "outcome": outcome.label() })),
    ))
}
