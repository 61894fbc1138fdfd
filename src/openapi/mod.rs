use axum::{response::Json, routing::get, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Payjaro API",
        version = "1.0.0",
        description = r#"
# Payjaro Settlement API

Order fulfilment and earnings settlement for a reseller marketplace.

## Features

- **Checkout**: Carts become pending orders with reserved stock and pending earnings
- **Order Lifecycle**: Guarded status transitions with an append-only history
- **Payment Reconciliation**: Signed, idempotent provider webhooks credit entrepreneur wallets
- **Wallets**: Balances, earnings summaries and withdrawal reservations

## Caller identity

Requests are authenticated by the upstream gateway, which forwards:

```
x-user-id: <uuid>
x-user-role: customer | entrepreneur | supplier | staff
```

## Error Handling

Errors share one body. Rejected carts list every offending line:

```json
{
  "error": "Unprocessable Entity",
  "message": "Cart rejected: 1 violation(s)",
  "violations": [{"kind": "invalid_pricing", "line": 0}],
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Checkout and order lifecycle"),
        (name = "payments", description = "Payment initiation and provider webhooks"),
        (name = "wallet", description = "Wallets, earnings and withdrawals")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,

        // Payments
        crate::handlers::payments::initiate_payment,
        crate::handlers::payments::provider_webhook,

        // Wallet
        crate::handlers::wallet::get_wallet,
        crate::handlers::wallet::reconcile_wallet,
        crate::handlers::wallet::list_earnings,
        crate::handlers::wallet::earnings_summary,
        crate::handlers::wallet::list_withdrawals,
        crate::handlers::wallet::request_withdrawal,
    ),
    components(
        schemas(
            // Entities
            crate::entities::order::Model,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::entities::order_item::Model,
            crate::entities::order_status_history::Model,
            crate::entities::earning::Model,
            crate::entities::wallet::Model,
            crate::entities::withdrawal_request::Model,
            crate::entities::withdrawal_request::WithdrawalMethod,

            // Requests and read models
            crate::services::orders::CartLine,
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::OrderDetail,
            crate::services::orders::OrderListResponse,
            crate::services::order_status::TransitionRequest,
            crate::services::payments::InitiatePaymentRequest,
            crate::services::payments::InitiatePaymentResponse,
            crate::services::wallet::WithdrawalInput,
            crate::services::wallet::EarningsSummary,
            crate::services::wallet::WalletReconciliation,

            // Error types
            crate::errors::ErrorResponse,
            crate::errors::CartViolation
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`.
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
