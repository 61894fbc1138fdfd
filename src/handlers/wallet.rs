use axum::{extract::State, http::StatusCode, response::Json};

use crate::{
    entities::{earning, wallet, withdrawal_request},
    errors::ServiceError,
    handlers::Caller,
    services::wallet::{EarningsSummary, WalletReconciliation, WithdrawalInput},
    ApiResponse, ApiResult, AppState,
};

#[utoipa::path(
    get,
    path = "/api/v1/wallet",
    summary = "Get wallet",
    responses(
        (status = 200, description = "Caller's wallet", body = ApiResponse<wallet::Model>),
        (status = 401, description = "Missing caller identity", body = crate::errors::ErrorResponse),
    ),
    tag = "wallet"
)]
pub async fn get_wallet(State(state): State<AppState>, caller: Caller) -> ApiResult<wallet::Model> {
    let wallet = state.services.wallet.get_wallet(caller.user_id).await?;
    Ok(Json(ApiResponse::success(wallet)))
}

#[utoipa::path(
    get,
    path = "/api/v1/wallet/reconciliation",
    summary = "Reconcile wallet",
    description = "Recompute the wallet from paid earnings and open withdrawals",
    responses(
        (status = 200, description = "Reconciliation report", body = ApiResponse<WalletReconciliation>),
        (status = 403, description = "Caller is not an entrepreneur", body = crate::errors::ErrorResponse),
    ),
    tag = "wallet"
)]
pub async fn reconcile_wallet(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<WalletReconciliation> {
    let entrepreneur_id = caller.entrepreneur_id(&state).await?;
    let report = state.services.wallet.reconcile_wallet(entrepreneur_id).await?;
    Ok(Json(ApiResponse::success(report)))
}

#[utoipa::path(
    get,
    path = "/api/v1/earnings",
    summary = "List earnings",
    responses(
        (status = 200, description = "Earning rows, newest first", body = ApiResponse<Vec<earning::Model>>),
        (status = 403, description = "Caller is not an entrepreneur", body = crate::errors::ErrorResponse),
    ),
    tag = "wallet"
)]
pub async fn list_earnings(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<earning::Model>> {
    let entrepreneur_id = caller.entrepreneur_id(&state).await?;
    let earnings = state.services.wallet.list_earnings(entrepreneur_id).await?;
    Ok(Json(ApiResponse::success(earnings)))
}

#[utoipa::path(
    get,
    path = "/api/v1/earnings/summary",
    summary = "Earnings summary",
    responses(
        (status = 200, description = "Balances and earning totals", body = ApiResponse<EarningsSummary>),
        (status = 403, description = "Caller is not an entrepreneur", body = crate::errors::ErrorResponse),
    ),
    tag = "wallet"
)]
pub async fn earnings_summary(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<EarningsSummary> {
    let entrepreneur_id = caller.entrepreneur_id(&state).await?;
    let summary = state.services.wallet.earnings_summary(entrepreneur_id).await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[utoipa::path(
    get,
    path = "/api/v1/withdrawals",
    summary = "List withdrawals",
    responses(
        (status = 200, description = "Withdrawal requests, newest first", body = ApiResponse<Vec<withdrawal_request::Model>>),
        (status = 403, description = "Caller is not an entrepreneur", body = crate::errors::ErrorResponse),
    ),
    tag = "wallet"
)]
pub async fn list_withdrawals(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Vec<withdrawal_request::Model>> {
    let entrepreneur_id = caller.entrepreneur_id(&state).await?;
    let requests = state.services.wallet.list_withdrawals(entrepreneur_id).await?;
    Ok(Json(ApiResponse::success(requests)))
}

#[utoipa::path(
    post,
    path = "/api/v1/withdrawals",
    summary = "Request withdrawal",
    description = "Reserve funds from the wallet balance for payout",
    request_body = WithdrawalInput,
    responses(
        (status = 201, description = "Withdrawal requested", body = ApiResponse<withdrawal_request::Model>),
        (status = 400, description = "Invalid amount or destination", body = crate::errors::ErrorResponse),
        (status = 403, description = "Caller is not an entrepreneur", body = crate::errors::ErrorResponse),
        (status = 422, description = "Below minimum or insufficient balance", body = crate::errors::ErrorResponse),
    ),
    tag = "wallet"
)]
pub async fn request_withdrawal(
    State(state): State<AppState>,
    caller: Caller,
    Json(input): Json<WithdrawalInput>,
) -> Result<(StatusCode, Json<ApiResponse<withdrawal_request::Model>>), ServiceError> {
    let entrepreneur_id = caller.entrepreneur_id(&state).await?;
    let request = state
        .services
        .wallet
        .request_withdrawal(entrepreneur_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(request))))
}
