use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::CommerceConfig,
    db::retry_on_conflict,
    entities::{
        earning::{self, EarningStatus},
        entrepreneur,
        order::{self, OrderStatus, PaymentStatus},
        order_status_history,
        payment_transaction::{self, TransactionStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        entrepreneurs,
        payment_provider::{to_minor_units, ProviderRegistry},
        wallet::{credit_wallet, ensure_wallet},
    },
};

/// Failure reason recorded when the provider reports a different amount.
pub const AMOUNT_MISMATCH: &str = "amount_mismatch";

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct InitiatePaymentRequest {
    pub order_id: Uuid,
    #[validate(email)]
    pub email: String,
    #[validate(url)]
    pub callback_url: String,
    /// Registered provider name, e.g. `paystack`. Defaults to the primary provider.
    #[serde(default)]
    #[validate(length(min = 1, max = 30))]
    pub provider: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiatePaymentResponse {
    pub authorization_url: String,
    pub reference: String,
    pub transaction_id: Uuid,
}

/// Provider webhook body. Only the fields reconciliation reads.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    #[serde(default)]
    pub status: Option<String>,
    /// Minor units (kobo)
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub gateway_response: Option<String>,
    #[serde(default)]
    pub paid_at: Option<String>,
}

/// What a verified webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// Order paid and the entrepreneur's wallet credited
    Credited { order_id: Uuid, amount: Decimal },
    /// Redelivery of a settled transaction
    AlreadyProcessed,
    /// No transaction was initiated with this reference
    UnknownReference,
    FailureRecorded,
    /// Money captured for an order that can no longer be paid; flagged for refund
    OrderNotPayable { order_id: Uuid },
    AmountMismatch,
    /// Event type this service does not act on
    Ignored,
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Credited { .. } => "credited",
            WebhookOutcome::AlreadyProcessed => "already_processed",
            WebhookOutcome::UnknownReference => "unknown_reference",
            WebhookOutcome::FailureRecorded => "failure_recorded",
            WebhookOutcome::OrderNotPayable { .. } => "order_not_payable",
            WebhookOutcome::AmountMismatch => "amount_mismatch",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

fn merge_metadata(base: &Value, extra: Value) -> Value {
    let mut merged = base.as_object().cloned().unwrap_or_default();
    if let Value::Object(extra) = extra {
        merged.extend(extra);
    }
    Value::Object(merged)
}

/// Payment initiation and webhook reconciliation.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    providers: ProviderRegistry,
    event_sender: EventSender,
    commerce: CommerceConfig,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        providers: ProviderRegistry,
        event_sender: EventSender,
        commerce: CommerceConfig,
    ) -> Self {
        Self {
            db,
            providers,
            event_sender,
            commerce,
        }
    }

    /// Header the named provider signs its webhooks in.
    pub fn signature_header(&self, provider: &str) -> Result<&'static str, ServiceError> {
        Ok(self.providers.get(provider)?.signature_header())
    }

    /// Opens a checkout session for a pending order and records the attempt.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn initiate_payment(
        &self,
        customer_id: Uuid,
        request: InitiatePaymentRequest,
    ) -> Result<InitiatePaymentResponse, ServiceError> {
        request.validate()?;
        let provider = match request.provider.as_deref() {
            Some(name) => self.providers.get(name)?,
            None => self.providers.default_provider(),
        }
        .clone();

        let order = order::Entity::find_by_id(request.order_id)
            .filter(order::Column::CustomerId.eq(customer_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", request.order_id)))?;

        if order.payment_status == PaymentStatus::Paid {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is already paid",
                order.order_number
            )));
        }
        if order.status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "Order {} is {} and cannot be paid",
                order.order_number,
                order.status.as_ref()
            )));
        }

        let session = provider
            .initialize_payment(&order, &request.email, &request.callback_url)
            .await?;

        let now = Utc::now();
        let transaction = payment_transaction::ActiveModel {
            id: Set(Uuid::new_v4()),
            reference: Set(session.reference.clone()),
            order_id: Set(order.id),
            user_id: Set(customer_id),
            amount: Set(order.total_amount),
            currency: Set(order.currency.clone()),
            status: Set(TransactionStatus::Pending),
            provider: Set(provider.name().to_string()),
            metadata: Set(json!({
                "provider": provider.name(),
                "callback_url": request.callback_url,
                "access_code": session.access_code,
            })),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| {
            error!(error = %e, reference = %session.reference, "Failed to record payment transaction");
            ServiceError::DatabaseError(e)
        })?;

        counter!("payjaro.payments.initiated", 1, "provider" => provider.name());
        info!(
            reference = %transaction.reference,
            amount = %transaction.amount,
            provider = provider.name(),
            "Payment initiated"
        );

        Ok(InitiatePaymentResponse {
            authorization_url: session.authorization_url,
            reference: transaction.reference,
            transaction_id: transaction.id,
        })
    }

    /// Verifies and applies a webhook from `provider`. Deliveries are
    /// idempotent per reference; an invalid signature changes nothing.
    #[instrument(skip(self, payload, signature), fields(bytes = payload.len()))]
    pub async fn handle_webhook(
        &self,
        provider: &str,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookOutcome, ServiceError> {
        let provider = self.providers.get(provider)?.clone();
        if !provider.verify_signature(payload, signature) {
            warn!("Rejected webhook with invalid signature");
            counter!("payjaro.webhooks.rejected", 1);
            return Err(ServiceError::InvalidSignature);
        }

        let webhook: WebhookPayload = serde_json::from_slice(payload)
            .map_err(|e| ServiceError::ValidationError(format!("Invalid webhook payload: {}", e)))?;

        let outcome = match webhook.event.as_str() {
            "charge.success" => {
                retry_on_conflict("reconcile_payment", self.commerce.max_conflict_retries, |_| {
                    self.apply_success(provider.name(), &webhook.data)
                })
                .await?
            }
            "charge.failed" => {
                retry_on_conflict("record_payment_failure", self.commerce.max_conflict_retries, |_| {
                    self.apply_failure(provider.name(), &webhook.data)
                })
                .await?
            }
            other => {
                info!(event = other, "Ignoring webhook event");
                WebhookOutcome::Ignored
            }
        };

        counter!("payjaro.webhooks.processed", 1, "outcome" => outcome.label());
        info!(
            event = %webhook.event,
            reference = %webhook.data.reference,
            outcome = outcome.label(),
            "Webhook processed"
        );

        match &outcome {
            WebhookOutcome::Credited { order_id, amount } => {
                self.event_sender
                    .send_or_log(Event::PaymentReconciled {
                        order_id: *order_id,
                        reference: webhook.data.reference.clone(),
                        credited: *amount,
                    })
                    .await;
            }
            WebhookOutcome::FailureRecorded | WebhookOutcome::AmountMismatch => {
                self.event_sender
                    .send_or_log(Event::PaymentFailed {
                        reference: webhook.data.reference.clone(),
                        reason: failure_reason(&webhook.data, &outcome),
                    })
                    .await;
            }
            _ => {}
        }

        Ok(outcome)
    }

    async fn apply_success(
        &self,
        provider: &str,
        data: &WebhookData,
    ) -> Result<WebhookOutcome, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for payment reconciliation");
            ServiceError::DatabaseError(e)
        })?;

        let Some(transaction) = find_transaction(&txn, provider, &data.reference).await? else {
            warn!(reference = %data.reference, provider, "Webhook for unknown payment reference");
            return Ok(WebhookOutcome::UnknownReference);
        };
        if matches!(
            transaction.status,
            TransactionStatus::Completed | TransactionStatus::Refunded
        ) {
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        if let (Some(reported), Some(expected)) = (data.amount, to_minor_units(transaction.amount)) {
            if reported != expected {
                warn!(reference = %data.reference, reported, expected, "Webhook amount does not match transaction");
                mark_transaction(
                    &txn,
                    &transaction,
                    TransactionStatus::Failed,
                    json!({
                        "failure_reason": AMOUNT_MISMATCH,
                        "reported_amount": reported,
                        "gateway_response": data.gateway_response,
                    }),
                )
                .await?;
                commit(txn).await?;
                return Ok(WebhookOutcome::AmountMismatch);
            }
        }

        let order = order::Entity::find_by_id(transaction.order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order {} not found", transaction.order_id))
            })?;

        let settlement = json!({
            "gateway_response": data.gateway_response,
            "paid_at": data.paid_at,
        });

        // Staff may already have moved the order along by hand; the money
        // still settles unless the order is gone or paid through another reference.
        let payable = !matches!(order.status, OrderStatus::Cancelled | OrderStatus::Returned)
            && order.payment_status != PaymentStatus::Paid;
        if !payable {
            warn!(
                order_id = %order.id,
                status = order.status.as_ref(),
                payment_status = order.payment_status.as_ref(),
                "Payment captured for an order that is no longer payable"
            );
            mark_transaction(
                &txn,
                &transaction,
                TransactionStatus::Completed,
                merge_metadata(&settlement, json!({ "requires_refund": true })),
            )
            .await?;
            commit(txn).await?;
            return Ok(WebhookOutcome::OrderNotPayable { order_id: order.id });
        }

        mark_transaction(&txn, &transaction, TransactionStatus::Completed, settlement).await?;
        let credited = self.settle_order(&txn, &order, &transaction).await?;
        commit(txn).await?;

        Ok(WebhookOutcome::Credited {
            order_id: order.id,
            amount: credited,
        })
    }

    /// Marks the order paid, releases its earnings and credits the wallet.
    /// Returns the amount credited.
    async fn settle_order(
        &self,
        txn: &DatabaseTransaction,
        order: &order::Model,
        transaction: &payment_transaction::Model,
    ) -> Result<Decimal, ServiceError> {
        let now = Utc::now();

        if record_order_payment(txn, order, &transaction.provider).await? {
            order_status_history::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                status: Set(OrderStatus::Paid),
                notes: Set(Some(format!(
                    "Payment confirmed by {} ({})",
                    transaction.provider, transaction.reference
                ))),
                created_by: Set(None),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
        }

        let earned: Decimal = earning::Entity::find()
            .filter(earning::Column::OrderId.eq(order.id))
            .filter(earning::Column::Status.eq(EarningStatus::Pending))
            .all(txn)
            .await?
            .iter()
            .map(|e| e.amount)
            .sum();

        earning::Entity::update_many()
            .col_expr(earning::Column::Status, Expr::value(EarningStatus::Paid.as_ref()))
            .col_expr(earning::Column::PayoutDate, Expr::value(now))
            .filter(earning::Column::OrderId.eq(order.id))
            .filter(earning::Column::Status.eq(EarningStatus::Pending))
            .exec(txn)
            .await?;

        let owner = entrepreneurs::find_by_id(txn, order.entrepreneur_id).await?;
        let wallet = ensure_wallet(txn, owner.user_id, &order.currency).await?;
        credit_wallet(txn, &wallet, earned).await?;

        entrepreneur::Entity::update_many()
            .col_expr(
                entrepreneur::Column::TotalSales,
                Expr::col(entrepreneur::Column::TotalSales).add(order.total_amount),
            )
            .col_expr(
                entrepreneur::Column::TotalEarnings,
                Expr::col(entrepreneur::Column::TotalEarnings).add(earned),
            )
            .col_expr(entrepreneur::Column::UpdatedAt, Expr::value(now))
            .filter(entrepreneur::Column::Id.eq(owner.id))
            .exec(txn)
            .await?;

        info!(
            order_id = %order.id,
            wallet_id = %wallet.id,
            credited = %earned,
            "Order settled"
        );
        Ok(earned)
    }

    async fn apply_failure(
        &self,
        provider: &str,
        data: &WebhookData,
    ) -> Result<WebhookOutcome, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for payment failure");
            ServiceError::DatabaseError(e)
        })?;

        let Some(transaction) = find_transaction(&txn, provider, &data.reference).await? else {
            warn!(reference = %data.reference, provider, "Failure webhook for unknown payment reference");
            return Ok(WebhookOutcome::UnknownReference);
        };
        if matches!(
            transaction.status,
            TransactionStatus::Completed | TransactionStatus::Refunded
        ) {
            info!(reference = %data.reference, "Ignoring failure for settled transaction");
            return Ok(WebhookOutcome::AlreadyProcessed);
        }

        let reason = data
            .gateway_response
            .clone()
            .unwrap_or_else(|| "Payment failed".to_string());
        mark_transaction(
            &txn,
            &transaction,
            TransactionStatus::Failed,
            json!({ "failure_reason": reason }),
        )
        .await?;
        commit(txn).await?;

        Ok(WebhookOutcome::FailureRecorded)
    }
}

fn failure_reason(data: &WebhookData, outcome: &WebhookOutcome) -> String {
    match outcome {
        WebhookOutcome::AmountMismatch => AMOUNT_MISMATCH.to_string(),
        _ => data
            .gateway_response
            .clone()
            .unwrap_or_else(|| "Payment failed".to_string()),
    }
}

async fn find_transaction(
    txn: &DatabaseTransaction,
    provider: &str,
    reference: &str,
) -> Result<Option<payment_transaction::Model>, ServiceError> {
    payment_transaction::Entity::find()
        .filter(payment_transaction::Column::Reference.eq(reference))
        .filter(payment_transaction::Column::Provider.eq(provider))
        .one(txn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Sets `payment_status = paid` on the order as read in `order`, and moves
/// `status` to `paid` if it is still `pending`. Returns whether the status
/// moved. A write by anyone since the read makes this a `Conflict`.
pub async fn record_order_payment<C: ConnectionTrait>(
    conn: &C,
    order: &order::Model,
    provider: &str,
) -> Result<bool, ServiceError> {
    let advance = order.status == OrderStatus::Pending;
    let mut update = order::Entity::update_many()
        .col_expr(order::Column::PaymentStatus, Expr::value(PaymentStatus::Paid.as_ref()))
        .col_expr(order::Column::PaymentMethod, Expr::value(provider.to_string()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .col_expr(order::Column::Version, Expr::value(order.version + 1));
    if advance {
        update = update.col_expr(order::Column::Status, Expr::value(OrderStatus::Paid.as_ref()));
    }

    let result = update
        .filter(order::Column::Id.eq(order.id))
        .filter(order::Column::Version.eq(order.version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Order {} was modified concurrently",
            order.id
        )));
    }
    Ok(advance)
}

/// Moves a not-yet-settled transaction to `status`. Another delivery that
/// settled it first makes this a `Conflict`.
pub async fn mark_transaction<C: ConnectionTrait>(
    conn: &C,
    transaction: &payment_transaction::Model,
    status: TransactionStatus,
    metadata: Value,
) -> Result<(), ServiceError> {
    let result = payment_transaction::Entity::update_many()
        .col_expr(payment_transaction::Column::Status, Expr::value(status.as_ref()))
        .col_expr(
            payment_transaction::Column::Metadata,
            Expr::value(merge_metadata(&transaction.metadata, metadata)),
        )
        .col_expr(payment_transaction::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(payment_transaction::Column::Id.eq(transaction.id))
        .filter(payment_transaction::Column::Status.eq(transaction.status))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Payment transaction {} was claimed concurrently",
            transaction.reference
        )));
    }
    Ok(())
}

async fn commit(txn: DatabaseTransaction) -> Result<(), ServiceError> {
    txn.commit().await.map_err(|e| {
        error!(error = %e, "Failed to commit payment reconciliation");
        ServiceError::DatabaseError(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_merge_keeps_existing_keys() {
        let merged = merge_metadata(
            &json!({"provider": "paystack", "callback_url": "https://shop/cb"}),
            json!({"gateway_response": "Successful", "provider": "paystack"}),
        );
        assert_eq!(merged["callback_url"], "https://shop/cb");
        assert_eq!(merged["gateway_response"], "Successful");
    }

    #[test]
    fn webhook_payload_tolerates_missing_optional_fields() {
        let payload: WebhookPayload = serde_json::from_str(
            r#"{"event":"charge.failed","data":{"reference":"PAY_X","gateway_response":"Declined"}}"#,
        )
        .unwrap();
        assert_eq!(payload.data.reference, "PAY_X");
        assert!(payload.data.amount.is_none());
        assert_eq!(
            failure_reason(&payload.data, &WebhookOutcome::FailureRecorded),
            "Declined"
        );
    }
}
