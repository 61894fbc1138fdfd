use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    config::CommerceConfig,
    db::retry_on_conflict,
    entities::{
        earning::{self, EarningStatus, EarningType},
        wallet,
        withdrawal_request::{self, WithdrawalMethod, WithdrawalStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::entrepreneurs,
};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WithdrawalInput {
    pub amount: Decimal,
    pub withdrawal_method: WithdrawalMethod,
    /// Bank: `account_number`, `bank_code`, `account_name`.
    /// Crypto: `wallet_address`, `crypto_type`.
    #[schema(value_type = Object)]
    pub destination_details: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EarningsSummary {
    pub entrepreneur_id: Uuid,
    pub available_balance: Decimal,
    pub pending_balance: Decimal,
    pub total_earned: Decimal,
    pub total_withdrawn: Decimal,
    pub markup_earnings: Decimal,
    pub commission_earnings: Decimal,
    /// Earnings on orders that have not been paid yet
    pub pending_earnings: Decimal,
    pub total_sales: Decimal,
    pub currency: String,
}

/// Wallet figures recomputed from the ledger rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WalletReconciliation {
    pub wallet_id: Uuid,
    pub recorded_total_earned: Decimal,
    pub computed_total_earned: Decimal,
    pub recorded_pending_balance: Decimal,
    pub computed_pending_balance: Decimal,
    pub recorded_balance: Decimal,
    /// `total_earned - total_withdrawn - pending_balance`
    pub expected_balance: Decimal,
    pub balanced: bool,
}

/// Returns the user's wallet, creating an empty one on first use.
///
/// A concurrent first use loses on the unique `user_id` index; that error
/// is retryable and the enclosing unit of work starts over.
pub async fn ensure_wallet<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    currency: &str,
) -> Result<wallet::Model, ServiceError> {
    if let Some(existing) = wallet::Entity::find()
        .filter(wallet::Column::UserId.eq(user_id))
        .one(conn)
        .await?
    {
        return Ok(existing);
    }

    let now = Utc::now();
    let created = wallet::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        balance: Set(Decimal::ZERO),
        pending_balance: Set(Decimal::ZERO),
        total_earned: Set(Decimal::ZERO),
        total_withdrawn: Set(Decimal::ZERO),
        currency: Set(currency.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        version: Set(1),
    }
    .insert(conn)
    .await?;

    info!(user_id = %user_id, wallet_id = %created.id, "Created wallet");
    Ok(created)
}

/// Adds settled earnings to the wallet, guarded by the version read in
/// `wallet`.
pub async fn credit_wallet<C: ConnectionTrait>(
    conn: &C,
    wallet: &wallet::Model,
    amount: Decimal,
) -> Result<(), ServiceError> {
    let result = wallet::Entity::update_many()
        .col_expr(wallet::Column::Balance, Expr::col(wallet::Column::Balance).add(amount))
        .col_expr(
            wallet::Column::TotalEarned,
            Expr::col(wallet::Column::TotalEarned).add(amount),
        )
        .col_expr(wallet::Column::Version, Expr::value(wallet.version + 1))
        .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(wallet::Column::Id.eq(wallet.id))
        .filter(wallet::Column::Version.eq(wallet.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Wallet {} was modified concurrently",
            wallet.id
        )));
    }
    Ok(())
}

/// Moves `amount` from `balance` to `pending_balance`, guarded by the
/// version read in `wallet`. The caller checks the balance first.
pub async fn reserve_balance<C: ConnectionTrait>(
    conn: &C,
    wallet: &wallet::Model,
    amount: Decimal,
) -> Result<(), ServiceError> {
    let result = wallet::Entity::update_many()
        .col_expr(wallet::Column::Balance, Expr::col(wallet::Column::Balance).sub(amount))
        .col_expr(
            wallet::Column::PendingBalance,
            Expr::col(wallet::Column::PendingBalance).add(amount),
        )
        .col_expr(wallet::Column::Version, Expr::value(wallet.version + 1))
        .col_expr(wallet::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(wallet::Column::Id.eq(wallet.id))
        .filter(wallet::Column::Version.eq(wallet.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Wallet {} was modified concurrently",
            wallet.id
        )));
    }
    Ok(())
}

/// `max(amount * rate, minimum_fee)` rounded to cents.
pub fn processing_fee(amount: Decimal, commerce: &CommerceConfig) -> Decimal {
    (amount * commerce.withdrawal_fee_rate)
        .max(commerce.withdrawal_minimum_fee)
        .round_dp(2)
}

/// `WD{YYYYMMDD}{8 upper-case hex}`
fn withdrawal_reference() -> String {
    let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("WD{}{}", Utc::now().format("%Y%m%d"), &suffix[..8])
}

pub fn validate_destination(
    method: WithdrawalMethod,
    details: &serde_json::Value,
) -> Result<(), ServiceError> {
    let object = details.as_object().ok_or_else(|| {
        ServiceError::ValidationError("destination_details must be an object".to_string())
    })?;

    let missing: Vec<&str> = method
        .required_destination_keys()
        .iter()
        .copied()
        .filter(|key| {
            object
                .get(*key)
                .and_then(|v| v.as_str())
                .map_or(true, |v| v.trim().is_empty())
        })
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ServiceError::ValidationError(format!(
            "destination_details for {} withdrawals is missing: {}",
            method.as_ref(),
            missing.join(", ")
        )))
    }
}

#[derive(Clone)]
pub struct WalletService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    commerce: CommerceConfig,
}

impl WalletService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        commerce: CommerceConfig,
    ) -> Self {
        Self {
            db,
            event_sender,
            commerce,
        }
    }

    #[instrument(skip(self))]
    pub async fn get_wallet(&self, user_id: Uuid) -> Result<wallet::Model, ServiceError> {
        ensure_wallet(&*self.db, user_id, &self.commerce.currency).await
    }

    /// Reserves `amount` from the entrepreneur's balance for payout.
    ///
    /// The gross amount moves from `balance` to `pending_balance`; the fee is
    /// recorded on the request only.
    #[instrument(skip(self, input), fields(entrepreneur_id = %entrepreneur_id, amount = %input.amount, method = input.withdrawal_method.as_ref()))]
    pub async fn request_withdrawal(
        &self,
        entrepreneur_id: Uuid,
        input: WithdrawalInput,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        if input.amount <= Decimal::ZERO || input.amount.scale() > 2 {
            return Err(ServiceError::ValidationError(
                "amount must be positive with at most two decimal places".to_string(),
            ));
        }
        if input.amount < self.commerce.minimum_withdrawal {
            return Err(ServiceError::BelowMinimum {
                amount: input.amount,
                minimum: self.commerce.minimum_withdrawal,
            });
        }
        validate_destination(input.withdrawal_method, &input.destination_details)?;

        let entrepreneur = entrepreneurs::find_by_id(&*self.db, entrepreneur_id).await?;
        let fee = processing_fee(input.amount, &self.commerce);

        let request = retry_on_conflict("request_withdrawal", self.commerce.max_conflict_retries, |_| {
            self.reserve_once(entrepreneur.id, entrepreneur.user_id, &input, fee)
        })
        .await
        .map_err(|e| {
            if let ServiceError::InsufficientBalance { .. } = e {
                counter!("payjaro.withdrawals.rejected", 1);
            }
            e
        })?;

        counter!("payjaro.withdrawals.requested", 1);
        info!(
            withdrawal_id = %request.id,
            reference_id = %request.reference_id,
            fee = %request.processing_fee,
            "Withdrawal requested"
        );

        self.event_sender
            .send_or_log(Event::WithdrawalRequested {
                withdrawal_id: request.id,
                entrepreneur_id,
                amount: request.amount,
                reference_id: request.reference_id.clone(),
            })
            .await;

        Ok(request)
    }

    async fn reserve_once(
        &self,
        entrepreneur_id: Uuid,
        user_id: Uuid,
        input: &WithdrawalInput,
        fee: Decimal,
    ) -> Result<withdrawal_request::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for withdrawal");
            ServiceError::DatabaseError(e)
        })?;

        let wallet = ensure_wallet(&txn, user_id, &self.commerce.currency).await?;
        if wallet.balance < input.amount {
            warn!(balance = %wallet.balance, requested = %input.amount, "Insufficient wallet balance");
            return Err(ServiceError::InsufficientBalance {
                requested: input.amount,
                available: wallet.balance,
            });
        }

        reserve_balance(&txn, &wallet, input.amount).await?;

        let now = Utc::now();
        let request = withdrawal_request::ActiveModel {
            id: Set(Uuid::new_v4()),
            entrepreneur_id: Set(entrepreneur_id),
            amount: Set(input.amount),
            processing_fee: Set(fee),
            withdrawal_method: Set(input.withdrawal_method),
            destination_details: Set(input.destination_details.clone()),
            status: Set(WithdrawalStatus::Pending),
            reference_id: Set(withdrawal_reference()),
            processed_at: Set(None),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, "Failed to commit withdrawal reservation");
            ServiceError::DatabaseError(e)
        })?;

        Ok(request)
    }

    #[instrument(skip(self))]
    pub async fn list_withdrawals(
        &self,
        entrepreneur_id: Uuid,
    ) -> Result<Vec<withdrawal_request::Model>, ServiceError> {
        withdrawal_request::Entity::find()
            .filter(withdrawal_request::Column::EntrepreneurId.eq(entrepreneur_id))
            .order_by_desc(withdrawal_request::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Earning rows for the entrepreneur, newest first.
    #[instrument(skip(self))]
    pub async fn list_earnings(
        &self,
        entrepreneur_id: Uuid,
    ) -> Result<Vec<earning::Model>, ServiceError> {
        earning::Entity::find()
            .filter(earning::Column::EntrepreneurId.eq(entrepreneur_id))
            .order_by_desc(earning::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    #[instrument(skip(self))]
    pub async fn earnings_summary(&self, entrepreneur_id: Uuid) -> Result<EarningsSummary, ServiceError> {
        let db = &*self.db;
        let entrepreneur = entrepreneurs::find_by_id(db, entrepreneur_id).await?;
        let wallet = ensure_wallet(db, entrepreneur.user_id, &self.commerce.currency).await?;

        let earnings = earning::Entity::find()
            .filter(earning::Column::EntrepreneurId.eq(entrepreneur_id))
            .all(db)
            .await?;

        let sum = |status: EarningStatus, kind: Option<EarningType>| -> Decimal {
            earnings
                .iter()
                .filter(|e| e.status == status && kind.map_or(true, |k| e.earning_type == k))
                .map(|e| e.amount)
                .sum()
        };

        Ok(EarningsSummary {
            entrepreneur_id,
            available_balance: wallet.balance,
            pending_balance: wallet.pending_balance,
            total_earned: wallet.total_earned,
            total_withdrawn: wallet.total_withdrawn,
            markup_earnings: sum(EarningStatus::Paid, Some(EarningType::Markup)),
            commission_earnings: sum(EarningStatus::Paid, Some(EarningType::Commission)),
            pending_earnings: sum(EarningStatus::Pending, None),
            total_sales: entrepreneur.total_sales,
            currency: wallet.currency,
        })
    }

    /// Recomputes the wallet from paid earnings and open withdrawals.
    #[instrument(skip(self))]
    pub async fn reconcile_wallet(
        &self,
        entrepreneur_id: Uuid,
    ) -> Result<WalletReconciliation, ServiceError> {
        let db = &*self.db;
        let entrepreneur = entrepreneurs::find_by_id(db, entrepreneur_id).await?;
        let wallet = ensure_wallet(db, entrepreneur.user_id, &self.commerce.currency).await?;

        let computed_total_earned: Decimal = earning::Entity::find()
            .filter(earning::Column::EntrepreneurId.eq(entrepreneur_id))
            .filter(earning::Column::Status.eq(EarningStatus::Paid))
            .all(db)
            .await?
            .iter()
            .map(|e| e.amount)
            .sum();

        let computed_pending_balance: Decimal = withdrawal_request::Entity::find()
            .filter(withdrawal_request::Column::EntrepreneurId.eq(entrepreneur_id))
            .filter(
                withdrawal_request::Column::Status
                    .is_in([WithdrawalStatus::Pending, WithdrawalStatus::Processing]),
            )
            .all(db)
            .await?
            .iter()
            .map(|w| w.amount)
            .sum();

        let expected_balance = wallet.total_earned - wallet.total_withdrawn - wallet.pending_balance;
        let balanced = computed_total_earned == wallet.total_earned
            && computed_pending_balance == wallet.pending_balance
            && expected_balance == wallet.balance;

        if !balanced {
            warn!(
                wallet_id = %wallet.id,
                recorded_total_earned = %wallet.total_earned,
                computed_total_earned = %computed_total_earned,
                recorded_pending = %wallet.pending_balance,
                computed_pending = %computed_pending_balance,
                "Wallet does not match ledger"
            );
        }

        Ok(WalletReconciliation {
            wallet_id: wallet.id,
            recorded_total_earned: wallet.total_earned,
            computed_total_earned,
            recorded_pending_balance: wallet.pending_balance,
            computed_pending_balance,
            recorded_balance: wallet.balance,
            expected_balance,
            balanced,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use test_case::test_case;

    #[test_case(dec!(1000.00), dec!(50.00) ; "minimum fee applies")]
    #[test_case(dec!(2500.00), dec!(50.00) ; "rate equals minimum")]
    #[test_case(dec!(10000.00), dec!(200.00) ; "rate applies")]
    #[test_case(dec!(3333.33), dec!(66.67) ; "rounded to cents")]
    fn processing_fee_is_rate_with_floor(amount: Decimal, expected: Decimal) {
        assert_eq!(processing_fee(amount, &CommerceConfig::default()), expected);
    }

    #[test]
    fn bank_destination_requires_account_fields() {
        let ok = json!({"account_number": "0123456789", "bank_code": "058", "account_name": "Ada Obi"});
        assert!(validate_destination(WithdrawalMethod::Bank, &ok).is_ok());

        let err = validate_destination(WithdrawalMethod::Bank, &json!({"account_number": "0123"}))
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(msg) if msg.contains("bank_code")));
    }

    #[test]
    fn crypto_destination_requires_wallet_address() {
        let details = json!({"crypto_type": "USDT", "wallet_address": ""});
        assert!(validate_destination(WithdrawalMethod::Crypto, &details).is_err());
    }
}
