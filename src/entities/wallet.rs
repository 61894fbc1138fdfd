use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Per-user running balance. `balance` and `pending_balance` never go
/// negative and `total_earned` only grows. Writers bump `version`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "wallets")]
#[schema(as = Wallet)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub user_id: Uuid,
    /// Withdrawable now
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub balance: Decimal,
    /// Reserved against in-flight withdrawals
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub pending_balance: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_earned: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_withdrawn: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
