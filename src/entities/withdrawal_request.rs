use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WithdrawalMethod {
    #[sea_orm(string_value = "bank")]
    Bank,
    #[sea_orm(string_value = "crypto")]
    Crypto,
}

impl WithdrawalMethod {
    /// Keys that must be present and non-empty in `destination_details`.
    pub fn required_destination_keys(self) -> &'static [&'static str] {
        match self {
            WithdrawalMethod::Bank => &["account_number", "bank_code", "account_name"],
            WithdrawalMethod::Crypto => &["wallet_address", "crypto_type"],
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WithdrawalStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "failed")]
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "withdrawal_requests")]
#[schema(as = WithdrawalRequest)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub entrepreneur_id: Uuid,
    /// Gross amount reserved from the wallet
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub amount: Decimal,
    /// Informational; not deducted at reservation time
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub processing_fee: Decimal,
    pub withdrawal_method: WithdrawalMethod,
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Object)]
    pub destination_details: Json,
    pub status: WithdrawalStatus,
    #[sea_orm(unique)]
    pub reference_id: String,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::entrepreneur::Entity",
        from = "Column::EntrepreneurId",
        to = "super::entrepreneur::Column::Id"
    )]
    Entrepreneur,
}

impl Related<super::entrepreneur::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entrepreneur.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
