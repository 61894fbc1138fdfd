use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Fulfilment lifecycle of an order.
///
/// `cancelled` and `returned` are terminal. Every other edge is listed in
/// [`OrderStatus::allowed_transitions`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "returned")]
    Returned,
}

impl OrderStatus {
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Paid, Cancelled],
            Paid => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Returned],
            Delivered => &[Returned],
            Cancelled | Returned => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// Payment lifecycle, tracked independently of fulfilment.
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
    strum::EnumString,
    strum::AsRefStr,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "failed")]
    Failed,
    #[sea_orm(string_value = "refunded")]
    Refunded,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
#[schema(as = Order)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Human-traceable id, `PAY{YYYYMMDD}{8 hex}`
    #[sea_orm(unique)]
    pub order_number: String,
    pub customer_id: Uuid,
    pub entrepreneur_id: Uuid,
    pub supplier_id: Uuid,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    /// Supplier cost of all lines
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub subtotal: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub markup_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub commission_amount: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub shipping_fee: Decimal,
    /// Resale value of all lines plus shipping
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub total_amount: Decimal,
    pub currency: String,
    /// Address snapshot taken at checkout
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Object)]
    pub shipping_address: Json,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
    #[sea_orm(has_many = "super::order_status_history::Entity")]
    StatusHistory,
    #[sea_orm(has_many = "super::earning::Entity")]
    Earnings,
    #[sea_orm(
        belongs_to = "super::entrepreneur::Entity",
        from = "Column::EntrepreneurId",
        to = "super::entrepreneur::Column::Id"
    )]
    Entrepreneur,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
    }
}

impl Related<super::order_status_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StatusHistory.def()
    }
}

impl Related<super::earning::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Earnings.def()
    }
}

impl Related<super::entrepreneur::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Entrepreneur.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::OrderStatus::{self, *};
    use sea_orm::Iterable;
    use std::str::FromStr;
    use test_case::test_case;

    #[test_case(Pending, Paid ; "pending to paid")]
    #[test_case(Pending, Cancelled ; "pending to cancelled")]
    #[test_case(Paid, Processing ; "paid to processing")]
    #[test_case(Paid, Cancelled ; "paid to cancelled")]
    #[test_case(Processing, Shipped ; "processing to shipped")]
    #[test_case(Processing, Cancelled ; "processing to cancelled")]
    #[test_case(Shipped, Delivered ; "shipped to delivered")]
    #[test_case(Shipped, Returned ; "shipped to returned")]
    #[test_case(Delivered, Returned ; "delivered to returned")]
    fn allowed_edges(from: OrderStatus, to: OrderStatus) {
        assert!(from.can_transition_to(to));
    }

    #[test_case(Delivered, Shipped ; "delivered back to shipped")]
    #[test_case(Pending, Shipped ; "pending skips to shipped")]
    #[test_case(Shipped, Cancelled ; "shipped cannot cancel")]
    #[test_case(Paid, Pending ; "paid back to pending")]
    #[test_case(Cancelled, Pending ; "cancelled is terminal")]
    #[test_case(Returned, Delivered ; "returned is terminal")]
    fn rejected_edges(from: OrderStatus, to: OrderStatus) {
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn self_loops_are_never_allowed() {
        for status in OrderStatus::iter() {
            assert!(!status.can_transition_to(status), "{:?}", status);
        }
    }

    #[test]
    fn edge_count_matches_lifecycle_table() {
        let edges: usize = OrderStatus::iter()
            .map(|s| s.allowed_transitions().len())
            .sum();
        assert_eq!(edges, 9);
        assert!(Cancelled.is_terminal());
        assert!(Returned.is_terminal());
        assert!(!Delivered.is_terminal());
    }

    #[test]
    fn parses_wire_names() {
        assert_eq!(OrderStatus::from_str("processing").unwrap(), Processing);
        assert_eq!(Shipped.as_ref(), "shipped");
        assert!(OrderStatus::from_str("teleported").is_err());
    }
}
