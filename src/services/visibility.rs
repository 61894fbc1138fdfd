//! Which orders a caller may see, by role.

use sea_orm::{ColumnTrait, Condition};
use uuid::Uuid;

use crate::entities::order;

/// Row-level scope over the `orders` table.
pub trait OrderVisibility {
    fn scope(&self) -> Condition;
}

/// The closed set of parties that read orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    /// Orders the user placed
    Customer { user_id: Uuid },
    /// Orders placed through the storefront
    Entrepreneur { entrepreneur_id: Uuid },
    /// Orders for the supplier's goods
    Supplier { supplier_id: Uuid },
    /// Platform operators see everything
    Staff,
}

impl OrderVisibility for Viewer {
    fn scope(&self) -> Condition {
        match *self {
            Viewer::Customer { user_id } => {
                Condition::all().add(order::Column::CustomerId.eq(user_id))
            }
            Viewer::Entrepreneur { entrepreneur_id } => {
                Condition::all().add(order::Column::EntrepreneurId.eq(entrepreneur_id))
            }
            Viewer::Supplier { supplier_id } => {
                Condition::all().add(order::Column::SupplierId.eq(supplier_id))
            }
            Viewer::Staff => Condition::all(),
        }
    }
}
