use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter,
};
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    entities::{product, product_variation},
    errors::ServiceError,
};

/// The stock row a cart line draws from: the variation when one was
/// selected, otherwise the product itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StockTarget {
    Product(Uuid),
    Variation(Uuid),
}

impl StockTarget {
    pub fn for_line(product_id: Uuid, variation_id: Option<Uuid>) -> Self {
        match variation_id {
            Some(id) => StockTarget::Variation(id),
            None => StockTarget::Product(product_id),
        }
    }
}

/// Read access to the supplier catalog, always inside the caller's transaction.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Returns the product only when it exists and is active.
    async fn active_product(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError>;

    /// Returns the variation only when it belongs to `product_id`.
    async fn variation(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        variation_id: Uuid,
    ) -> Result<Option<product_variation::Model>, ServiceError>;
}

/// Stock counters. `decrement` must check and write in one step so two
/// concurrent orders cannot both consume the last unit.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn available(
        &self,
        txn: &DatabaseTransaction,
        target: StockTarget,
    ) -> Result<i32, ServiceError>;

    /// Returns `false` without writing when fewer than `quantity` units remain.
    async fn decrement(
        &self,
        txn: &DatabaseTransaction,
        target: StockTarget,
        quantity: i32,
    ) -> Result<bool, ServiceError>;

    async fn restock(
        &self,
        txn: &DatabaseTransaction,
        target: StockTarget,
        quantity: i32,
    ) -> Result<(), ServiceError>;
}

/// Catalog and inventory backed by the `products` and `product_variations` tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeaOrmCatalog;

#[async_trait]
impl CatalogStore for SeaOrmCatalog {
    async fn active_product(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
    ) -> Result<Option<product::Model>, ServiceError> {
        product::Entity::find_by_id(product_id)
            .filter(product::Column::IsActive.eq(true))
            .one(txn)
            .await
            .map_err(|e| {
                error!(error = %e, product_id = %product_id, "Failed to load product");
                ServiceError::DatabaseError(e)
            })
    }

    async fn variation(
        &self,
        txn: &DatabaseTransaction,
        product_id: Uuid,
        variation_id: Uuid,
    ) -> Result<Option<product_variation::Model>, ServiceError> {
        product_variation::Entity::find_by_id(variation_id)
            .filter(product_variation::Column::ProductId.eq(product_id))
            .one(txn)
            .await
            .map_err(|e| {
                error!(error = %e, variation_id = %variation_id, "Failed to load variation");
                ServiceError::DatabaseError(e)
            })
    }
}

#[async_trait]
impl InventoryStore for SeaOrmCatalog {
    async fn available(
        &self,
        txn: &DatabaseTransaction,
        target: StockTarget,
    ) -> Result<i32, ServiceError> {
        let quantity = match target {
            StockTarget::Product(id) => product::Entity::find_by_id(id)
                .one(txn)
                .await?
                .map(|p| p.stock_quantity),
            StockTarget::Variation(id) => product_variation::Entity::find_by_id(id)
                .one(txn)
                .await?
                .map(|v| v.stock_quantity),
        };
        Ok(quantity.unwrap_or(0))
    }

    async fn decrement(
        &self,
        txn: &DatabaseTransaction,
        target: StockTarget,
        quantity: i32,
    ) -> Result<bool, ServiceError> {
        let result = match target {
            StockTarget::Product(id) => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::StockQuantity,
                        Expr::col(product::Column::StockQuantity).sub(quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(id))
                    .filter(product::Column::StockQuantity.gte(quantity))
                    .exec(txn)
                    .await?
            }
            StockTarget::Variation(id) => {
                product_variation::Entity::update_many()
                    .col_expr(
                        product_variation::Column::StockQuantity,
                        Expr::col(product_variation::Column::StockQuantity).sub(quantity),
                    )
                    .filter(product_variation::Column::Id.eq(id))
                    .filter(product_variation::Column::StockQuantity.gte(quantity))
                    .exec(txn)
                    .await?
            }
        };

        debug!(?target, quantity, rows = result.rows_affected, "stock decrement");
        Ok(result.rows_affected == 1)
    }

    async fn restock(
        &self,
        txn: &DatabaseTransaction,
        target: StockTarget,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        let result = match target {
            StockTarget::Product(id) => {
                product::Entity::update_many()
                    .col_expr(
                        product::Column::StockQuantity,
                        Expr::col(product::Column::StockQuantity).add(quantity),
                    )
                    .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
                    .filter(product::Column::Id.eq(id))
                    .exec(txn)
                    .await?
            }
            StockTarget::Variation(id) => {
                product_variation::Entity::update_many()
                    .col_expr(
                        product_variation::Column::StockQuantity,
                        Expr::col(product_variation::Column::StockQuantity).add(quantity),
                    )
                    .filter(product_variation::Column::Id.eq(id))
                    .exec(txn)
                    .await?
            }
        };

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Stock row {:?} no longer exists",
                target
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variation_stock_takes_precedence() {
        let product_id = Uuid::new_v4();
        let variation_id = Uuid::new_v4();
        assert_eq!(
            StockTarget::for_line(product_id, Some(variation_id)),
            StockTarget::Variation(variation_id)
        );
        assert_eq!(
            StockTarget::for_line(product_id, None),
            StockTarget::Product(product_id)
        );
    }
}
