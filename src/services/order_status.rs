use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    DatabaseConnection, DatabaseTransaction, EntityTrait, QueryFilter, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::CommerceConfig,
    db::retry_on_conflict,
    entities::{
        earning::{self, EarningStatus},
        order::{self, OrderStatus},
        order_item, order_status_history,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::catalog::{InventoryStore, SeaOrmCatalog, StockTarget},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct TransitionRequest {
    /// Target status, e.g. `processing`
    #[validate(length(min = 1, max = 20))]
    pub status: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub tracking_number: Option<String>,
}

/// Result of a committed transition.
#[derive(Debug, Clone)]
struct Transitioned {
    order: order::Model,
    from: OrderStatus,
    restocked: bool,
}

/// Writes `target` onto the order as read in `current`. The table is not
/// consulted here; a write by anyone since the read makes this a `Conflict`.
pub async fn write_status<C: ConnectionTrait>(
    conn: &C,
    current: &order::Model,
    target: OrderStatus,
    tracking_number: Option<&str>,
) -> Result<(), ServiceError> {
    let mut update = order::Entity::update_many()
        .col_expr(order::Column::Status, Expr::value(target.as_ref()))
        .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
        .col_expr(order::Column::Version, Expr::value(current.version + 1));
    if let Some(tracking) = tracking_number {
        update = update.col_expr(order::Column::TrackingNumber, Expr::value(tracking.to_string()));
    }

    let result = update
        .filter(order::Column::Id.eq(current.id))
        .filter(order::Column::Version.eq(current.version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::Conflict(format!(
            "Order {} was modified concurrently",
            current.id
        )));
    }
    Ok(())
}

/// Drives orders through the lifecycle table on [`OrderStatus`].
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    inventory: Arc<dyn InventoryStore>,
    event_sender: EventSender,
    max_attempts: u32,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: EventSender,
        commerce: &CommerceConfig,
    ) -> Self {
        Self::with_inventory(db, Arc::new(SeaOrmCatalog), event_sender, commerce)
    }

    pub fn with_inventory(
        db: Arc<DatabaseConnection>,
        inventory: Arc<dyn InventoryStore>,
        event_sender: EventSender,
        commerce: &CommerceConfig,
    ) -> Self {
        Self {
            db,
            inventory,
            event_sender,
            max_attempts: commerce.max_conflict_retries,
        }
    }

    /// Moves an order to `new_status`, appending a history row.
    ///
    /// Cancelling a `pending` order also returns its stock and cancels its
    /// pending earnings. Cancelling later in the lifecycle changes only the
    /// status.
    #[instrument(skip(self, notes), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn transition_status(
        &self,
        order_id: Uuid,
        new_status: &str,
        actor_id: Option<Uuid>,
        notes: Option<String>,
        tracking_number: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let target = OrderStatus::from_str(new_status.trim())
            .map_err(|_| ServiceError::InvalidStatus(new_status.to_string()))?;

        let done = retry_on_conflict("transition_order", self.max_attempts, |_| {
            self.transition_once(
                order_id,
                target,
                actor_id,
                notes.clone(),
                tracking_number.clone(),
            )
        })
        .await?;

        counter!("payjaro.orders.transitions", 1, "to" => target.as_ref().to_string());
        info!(
            from = done.from.as_ref(),
            to = target.as_ref(),
            restocked = done.restocked,
            "Order status updated"
        );

        self.event_sender
            .send_or_log(Event::OrderStatusChanged {
                order_id,
                old_status: done.from.as_ref().to_string(),
                new_status: target.as_ref().to_string(),
            })
            .await;
        if target == OrderStatus::Cancelled {
            self.event_sender
                .send_or_log(Event::OrderCancelled {
                    order_id,
                    restocked: done.restocked,
                })
                .await;
        }

        Ok(done.order)
    }

    /// Convenience wrapper for `cancelled`.
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor_id: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        self.transition_status(order_id, OrderStatus::Cancelled.as_ref(), actor_id, reason, None)
            .await
    }

    async fn transition_once(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor_id: Option<Uuid>,
        notes: Option<String>,
        tracking_number: Option<String>,
    ) -> Result<Transitioned, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for status transition");
            ServiceError::DatabaseError(e)
        })?;

        let current = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let from = current.status;
        if !from.can_transition_to(target) {
            warn!(from = from.as_ref(), to = target.as_ref(), "Rejected status transition");
            return Err(ServiceError::InvalidTransition {
                from: from.as_ref().to_string(),
                to: target.as_ref().to_string(),
            });
        }

        let now = Utc::now();
        write_status(&txn, &current, target, tracking_number.as_deref()).await?;

        order_status_history::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            status: Set(target),
            notes: Set(notes),
            created_by: Set(actor_id),
            created_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let restocked = from == OrderStatus::Pending && target == OrderStatus::Cancelled;
        if restocked {
            self.release_reservation(&txn, order_id).await?;
        }

        let order = order::Entity::find_by_id(order_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit status transition");
            ServiceError::DatabaseError(e)
        })?;

        Ok(Transitioned {
            order,
            from,
            restocked,
        })
    }

    /// Returns every line's units to stock and cancels the pending earnings.
    async fn release_reservation(
        &self,
        txn: &DatabaseTransaction,
        order_id: Uuid,
    ) -> Result<(), ServiceError> {
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(txn)
            .await?;

        let mut targets: Vec<(StockTarget, i32)> = items
            .iter()
            .map(|item| (StockTarget::for_line(item.product_id, item.variation_id), item.quantity))
            .collect();
        targets.sort_by_key(|(target, _)| *target);

        for (target, quantity) in targets {
            self.inventory.restock(txn, target, quantity).await?;
        }

        let cancelled = earning::Entity::update_many()
            .col_expr(earning::Column::Status, Expr::value(EarningStatus::Cancelled.as_ref()))
            .filter(earning::Column::OrderId.eq(order_id))
            .filter(earning::Column::Status.eq(EarningStatus::Pending))
            .exec(txn)
            .await?;

        info!(
            order_id = %order_id,
            lines = items.len(),
            earnings_cancelled = cancelled.rows_affected,
            "Released reservation for cancelled order"
        );
        Ok(())
    }
}
