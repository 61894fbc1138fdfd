//! Order state machine: legal edges, history, and the restock that only a
//! cancellation from `pending` performs.

mod common;

use assert_matches::assert_matches;
use common::{line, Storefront, TestApp};
use payjaro_api::{
    entities::{
        earning::{self, EarningStatus},
        order::{OrderStatus, PaymentStatus},
        order_status_history,
    },
    errors::ServiceError,
    services::visibility::Viewer,
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use test_case::test_case;
use uuid::Uuid;

async fn pending_order(app: &TestApp, store: &Storefront, quantity: i32) -> Uuid {
    app.create_order(
        Uuid::new_v4(),
        store.slug(),
        vec![line(store.product.id, quantity, dec!(150.00))],
    )
    .await
    .expect("order created")
    .order
    .id
}

async fn walk(app: &TestApp, order_id: Uuid, path: &[&str]) {
    for status in path {
        app.state
            .services
            .order_status
            .transition_status(order_id, status, None, None, None)
            .await
            .unwrap_or_else(|e| panic!("transition to {status} failed: {e}"));
    }
}

async fn earning_statuses(app: &TestApp, order_id: Uuid) -> Vec<EarningStatus> {
    earning::Entity::find()
        .filter(earning::Column::OrderId.eq(order_id))
        .all(app.db())
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.status)
        .collect()
}

#[tokio::test]
async fn cancelling_a_pending_order_restocks_and_cancels_earnings() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "cancel-pending", 10).await;
    let order_id = pending_order(&app, &store, 3).await;
    assert_eq!(app.product_stock(store.product.id).await, 7);

    let actor = Uuid::new_v4();
    let order = app
        .state
        .services
        .order_status
        .cancel_order(order_id, Some(actor), Some("changed my mind".to_string()))
        .await
        .expect("cancelled");

    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(app.product_stock(store.product.id).await, 10);
    assert_eq!(
        earning_statuses(&app, order_id).await,
        vec![EarningStatus::Cancelled, EarningStatus::Cancelled]
    );

    let history = order_status_history::Entity::find()
        .filter(order_status_history::Column::OrderId.eq(order_id))
        .filter(order_status_history::Column::Status.eq(OrderStatus::Cancelled))
        .one(app.db())
        .await
        .unwrap()
        .expect("history row");
    assert_eq!(history.created_by, Some(actor));
    assert_eq!(history.notes.as_deref(), Some("changed my mind"));
}

#[tokio::test]
async fn cancelling_a_restocked_variation_returns_units_to_the_variation() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "cancel-variant", 10).await;
    let variation = app.seed_variation(store.product.id, dec!(10.00), 5).await;

    let mut cart_line = line(store.product.id, 4, dec!(150.00));
    cart_line.variation_id = Some(variation.id);
    let order_id = app
        .create_order(Uuid::new_v4(), store.slug(), vec![cart_line])
        .await
        .unwrap()
        .order
        .id;
    assert_eq!(app.variation_stock(variation.id).await, 1);

    walk(&app, order_id, &["cancelled"]).await;

    assert_eq!(app.variation_stock(variation.id).await, 5);
    assert_eq!(app.product_stock(store.product.id).await, 10);
}

#[tokio::test]
async fn cancelling_after_payment_leaves_stock_and_earnings_alone() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "cancel-late", 10).await;
    let order_id = pending_order(&app, &store, 2).await;

    walk(&app, order_id, &["paid", "processing", "cancelled"]).await;

    assert_eq!(app.product_stock(store.product.id).await, 8);
    assert_eq!(
        earning_statuses(&app, order_id).await,
        vec![EarningStatus::Pending, EarningStatus::Pending]
    );
}

#[tokio::test]
async fn full_lifecycle_records_every_step_and_tracking() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "happy-path", 10).await;
    let customer = Uuid::new_v4();
    let order_id = app
        .create_order(customer, store.slug(), vec![line(store.product.id, 1, dec!(150.00))])
        .await
        .unwrap()
        .order
        .id;

    walk(&app, order_id, &["paid", "processing"]).await;
    let shipped = app
        .state
        .services
        .order_status
        .transition_status(order_id, "shipped", None, None, Some("GIG-123456".to_string()))
        .await
        .unwrap();
    assert_eq!(shipped.tracking_number.as_deref(), Some("GIG-123456"));
    assert!(shipped.version > 1);
    walk(&app, order_id, &["delivered", "returned"]).await;

    let detail = app
        .state
        .services
        .orders
        .get_order(&Viewer::Customer { user_id: customer }, order_id)
        .await
        .unwrap();
    assert_eq!(detail.order.status, OrderStatus::Returned);
    let statuses: Vec<OrderStatus> = detail.history.iter().map(|h| h.status).collect();
    assert_eq!(
        statuses,
        vec![
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Returned,
        ]
    );
}

#[test_case(&["paid", "processing", "shipped", "delivered"], "shipped" ; "delivered back to shipped")]
#[test_case(&["paid", "processing", "shipped"], "cancelled" ; "cancel after shipping")]
#[test_case(&[], "shipped" ; "pending straight to shipped")]
#[test_case(&["cancelled"], "paid" ; "cancelled is terminal")]
#[test_case(&["paid"], "pending" ; "no way back to pending")]
#[tokio::test]
async fn illegal_edges_are_rejected(path: &[&str], target: &str) {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "illegal", 10).await;
    let order_id = pending_order(&app, &store, 1).await;
    walk(&app, order_id, path).await;
    let stock_before = app.product_stock(store.product.id).await;

    let err = app
        .state
        .services
        .order_status
        .transition_status(order_id, target, None, None, None)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::InvalidTransition { to, .. } => assert_eq!(to, target));
    assert_eq!(app.product_stock(store.product.id).await, stock_before);
}

#[tokio::test]
async fn unknown_status_and_missing_order_are_distinguished() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "unknown", 10).await;
    let order_id = pending_order(&app, &store, 1).await;

    let err = app
        .state
        .services
        .order_status
        .transition_status(order_id, "teleported", None, None, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidStatus(_));

    let err = app
        .state
        .services
        .order_status
        .transition_status(Uuid::new_v4(), "paid", None, None, None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
