mod common;

use assert_matches::assert_matches;
use common::{line, Storefront, TestApp};
use payjaro_api::{
    entities::{
        earning::{self, EarningStatus, EarningType},
        order::{self, OrderStatus, PaymentStatus},
    },
    errors::{CartViolation, ServiceError},
};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

#[tokio::test]
async fn checkout_prices_reserves_and_records_pending_earnings() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "ada-styles", 10).await;
    let customer = Uuid::new_v4();

    let detail = app
        .create_order(customer, store.slug(), vec![line(store.product.id, 2, dec!(150.00))])
        .await
        .expect("order created");

    let order = &detail.order;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert_eq!(order.subtotal, dec!(200.00));
    assert_eq!(order.markup_amount, dec!(100.00));
    assert_eq!(order.commission_amount, dec!(24.00));
    assert_eq!(order.shipping_fee, dec!(500.00));
    assert_eq!(order.total_amount, dec!(800.00));
    assert_eq!(order.supplier_id, store.supplier_id);
    assert_eq!(order.entrepreneur_id, store.entrepreneur.id);
    assert!(order.order_number.starts_with("PAY"));

    assert_eq!(detail.items.len(), 1);
    assert_eq!(detail.items[0].base_price, dec!(100.00));
    assert_eq!(detail.items[0].total_price, dec!(300.00));
    assert_eq!(detail.history.len(), 1);
    assert_eq!(detail.history[0].created_by, Some(customer));

    assert_eq!(app.product_stock(store.product.id).await, 8);

    let earnings = earning::Entity::find()
        .filter(earning::Column::OrderId.eq(order.id))
        .all(app.db())
        .await
        .unwrap();
    assert_eq!(earnings.len(), 2);
    assert!(earnings.iter().all(|e| e.status == EarningStatus::Pending));
    let markup = earnings
        .iter()
        .find(|e| e.earning_type == EarningType::Markup)
        .unwrap();
    let commission = earnings
        .iter()
        .find(|e| e.earning_type == EarningType::Commission)
        .unwrap();
    assert_eq!(markup.amount, dec!(100.00));
    assert_eq!(commission.amount, dec!(24.00));
}

#[tokio::test]
async fn rejected_cart_leaves_no_trace() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "rollback", 10).await;
    let scarce = app.seed_product(store.supplier_id, dec!(50.00), 1).await;

    let err = app
        .create_order(
            Uuid::new_v4(),
            store.slug(),
            vec![
                line(store.product.id, 2, dec!(150.00)),
                line(scarce.id, 5, dec!(60.00)),
            ],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::CartRejected(violations) => {
        assert_eq!(violations.len(), 1);
        assert_matches!(
            violations[0],
            CartViolation::InsufficientInventory { line: 1, available: 1, requested: 5, .. }
        );
    });

    assert_eq!(app.product_stock(store.product.id).await, 10);
    assert_eq!(app.product_stock(scarce.id).await, 1);
    assert_eq!(order::Entity::find().count(app.db()).await.unwrap(), 0);
    assert_eq!(earning::Entity::find().count(app.db()).await.unwrap(), 0);
}

#[tokio::test]
async fn price_below_supplier_cost_is_rejected() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "underpriced", 10).await;

    let err = app
        .create_order(
            Uuid::new_v4(),
            store.slug(),
            vec![line(store.product.id, 1, dec!(99.99))],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::CartRejected(violations) => {
        assert_eq!(
            violations,
            vec![CartViolation::InvalidPricing {
                line: 0,
                product_id: store.product.id,
                base_price: dec!(100.00),
                unit_price: dec!(99.99),
            }]
        );
    });
    assert_eq!(app.product_stock(store.product.id).await, 10);
}

#[tokio::test]
async fn selling_at_cost_earns_commission_only() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "at-cost", 10).await;

    let detail = app
        .create_order(
            Uuid::new_v4(),
            store.slug(),
            vec![line(store.product.id, 1, dec!(100.00))],
        )
        .await
        .expect("price equal to cost is allowed");

    assert_eq!(detail.order.markup_amount, dec!(0));
    assert_eq!(detail.order.commission_amount, dec!(8.00));
    assert_eq!(detail.order.total_amount, dec!(600.00));
}

#[tokio::test]
async fn cart_from_two_suppliers_is_rejected() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "mixed", 10).await;
    let other_supplier = Uuid::new_v4();
    let foreign = app.seed_product(other_supplier, dec!(40.00), 10).await;

    let err = app
        .create_order(
            Uuid::new_v4(),
            store.slug(),
            vec![
                line(store.product.id, 1, dec!(120.00)),
                line(foreign.id, 1, dec!(50.00)),
            ],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::CartRejected(violations) => {
        assert_eq!(
            violations,
            vec![CartViolation::SupplierMismatch {
                line: 1,
                product_id: foreign.id,
                expected_supplier_id: store.supplier_id,
                supplier_id: other_supplier,
            }]
        );
    });
}

#[tokio::test]
async fn every_violation_is_reported_in_line_order() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "many-faults", 2).await;

    let err = app
        .create_order(
            Uuid::new_v4(),
            store.slug(),
            vec![
                line(store.product.id, 1, dec!(80.00)),
                line(store.product.id, 5, dec!(150.00)),
            ],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::CartRejected(violations) => {
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].line(), 0);
        assert_eq!(violations[1].line(), 1);
        assert_matches!(violations[0], CartViolation::InvalidPricing { .. });
        assert_matches!(
            violations[1],
            CartViolation::InsufficientInventory { available: 1, requested: 5, .. }
        );
    });
}

#[tokio::test]
async fn repeated_product_lines_share_the_same_stock() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "repeat", 5).await;

    let err = app
        .create_order(
            Uuid::new_v4(),
            store.slug(),
            vec![
                line(store.product.id, 3, dec!(150.00)),
                line(store.product.id, 3, dec!(150.00)),
            ],
        )
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::CartRejected(violations) => {
        assert_matches!(
            violations.as_slice(),
            [CartViolation::InsufficientInventory { line: 1, available: 2, requested: 3, .. }]
        );
    });
    assert_eq!(app.product_stock(store.product.id).await, 5);
}

#[tokio::test]
async fn variation_lines_use_modified_price_and_variation_stock() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "variants", 10).await;
    let xl = app.seed_variation(store.product.id, dec!(20.00), 4).await;

    let mut cart_line = line(store.product.id, 2, dec!(150.00));
    cart_line.variation_id = Some(xl.id);
    let detail = app
        .create_order(Uuid::new_v4(), store.slug(), vec![cart_line])
        .await
        .expect("order created");

    assert_eq!(detail.items[0].base_price, dec!(120.00));
    assert_eq!(detail.order.markup_amount, dec!(60.00));
    assert_eq!(app.variation_stock(xl.id).await, 2);
    assert_eq!(app.product_stock(store.product.id).await, 10);

    let mut too_cheap = line(store.product.id, 1, dec!(110.00));
    too_cheap.variation_id = Some(xl.id);
    let err = app
        .create_order(Uuid::new_v4(), store.slug(), vec![too_cheap])
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::CartRejected(violations) => {
        assert_matches!(
            violations.as_slice(),
            [CartViolation::InvalidPricing { base_price, .. }] if *base_price == dec!(120.00)
        );
    });
}

#[tokio::test]
async fn unknown_storefront_and_bad_address_fail_before_touching_stock() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "real-shop", 10).await;

    let err = app
        .create_order(
            Uuid::new_v4(),
            "no-such-shop",
            vec![line(store.product.id, 1, dec!(150.00))],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let mut request = common::order_request(store.slug(), vec![line(store.product.id, 1, dec!(150.00))]);
    request.shipping_address = serde_json::json!({ "full_name": "Ada Obi", "city": "Lagos" });
    let err = app
        .state
        .services
        .orders
        .create_order(Uuid::new_v4(), request)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(message) => {
        assert!(message.contains("phone"));
    });

    let err = app
        .create_order(
            Uuid::new_v4(),
            store.slug(),
            vec![line(store.product.id, 0, dec!(150.00))],
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    assert_eq!(app.product_stock(store.product.id).await, 10);
}

#[tokio::test]
async fn concurrent_checkouts_never_oversell() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "flash-sale", 3).await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let orders = app.state.services.orders.clone();
        let request = common::order_request(store.slug(), vec![line(store.product.id, 1, dec!(150.00))]);
        handles.push(tokio::spawn(async move {
            orders.create_order(Uuid::new_v4(), request).await
        }));
    }

    let mut created = 0;
    let mut rejected = 0;
    for result in futures::future::join_all(handles).await {
        match result.expect("task completes") {
            Ok(_) => created += 1,
            Err(ServiceError::CartRejected(_)) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, 3);
    assert_eq!(rejected, 3);
    assert_eq!(app.product_stock(store.product.id).await, 0);
    assert_eq!(order::Entity::find().count(app.db()).await.unwrap(), 3);
}
