//! HTTP surface: caller identity, status codes and error bodies.

mod common;

use axum::http::{Method, StatusCode};
use common::{address, Storefront, TestApp};
use serde_json::json;
use uuid::Uuid;

fn cart_body(slug: &str, product_id: Uuid, unit_price: &str) -> serde_json::Value {
    json!({
        "entrepreneur_slug": slug,
        "items": [{ "product_id": product_id, "quantity": 2, "unit_price": unit_price }],
        "shipping_address": address(),
    })
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let app = TestApp::new().await;

    let (status, body) = app.request(Method::GET, "/api/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    let (status, _) = app
        .request(Method::GET, "/api/v1/orders", Some((Uuid::new_v4(), "wizard")), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn customer_checkout_over_http() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "http-shop", 10).await;
    let customer = Uuid::new_v4();

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some((customer, "customer")),
            Some(cart_body(store.slug(), store.product.id, "150.00")),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["order"]["status"], "pending");
    let order_id = body["data"]["order"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .request(Method::GET, &format!("/api/v1/orders/{order_id}"), Some((customer, "customer")), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    // Other customers cannot tell the order exists.
    let (status, _) = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some((Uuid::new_v4(), "customer")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The storefront owner sees it in their list.
    let (status, body) = app
        .request(
            Method::GET,
            "/api/v1/orders?per_page=500",
            Some((store.entrepreneur.user_id, "entrepreneur")),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["per_page"], 100);
}

#[tokio::test]
async fn rejected_cart_returns_every_violation() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "http-reject", 1).await;

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some((Uuid::new_v4(), "customer")),
            Some(cart_body(store.slug(), store.product.id, "90.00")),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let violations = body["violations"].as_array().expect("violations listed");
    let kinds: Vec<&str> = violations
        .iter()
        .map(|v| v["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds.len(), 2);
    assert!(kinds.contains(&"insufficient_inventory"));
    assert!(kinds.contains(&"invalid_pricing"));
    assert!(violations.iter().all(|v| v["line"] == 0));
    assert_eq!(app.product_stock(store.product.id).await, 1);
}

#[tokio::test]
async fn customers_may_cancel_but_not_fulfil() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "http-cancel", 10).await;
    let customer = Uuid::new_v4();
    let (_, body) = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some((customer, "customer")),
            Some(cart_body(store.slug(), store.product.id, "150.00")),
        )
        .await;
    let uri = format!("/api/v1/orders/{}/status", body["data"]["order"]["id"].as_str().unwrap());

    let (status, _) = app
        .request(Method::POST, &uri, Some((customer, "customer")), Some(json!({ "status": "shipped" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request(
            Method::POST,
            &uri,
            Some((Uuid::new_v4(), "customer")),
            Some(json!({ "status": "cancelled" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app
        .request(
            Method::POST,
            &uri,
            Some((customer, "customer")),
            Some(json!({ "status": "cancelled", "notes": "ordered twice" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    assert_eq!(body["message"], "Order status updated to cancelled");
    assert_eq!(app.product_stock(store.product.id).await, 10);

    let (status, body) = app
        .request(Method::POST, &uri, Some((Uuid::new_v4(), "staff")), Some(json!({ "status": "paid" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("cancelled"));
}

#[tokio::test]
async fn wallet_endpoints_are_for_entrepreneurs() {
    let app = TestApp::new().await;
    let store = Storefront::seed(&app, "http-wallet", 10).await;

    let (status, _) = app
        .request(Method::GET, "/api/v1/withdrawals", Some((Uuid::new_v4(), "customer")), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let owner = Some((store.entrepreneur.user_id, "entrepreneur"));
    let (status, body) = app.request(Method::GET, "/api/v1/wallet", owner, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currency"], "NGN");

    let (status, body) = app
        .request(Method::GET, "/api/v1/wallet/reconciliation", owner, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["balanced"], true);

    let (status, body) = app
        .request(
            Method::POST,
            "/api/v1/withdrawals",
            owner,
            Some(json!({
                "amount": "1500.00",
                "withdrawal_method": "bank",
                "destination_details": {
                    "account_number": "0123456789",
                    "bank_code": "058",
                    "account_name": "Ada Obi",
                },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("Insufficient balance"));
}

#[tokio::test]
async fn liveness_and_api_document_are_served() {
    let app = TestApp::new().await;

    let (status, _) = app.request(Method::GET, "/health/live", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app.request(Method::GET, "/api-docs/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/api/v1/orders"].is_object());
}
