#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use payjaro_api::{
    config::AppConfig,
    db,
    entities::{entrepreneur, order, product, product_variation, wallet},
    errors::ServiceError,
    events::{self, EventSender},
    handlers::{AppServices, USER_ID_HEADER, USER_ROLE_HEADER},
    services::{
        orders::{CartLine, CreateOrderRequest, OrderDetail},
        payment_provider::{
            payment_reference, sign_payload, PaymentProviderClient, PaymentSession,
            ProviderRegistry, PAYSTACK_SIGNATURE_HEADER,
        },
        payments::{InitiatePaymentRequest, WebhookOutcome},
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "sk_test_payjaro_webhook_secret";

/// Header the second registered provider signs in.
pub const FLUTTERWAVE_SIGNATURE_HEADER: &str = "verif-hash";

/// Provider double: hands out real-looking references and checks
/// signatures with the shared test secret.
pub struct StubProvider {
    name: &'static str,
    secret: String,
}

impl StubProvider {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            secret: WEBHOOK_SECRET.to_string(),
        }
    }
}

#[async_trait]
impl PaymentProviderClient for StubProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn signature_header(&self) -> &'static str {
        match self.name {
            "paystack" => PAYSTACK_SIGNATURE_HEADER,
            _ => FLUTTERWAVE_SIGNATURE_HEADER,
        }
    }

    async fn initialize_payment(
        &self,
        order: &order::Model,
        _email: &str,
        _callback_url: &str,
    ) -> Result<PaymentSession, ServiceError> {
        let reference = payment_reference(&order.order_number);
        Ok(PaymentSession {
            authorization_url: format!("https://checkout.{}.test/{}", self.name, reference),
            access_code: Some("stub_access".to_string()),
            reference,
        })
    }

    fn verify_signature(&self, payload: &[u8], signature: &str) -> bool {
        sign_payload(&self.secret, payload) == signature
    }
}

/// Application state backed by a private in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // One connection keeps every query on the same in-memory database, so
        // spawned tasks take turns. Losing a race is covered by the
        // stale-snapshot tests in concurrency_test.rs.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.paystack.secret_key = WEBHOOK_SECRET.to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("in-memory database");
        db::run_migrations(&pool).await.expect("migrations apply");
        let db = Arc::new(pool);

        let (event_sender, event_rx) = EventSender::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let providers = ProviderRegistry::new(Arc::new(StubProvider::new("paystack")))
            .register(Arc::new(StubProvider::new("flutterwave")));
        let services = AppServices::new(db.clone(), event_sender.clone(), &cfg, providers);

        let state = AppState {
            db,
            config: cfg,
            event_sender,
            services,
        };
        let router = payjaro_api::build_router(state.clone(), CorsLayer::permissive());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &sea_orm::DatabaseConnection {
        &self.state.db
    }

    /// Sends a JSON request as the given caller and returns status and body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        caller: Option<(Uuid, &str)>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, role)) = caller {
            builder = builder
                .header(USER_ID_HEADER, user_id.to_string())
                .header(USER_ROLE_HEADER, role);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };
        self.send(request).await
    }

    /// Posts a raw Paystack webhook body with the given signature.
    pub async fn post_webhook(&self, payload: &[u8], signature: &str) -> (StatusCode, Value) {
        self.post_provider_webhook("paystack", PAYSTACK_SIGNATURE_HEADER, payload, signature)
            .await
    }

    pub async fn post_provider_webhook(
        &self,
        provider: &str,
        header: &str,
        payload: &[u8],
        signature: &str,
    ) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/v1/payments/webhooks/{provider}"))
            .header("content-type", "application/json")
            .header(header, signature)
            .body(Body::from(payload.to_vec()))
            .expect("request");
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    pub async fn seed_entrepreneur(&self, slug: &str, commission_rate: Decimal) -> entrepreneur::Model {
        let now = Utc::now();
        entrepreneur::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(Uuid::new_v4()),
            business_name: Set(format!("{} store", slug)),
            slug: Set(slug.to_string()),
            commission_rate: Set(commission_rate),
            total_sales: Set(Decimal::ZERO),
            total_earnings: Set(Decimal::ZERO),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("entrepreneur")
    }

    pub async fn seed_product(&self, supplier_id: Uuid, base_price: Decimal, stock: i32) -> product::Model {
        let now = Utc::now();
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            supplier_id: Set(supplier_id),
            name: Set("Ankara Tote".to_string()),
            sku: Set(format!("SKU-{}", &id.simple().to_string()[..8])),
            base_price: Set(base_price),
            stock_quantity: Set(stock),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db())
        .await
        .expect("product")
    }

    pub async fn seed_variation(
        &self,
        product_id: Uuid,
        price_modifier: Decimal,
        stock: i32,
    ) -> product_variation::Model {
        product_variation::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            variation_type: Set("size".to_string()),
            variation_value: Set("XL".to_string()),
            price_modifier: Set(price_modifier),
            stock_quantity: Set(stock),
        }
        .insert(self.db())
        .await
        .expect("variation")
    }

    pub async fn product_stock(&self, id: Uuid) -> i32 {
        product::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("query")
            .expect("product exists")
            .stock_quantity
    }

    pub async fn variation_stock(&self, id: Uuid) -> i32 {
        product_variation::Entity::find_by_id(id)
            .one(self.db())
            .await
            .expect("query")
            .expect("variation exists")
            .stock_quantity
    }

    pub async fn wallet_of(&self, user_id: Uuid) -> Option<wallet::Model> {
        wallet::Entity::find()
            .filter(wallet::Column::UserId.eq(user_id))
            .one(self.db())
            .await
            .expect("query")
    }

    pub async fn create_order(
        &self,
        customer_id: Uuid,
        slug: &str,
        items: Vec<CartLine>,
    ) -> Result<OrderDetail, ServiceError> {
        self.state
            .services
            .orders
            .create_order(customer_id, order_request(slug, items))
            .await
    }

    /// Opens a payment session with the default provider and returns its reference.
    pub async fn initiate_payment(&self, customer_id: Uuid, order_id: Uuid) -> String {
        self.state
            .services
            .payments
            .initiate_payment(customer_id, payment_request(order_id, None))
            .await
            .expect("payment initiated")
            .reference
    }

    /// Delivers a correctly signed Paystack webhook straight to the payment service.
    pub async fn deliver(&self, payload: &[u8]) -> Result<WebhookOutcome, ServiceError> {
        self.deliver_via("paystack", payload).await
    }

    pub async fn deliver_via(
        &self,
        provider: &str,
        payload: &[u8],
    ) -> Result<WebhookOutcome, ServiceError> {
        self.state
            .services
            .payments
            .handle_webhook(provider, payload, &sign(payload))
            .await
    }
}

/// A storefront with one product: base price 100.00 at 8% commission.
pub struct Storefront {
    pub entrepreneur: entrepreneur::Model,
    pub supplier_id: Uuid,
    pub product: product::Model,
}

impl Storefront {
    pub async fn seed(app: &TestApp, slug: &str, stock: i32) -> Self {
        let entrepreneur = app.seed_entrepreneur(slug, dec!(8.00)).await;
        let supplier_id = Uuid::new_v4();
        let product = app.seed_product(supplier_id, dec!(100.00), stock).await;
        Self {
            entrepreneur,
            supplier_id,
            product,
        }
    }

    pub fn slug(&self) -> &str {
        &self.entrepreneur.slug
    }
}

pub fn line(product_id: Uuid, quantity: i32, unit_price: Decimal) -> CartLine {
    CartLine {
        product_id,
        variation_id: None,
        quantity,
        unit_price,
    }
}

pub fn address() -> Value {
    json!({
        "full_name": "Ada Obi",
        "phone": "+2348012345678",
        "address": "12 Marina Road",
        "city": "Lagos",
        "state": "Lagos",
    })
}

pub fn order_request(slug: &str, items: Vec<CartLine>) -> CreateOrderRequest {
    CreateOrderRequest {
        entrepreneur_slug: slug.to_string(),
        items,
        shipping_address: address(),
        notes: None,
    }
}

pub fn payment_request(order_id: Uuid, provider: Option<&str>) -> InitiatePaymentRequest {
    InitiatePaymentRequest {
        order_id,
        email: "ada@example.com".to_string(),
        callback_url: "https://shop.example.com/paid".to_string(),
        provider: provider.map(str::to_string),
    }
}

pub fn sign(payload: &[u8]) -> String {
    sign_payload(WEBHOOK_SECRET, payload)
}

/// Webhook body in the provider's envelope; `amount` is in kobo.
pub fn webhook_body(event: &str, reference: &str, amount: i64) -> Vec<u8> {
    let (status, gateway_response) = if event == "charge.success" {
        ("success", "Approved")
    } else {
        ("failed", "Declined")
    };
    json!({
        "event": event,
        "data": {
            "reference": reference,
            "status": status,
            "amount": amount,
            "gateway_response": gateway_response,
            "paid_at": "2024-06-01T10:00:00Z",
        }
    })
    .to_string()
    .into_bytes()
}
