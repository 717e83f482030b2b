#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use hamper_server::auth::TokenService;
use hamper_server::inventory::MemoryLedger;
use hamper_server::payment::{GatewayRegistry, RazorpayGateway};
use hamper_server::state::Backends;
use hamper_server::store::{MemoryStore, OrderStore, StoreError, StoreResult};
use hamper_server::util::hash_password;
use hamper_server::{AppState, Config};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use shared::models::{
    Admin, CartItem, ConfirmPaymentRequest, Order, PaymentStatus, Permission, PlaceOrderRequest,
    PlaceOrderResponse, Product, Role, ShippingDetails, User,
};

pub const RZP_KEY_ID: &str = "rzp_test_mock";
pub const RZP_SECRET: &str = "rzp-mock-secret";
pub const STRIPE_SECRET: &str = "sk_test_mock";
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_mock";
pub const PASSWORD: &str = "hamper-pass";

/// Counters and failure switches shared with the mock gateway
#[derive(Default)]
pub struct GatewayCalls {
    pub razorpay_orders: AtomicUsize,
    pub razorpay_refunds: AtomicUsize,
    pub stripe_intents: AtomicUsize,
    pub stripe_lookups: AtomicUsize,
    pub stripe_refunds: AtomicUsize,
    pub stripe_cancels: AtomicUsize,
    pub razorpay_order_lookups: AtomicUsize,
    pub refund_lookups: AtomicUsize,
    /// Next N intent creations answer 503
    pub fail_intents: AtomicUsize,
    /// Next N Razorpay orders are created but answered with 503
    pub drop_intent_responses: AtomicUsize,
    /// Refunds answer 400 while set
    pub reject_refunds: AtomicBool,
    /// Stripe intents report this status instead of `succeeded`
    pub stripe_status: Mutex<Option<String>>,
    razorpay_created: Mutex<Vec<Value>>,
    refunds: Mutex<Vec<Value>>,
}

fn take(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl GatewayCalls {
    fn take_failure(&self) -> bool {
        take(&self.fail_intents)
    }

    fn matching_refunds(&self, field: &str, value: &str) -> Vec<Value> {
        self.refunds
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r[field].as_str() == Some(value))
            .cloned()
            .collect()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

type Reply = (StatusCode, Json<Value>);

fn unavailable() -> Reply {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": {"description": "maintenance", "message": "maintenance"}})),
    )
}

async fn razorpay_order(State(calls): State<Arc<GatewayCalls>>, Json(body): Json<Value>) -> Reply {
    calls.razorpay_orders.fetch_add(1, Ordering::SeqCst);
    if calls.take_failure() {
        return unavailable();
    }
    let receipt = body["receipt"].as_str().unwrap_or_default();
    let order = json!({
        "id": format!("order_{receipt}"),
        "amount": body["amount"],
        "currency": body["currency"],
        "receipt": receipt,
        "status": "created"
    });
    calls.razorpay_created.lock().unwrap().push(order.clone());
    if take(&calls.drop_intent_responses) {
        return unavailable();
    }
    (StatusCode::OK, Json(order))
}

async fn razorpay_orders_by_receipt(
    State(calls): State<Arc<GatewayCalls>>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    calls.razorpay_order_lookups.fetch_add(1, Ordering::SeqCst);
    let receipt = query.get("receipt").cloned().unwrap_or_default();
    let items: Vec<Value> = calls
        .razorpay_created
        .lock()
        .unwrap()
        .iter()
        .filter(|o| o["receipt"].as_str() == Some(receipt.as_str()))
        .cloned()
        .collect();
    (
        StatusCode::OK,
        Json(json!({"entity": "collection", "count": items.len(), "items": items})),
    )
}

async fn razorpay_refund(
    State(calls): State<Arc<GatewayCalls>>,
    Path(payment_id): Path<String>,
    Json(body): Json<Value>,
) -> Reply {
    let n = calls.razorpay_refunds.fetch_add(1, Ordering::SeqCst) + 1;
    if calls.reject_refunds.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"description": "The payment has been fully refunded already"}})),
        );
    }
    let refund = json!({
        "id": format!("rfnd_{n}"),
        "payment_id": payment_id,
        "receipt": body["receipt"],
        "status": "processed"
    });
    calls.refunds.lock().unwrap().push(refund.clone());
    (StatusCode::OK, Json(refund))
}

async fn razorpay_payment_refunds(
    State(calls): State<Arc<GatewayCalls>>,
    Path(payment_id): Path<String>,
) -> Reply {
    calls.refund_lookups.fetch_add(1, Ordering::SeqCst);
    let items = calls.matching_refunds("payment_id", &payment_id);
    (
        StatusCode::OK,
        Json(json!({"entity": "collection", "count": items.len(), "items": items})),
    )
}

async fn stripe_intent(
    State(calls): State<Arc<GatewayCalls>>,
    Form(form): Form<HashMap<String, String>>,
) -> Reply {
    calls.stripe_intents.fetch_add(1, Ordering::SeqCst);
    if calls.take_failure() {
        return unavailable();
    }
    let order_id = form.get("metadata[order_id]").cloned().unwrap_or_default();
    let id = format!("pi_{order_id}");
    (
        StatusCode::OK,
        Json(json!({
            "id": id,
            "client_secret": format!("{id}_secret_mock"),
            "status": "requires_payment_method"
        })),
    )
}

async fn stripe_lookup(State(calls): State<Arc<GatewayCalls>>, Path(id): Path<String>) -> Reply {
    calls.stripe_lookups.fetch_add(1, Ordering::SeqCst);
    let status = calls
        .stripe_status
        .lock()
        .ok()
        .and_then(|s| s.clone())
        .unwrap_or_else(|| "succeeded".to_string());
    (
        StatusCode::OK,
        Json(json!({"id": id, "status": status, "latest_charge": format!("ch_{id}")})),
    )
}

async fn stripe_cancel(State(calls): State<Arc<GatewayCalls>>, Path(id): Path<String>) -> Reply {
    calls.stripe_cancels.fetch_add(1, Ordering::SeqCst);
    (StatusCode::OK, Json(json!({"id": id, "status": "canceled"})))
}

async fn stripe_refund(
    State(calls): State<Arc<GatewayCalls>>,
    Form(form): Form<HashMap<String, String>>,
) -> Reply {
    let n = calls.stripe_refunds.fetch_add(1, Ordering::SeqCst) + 1;
    if calls.reject_refunds.load(Ordering::SeqCst) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": {"message": "Charge has already been refunded."}})),
        );
    }
    let refund = json!({
        "id": format!("re_{n}"),
        "payment_intent": form.get("payment_intent").cloned().unwrap_or_default(),
        "status": "succeeded"
    });
    calls.refunds.lock().unwrap().push(refund.clone());
    (StatusCode::OK, Json(refund))
}

async fn stripe_refund_list(
    State(calls): State<Arc<GatewayCalls>>,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    calls.refund_lookups.fetch_add(1, Ordering::SeqCst);
    let intent = query.get("payment_intent").cloned().unwrap_or_default();
    let data = calls.matching_refunds("payment_intent", &intent);
    (StatusCode::OK, Json(json!({"object": "list", "data": data})))
}

/// Razorpay and Stripe lookalike bound to an ephemeral local port
pub struct MockGateway {
    pub base_url: String,
    pub calls: Arc<GatewayCalls>,
}

pub async fn spawn_mock_gateway() -> MockGateway {
    let calls = Arc::new(GatewayCalls::default());
    let app = Router::new()
        .route("/v1/orders", post(razorpay_order).get(razorpay_orders_by_receipt))
        .route("/v1/payments/{id}/refund", post(razorpay_refund))
        .route("/v1/payments/{id}/refunds", get(razorpay_payment_refunds))
        .route("/v1/payment_intents", post(stripe_intent))
        .route("/v1/payment_intents/{id}", get(stripe_lookup))
        .route("/v1/payment_intents/{id}/cancel", post(stripe_cancel))
        .route("/v1/refunds", post(stripe_refund).get(stripe_refund_list))
        .with_state(calls.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockGateway {
        base_url: format!("http://{addr}"),
        calls,
    }
}

/// Application state on in-memory storage, gateways pointed at the mock
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<MemoryLedger>,
    pub gateway: MockGateway,
}

pub async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

pub async fn test_app_with(customize: impl FnOnce(&mut Config)) -> TestApp {
    build_test_app(customize, |store| store as Arc<dyn OrderStore>).await
}

/// Test app whose order store fails the commit that records a refund
pub async fn test_app_with_flaky_orders() -> (TestApp, Arc<FlakyOrders>) {
    let mut flaky = None;
    let app = build_test_app(
        |_| {},
        |store| {
            let orders = Arc::new(FlakyOrders::new(store));
            flaky = Some(orders.clone());
            orders as Arc<dyn OrderStore>
        },
    )
    .await;
    (app, flaky.unwrap())
}

async fn build_test_app(
    customize: impl FnOnce(&mut Config),
    orders: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn OrderStore>,
) -> TestApp {
    let gateway = spawn_mock_gateway().await;

    let mut config = Config::for_tests();
    config.razorpay.key_id = Some(RZP_KEY_ID.into());
    config.razorpay.secret = Some(RZP_SECRET.into());
    config.razorpay.base_url = gateway.base_url.clone();
    config.stripe.secret = Some(STRIPE_SECRET.into());
    config.stripe.webhook_secret = Some(STRIPE_WEBHOOK_SECRET.into());
    config.stripe.base_url = gateway.base_url.clone();
    customize(&mut config);

    let registry = GatewayRegistry::from_config(&config).unwrap();
    let store = Arc::new(MemoryStore::new());
    let ledger = Arc::new(MemoryLedger::new());
    let mut backends = Backends::memory(store.clone(), ledger.clone());
    backends.orders = orders(store.clone());
    let state = AppState::new(config, backends, registry);

    TestApp {
        state,
        store,
        ledger,
        gateway,
    }
}

/// Order store that loses the next N writes recording a finished refund
pub struct FlakyOrders {
    inner: Arc<MemoryStore>,
    pub fail_refund_commits: AtomicUsize,
}

impl FlakyOrders {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_refund_commits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl OrderStore for FlakyOrders {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        self.inner.insert_order(order).await
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        self.inner.get_order(id).await
    }

    async fn update_order(&self, order: &Order, expected_version: i64) -> StoreResult<()> {
        if order.payment.status == PaymentStatus::Refunded && take(&self.fail_refund_commits) {
            return Err(StoreError::Backend("connection reset".into()));
        }
        self.inner.update_order(order, expected_version).await
    }

    async fn list_stale_pending(
        &self,
        created_before: i64,
        limit: i64,
    ) -> StoreResult<Vec<String>> {
        self.inner.list_stale_pending(created_before, limit).await
    }
}

impl TestApp {
    pub fn calls(&self) -> &GatewayCalls {
        &self.gateway.calls
    }

    pub fn product(&self, name: &str, price: &str, currency: &str, stock: i32) -> Product {
        let product = self
            .store
            .add_product(name, price.parse::<Decimal>().unwrap(), currency);
        self.ledger.set_stock(product.id, stock);
        product
    }

    pub async fn stock(&self, product_id: i64) -> i32 {
        use hamper_server::inventory::InventoryLedger;
        self.ledger.stock(product_id).await.unwrap().unwrap()
    }

    fn tokens(&self) -> &TokenService {
        self.state.sessions.tokens()
    }

    /// Active customer plus an access token for them
    pub fn user(&self, email: &str) -> (User, String) {
        let user = self
            .store
            .add_user(email, "Asha Rao", hash_password(PASSWORD).unwrap());
        let token = self
            .tokens()
            .issue_tokens(user.id, Role::User)
            .unwrap()
            .pair
            .access_token;
        (user, token)
    }

    pub fn admin(&self, username: &str, permissions: &[Permission]) -> (Admin, String) {
        let admin = self
            .store
            .add_admin(username, hash_password(PASSWORD).unwrap(), permissions);
        let token = self
            .tokens()
            .issue_tokens(admin.id, Role::Admin)
            .unwrap()
            .pair
            .access_token;
        (admin, token)
    }

    pub async fn place(&self, user_id: i64, items: &[(i64, i32)]) -> PlaceOrderResponse {
        self.state
            .orders
            .place_order(user_id, order_request(items))
            .await
            .unwrap()
    }

    /// Settle a Razorpay order the way the checkout widget would
    pub async fn pay(&self, user_id: i64, order: &Order) -> Order {
        self.state
            .lifecycle
            .confirm_payment(user_id, &razorpay_confirmation(order))
            .await
            .unwrap()
    }
}

pub fn shipping() -> ShippingDetails {
    ShippingDetails {
        name: "Asha Rao".into(),
        email: "asha@example.com".into(),
        phone: "+91 98450 00000".into(),
        address: "12 MG Road, Bengaluru 560001".into(),
    }
}

pub fn order_request(items: &[(i64, i32)]) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: items
            .iter()
            .map(|&(product_id, quantity)| CartItem {
                product_id,
                quantity,
            })
            .collect(),
        shipping_details: shipping(),
        expected_total: None,
    }
}

/// Correctly signed Razorpay confirmation with payment id `pay_<order id>`
pub fn razorpay_confirmation(order: &Order) -> ConfirmPaymentRequest {
    let reference = order.payment.gateway_reference.clone().unwrap();
    let payment_id = format!("pay_{}", order.id);
    ConfirmPaymentRequest {
        order_id: order.id.clone(),
        signature: razorpay_signature(&reference, &payment_id),
        gateway_reference: reference,
        payment_id,
    }
}

pub fn razorpay_signature(reference: &str, payment_id: &str) -> String {
    RazorpayGateway::new(
        reqwest::Client::new(),
        "http://127.0.0.1:9",
        RZP_KEY_ID,
        RZP_SECRET,
    )
    .sign(reference, payment_id)
    .unwrap()
}
