//! Order placement
//!
//! `place_order` is the only way an order comes into existence:
//!
//! 1. validate the cart against current catalog prices
//! 2. pick the payment gateway (fails before any stock is touched)
//! 3. reserve every line or none
//! 4. persist order, items and a `PENDING` payment atomically; on failure
//!    the reservations are restored
//! 5. open the gateway intent (idempotent on the order id, retried on
//!    transient errors after looking for an intent the failed attempt may
//!    have created); on failure the order is cancelled, which restores its
//!    stock
//! 6. publish `OrderCreated`
//!
//! Once step 4 succeeds the order row is the record of the reservation: an
//! interrupted placement leaves a `Pending` order that the expiry worker
//! cancels.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use shared::models::{
    CartItem, GatewayKind, Order, OrderItem, OrderStatus, Payment, PaymentStatus,
    PlaceOrderRequest, PlaceOrderResponse, Product, ShippingDetails,
};
use shared::util::{now_millis, order_number};

use super::error::{OrderError, OrderResult};
use super::lifecycle::{CancelSource, OrderLifecycle};
use crate::events::{DomainEvent, EventBus};
use crate::inventory::{InventoryLedger, reserve_all, restore_all};
use crate::payment::{Gateway, GatewayIntent, GatewayRegistry, IntentRequest, PaymentError, PaymentGateway};
use crate::store::{OrderStore, ProductCatalog};

/// Pause between intent creation attempts
const INTENT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Upper bound on units of one product per order
const MAX_LINE_QUANTITY: i32 = 1000;

#[derive(Clone)]
pub struct OrderService {
    catalog: Arc<dyn ProductCatalog>,
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn InventoryLedger>,
    gateways: Arc<GatewayRegistry>,
    lifecycle: OrderLifecycle,
    events: EventBus,
    intent_attempts: u32,
}

/// Cart line priced against the catalog
struct PricedLine {
    product: Product,
    quantity: i32,
}

fn validate_shipping(shipping: &ShippingDetails) -> OrderResult<()> {
    let fields = [
        ("name", &shipping.name),
        ("email", &shipping.email),
        ("phone", &shipping.phone),
        ("address", &shipping.address),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(OrderError::Validation(format!(
                "Shipping {field} is required"
            )));
        }
    }
    if !shipping.email.contains('@') {
        return Err(OrderError::Validation("Shipping email is invalid".into()));
    }
    Ok(())
}

/// Merge duplicate product lines; result is sorted by product id
fn merge_lines(items: &[CartItem]) -> OrderResult<Vec<(i64, i32)>> {
    if items.is_empty() {
        return Err(OrderError::Empty);
    }
    let mut merged: BTreeMap<i64, i32> = BTreeMap::new();
    for item in items {
        if item.quantity <= 0 {
            return Err(OrderError::Validation(format!(
                "Quantity for product {} must be positive",
                item.product_id
            )));
        }
        let qty = merged.entry(item.product_id).or_insert(0);
        *qty = qty.saturating_add(item.quantity);
        if *qty > MAX_LINE_QUANTITY {
            return Err(OrderError::Validation(format!(
                "Quantity for product {} exceeds {MAX_LINE_QUANTITY}",
                item.product_id
            )));
        }
    }
    Ok(merged.into_iter().collect())
}

impl OrderService {
    pub fn new(
        catalog: Arc<dyn ProductCatalog>,
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn InventoryLedger>,
        gateways: Arc<GatewayRegistry>,
        lifecycle: OrderLifecycle,
        events: EventBus,
        intent_attempts: u32,
    ) -> Self {
        Self {
            catalog,
            orders,
            ledger,
            gateways,
            lifecycle,
            events,
            intent_attempts: intent_attempts.max(1),
        }
    }

    async fn price(&self, lines: &[(i64, i32)]) -> OrderResult<Vec<PricedLine>> {
        let ids: Vec<i64> = lines.iter().map(|(id, _)| *id).collect();
        let products = self.catalog.get_products(&ids).await?;

        let mut priced = Vec::with_capacity(lines.len());
        for &(product_id, quantity) in lines {
            let product = products
                .iter()
                .find(|p| p.id == product_id && p.is_active)
                .cloned()
                .ok_or(OrderError::UnknownProduct(product_id))?;
            priced.push(PricedLine { product, quantity });
        }

        let currency = &priced[0].product.currency;
        if priced
            .iter()
            .any(|l| !l.product.currency.eq_ignore_ascii_case(currency))
        {
            return Err(OrderError::CurrencyMismatch);
        }
        Ok(priced)
    }

    pub async fn place_order(
        &self,
        user_id: i64,
        req: PlaceOrderRequest,
    ) -> OrderResult<PlaceOrderResponse> {
        let lines = merge_lines(&req.items)?;
        validate_shipping(&req.shipping_details)?;
        let priced = self.price(&lines).await?;

        let currency = priced[0].product.currency.to_ascii_uppercase();
        let total: Decimal = priced
            .iter()
            .map(|l| l.product.price * Decimal::from(l.quantity))
            .sum();
        if let Some(expected) = req.expected_total
            && expected != total
        {
            tracing::warn!(
                user_id,
                %expected,
                computed = %total,
                "Client total does not match catalog prices"
            );
            return Err(OrderError::TotalMismatch {
                expected,
                computed: total,
            });
        }

        let gateway = self.gateways.route(&currency)?;

        reserve_all(self.ledger.as_ref(), &lines).await?;

        let order = build_order(user_id, &priced, total, &currency, gateway.kind(), req.shipping_details);
        if let Err(e) = self.orders.insert_order(&order).await {
            tracing::error!(order_id = %order.id, error = %e, "Failed to persist order, releasing stock");
            restore_all(self.ledger.as_ref(), &lines).await;
            return Err(e.into());
        }
        tracing::info!(
            order_id = %order.id,
            user_id,
            total = %total,
            currency = %currency,
            gateway = %gateway.kind(),
            "Order placed, stock reserved"
        );

        let intent = match self.open_intent(gateway, &order).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    gateway = %gateway.kind(),
                    error = %e,
                    "Could not open payment, cancelling order"
                );
                if let Err(cancel_err) = self
                    .lifecycle
                    .cancel(&order.id, CancelSource::PlacementAborted)
                    .await
                {
                    tracing::error!(
                        order_id = %order.id,
                        error = %cancel_err,
                        "Cancellation after failed intent also failed, left for expiry"
                    );
                }
                return Err(e.into());
            }
        };

        let order = self.lifecycle.attach_intent(&order.id, &intent.reference).await?;
        let checkout = gateway.checkout_info(&intent, &currency);

        self.events.publish(DomainEvent::OrderCreated {
            order_id: order.id.clone(),
            user_id,
            total_amount: order.total_amount,
            currency: order.currency.clone(),
            gateway: gateway.kind(),
        });
        Ok(PlaceOrderResponse { order, checkout })
    }

    async fn open_intent(&self, gateway: &Gateway, order: &Order) -> Result<GatewayIntent, PaymentError> {
        let req = IntentRequest {
            order_id: &order.id,
            amount: order.total_amount,
            currency: &order.currency,
        };
        let mut attempt = 1;
        loop {
            if attempt > 1 {
                // The failed attempt may still have created the intent
                match gateway.find_intent(&req).await {
                    Ok(Some(intent)) => {
                        tracing::info!(
                            order_id = %order.id,
                            gateway = %gateway.kind(),
                            reference = %intent.reference,
                            "Recovered intent created by an earlier attempt"
                        );
                        return Ok(intent);
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!(
                        order_id = %order.id,
                        gateway = %gateway.kind(),
                        error = %e,
                        "Intent lookup failed before retry"
                    ),
                }
            }
            match gateway.create_intent(&req).await {
                Ok(intent) => return Ok(intent),
                Err(e) if e.is_transient() && attempt < self.intent_attempts => {
                    tracing::warn!(
                        order_id = %order.id,
                        gateway = %gateway.kind(),
                        attempt,
                        error = %e,
                        "Intent creation failed, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(INTENT_RETRY_DELAY).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn build_order(
    user_id: i64,
    priced: &[PricedLine],
    total: Decimal,
    currency: &str,
    gateway: GatewayKind,
    shipping: ShippingDetails,
) -> Order {
    let id = order_number();
    let now = now_millis();
    let items = priced
        .iter()
        .map(|l| OrderItem {
            order_id: id.clone(),
            product_id: l.product.id,
            product_name: l.product.name.clone(),
            quantity: l.quantity,
            unit_price: l.product.price,
        })
        .collect();
    Order {
        payment: Payment {
            order_id: id.clone(),
            amount: total,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            gateway,
            gateway_reference: None,
            gateway_payment_id: None,
            refunded_amount: None,
            refund_reference: None,
            created_at: now,
            updated_at: now,
        },
        id,
        user_id,
        total_amount: total,
        currency: currency.to_string(),
        status: OrderStatus::Pending,
        customer_name: shipping.name.clone(),
        shipping,
        items,
        version: 0,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::MemoryLedger;
    use crate::orders::lifecycle::tests::registry;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;

    /// Order store whose inserts never land
    struct RejectingInserts(Arc<MemoryStore>);

    #[async_trait]
    impl OrderStore for RejectingInserts {
        async fn insert_order(&self, _order: &Order) -> StoreResult<()> {
            Err(StoreError::Backend("disk full".into()))
        }

        async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
            self.0.get_order(id).await
        }

        async fn update_order(&self, order: &Order, expected_version: i64) -> StoreResult<()> {
            self.0.update_order(order, expected_version).await
        }

        async fn list_stale_pending(
            &self,
            created_before: i64,
            limit: i64,
        ) -> StoreResult<Vec<String>> {
            self.0.list_stale_pending(created_before, limit).await
        }
    }

    struct Fixture {
        service: OrderService,
        store: Arc<MemoryStore>,
        ledger: Arc<MemoryLedger>,
        hamper: Product,
    }

    fn fixture() -> Fixture {
        fixture_with(|store| store as Arc<dyn OrderStore>)
    }

    fn fixture_with(orders: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn OrderStore>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let hamper = store.add_product("Festive Dry Fruit Hamper", Decimal::new(129900, 2), "INR");
        ledger.set_stock(hamper.id, 5);
        let gateways = registry();
        let events = EventBus::new();
        let lifecycle = OrderLifecycle::new(store.clone(), ledger.clone(), gateways.clone(), events.clone());
        let service = OrderService::new(
            store.clone(),
            orders(store.clone()),
            ledger.clone(),
            gateways,
            lifecycle,
            events,
            1,
        );
        Fixture {
            service,
            store,
            ledger,
            hamper,
        }
    }

    fn shipping() -> ShippingDetails {
        ShippingDetails {
            name: "Ann".into(),
            email: "ann@example.com".into(),
            phone: "+91 98765 43210".into(),
            address: "12 MG Road, Bengaluru".into(),
        }
    }

    fn request(items: Vec<CartItem>) -> PlaceOrderRequest {
        PlaceOrderRequest {
            items,
            shipping_details: shipping(),
            expected_total: None,
        }
    }

    #[test]
    fn test_merge_lines_sums_duplicates() {
        let lines = merge_lines(&[
            CartItem { product_id: 2, quantity: 1 },
            CartItem { product_id: 1, quantity: 2 },
            CartItem { product_id: 2, quantity: 3 },
        ])
        .unwrap();
        assert_eq!(lines, vec![(1, 2), (2, 4)]);
    }

    #[test]
    fn test_merge_lines_rejects_bad_quantities() {
        assert!(matches!(merge_lines(&[]), Err(OrderError::Empty)));
        assert!(matches!(
            merge_lines(&[CartItem { product_id: 1, quantity: 0 }]),
            Err(OrderError::Validation(_))
        ));
        assert!(matches!(
            merge_lines(&[CartItem { product_id: 1, quantity: -3 }]),
            Err(OrderError::Validation(_))
        ));
    }

    #[test]
    fn test_shipping_validation() {
        assert!(validate_shipping(&shipping()).is_ok());
        let mut s = shipping();
        s.address = "  ".into();
        assert!(validate_shipping(&s).is_err());
        let mut s = shipping();
        s.email = "ann.example.com".into();
        assert!(validate_shipping(&s).is_err());
    }

    #[tokio::test]
    async fn test_unknown_product_rejected_without_reservation() {
        let fx = fixture();
        let req = request(vec![
            CartItem { product_id: fx.hamper.id, quantity: 1 },
            CartItem { product_id: 424242, quantity: 1 },
        ]);
        let err = fx.service.place_order(7, req).await.unwrap_err();
        assert!(matches!(err, OrderError::UnknownProduct(424242)));
        assert_eq!(fx.ledger.stock(fx.hamper.id).await.unwrap(), Some(5));
        assert_eq!(fx.store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_product_rejected() {
        let fx = fixture();
        fx.store.set_product_active(fx.hamper.id, false);
        let req = request(vec![CartItem { product_id: fx.hamper.id, quantity: 1 }]);
        assert!(matches!(
            fx.service.place_order(7, req).await,
            Err(OrderError::UnknownProduct(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_total_rejected() {
        let fx = fixture();
        let mut req = request(vec![CartItem { product_id: fx.hamper.id, quantity: 2 }]);
        req.expected_total = Some(Decimal::new(100, 2));
        let err = fx.service.place_order(7, req).await.unwrap_err();
        match err {
            OrderError::TotalMismatch { computed, .. } => {
                assert_eq!(computed, Decimal::new(259800, 2))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(fx.ledger.stock(fx.hamper.id).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_mixed_currencies_rejected() {
        let fx = fixture();
        let usd = fx.store.add_product("NYC Hamper", Decimal::new(4999, 2), "USD");
        fx.ledger.set_stock(usd.id, 5);
        let req = request(vec![
            CartItem { product_id: fx.hamper.id, quantity: 1 },
            CartItem { product_id: usd.id, quantity: 1 },
        ]);
        assert!(matches!(
            fx.service.place_order(7, req).await,
            Err(OrderError::CurrencyMismatch)
        ));
    }

    #[tokio::test]
    async fn test_unrouted_currency_fails_before_reservation() {
        let fx = fixture();
        let eur = fx.store.add_product("Berlin Hamper", Decimal::new(3999, 2), "EUR");
        fx.ledger.set_stock(eur.id, 5);
        let req = request(vec![CartItem { product_id: eur.id, quantity: 1 }]);
        let err = fx.service.place_order(7, req).await.unwrap_err();
        assert!(matches!(err, OrderError::Payment(PaymentError::NoRoute(_))));
        assert_eq!(fx.ledger.stock(eur.id).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_nothing_behind() {
        let fx = fixture();
        let req = request(vec![CartItem { product_id: fx.hamper.id, quantity: 6 }]);
        let err = fx.service.place_order(7, req).await.unwrap_err();
        assert!(matches!(err, OrderError::Inventory(_)));
        assert_eq!(fx.ledger.stock(fx.hamper.id).await.unwrap(), Some(5));
        assert_eq!(fx.store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_gateway_cancels_order_and_restores_stock() {
        let fx = fixture();
        let req = request(vec![CartItem { product_id: fx.hamper.id, quantity: 2 }]);
        let err = fx.service.place_order(7, req).await.unwrap_err();
        assert!(matches!(err, OrderError::Payment(PaymentError::Unavailable { .. })));

        assert_eq!(fx.ledger.stock(fx.hamper.id).await.unwrap(), Some(5));
        assert_eq!(fx.store.order_count(), 1);
        let ids = fx.store.list_stale_pending(i64::MAX, 10).await.unwrap();
        assert!(ids.is_empty(), "aborted order must not stay pending");
    }

    #[tokio::test]
    async fn test_failed_insert_releases_reservation() {
        let fx = fixture_with(|store| Arc::new(RejectingInserts(store)) as Arc<dyn OrderStore>);
        let req = request(vec![CartItem { product_id: fx.hamper.id, quantity: 3 }]);
        let err = fx.service.place_order(7, req).await.unwrap_err();
        assert!(matches!(err, OrderError::Store(StoreError::Backend(_))));
        assert_eq!(fx.ledger.stock(fx.hamper.id).await.unwrap(), Some(5));
        assert_eq!(fx.store.order_count(), 0);
    }
}
