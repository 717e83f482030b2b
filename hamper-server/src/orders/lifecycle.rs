//! Order state machine
//!
//! Every transition after placement goes through [`OrderLifecycle`]. Each
//! operation holds the order's lock for its whole read-check-write, commits
//! with an optimistic version bump, then publishes its event.
//!
//! | From | To | Trigger |
//! |------|----|---------|
//! | Pending | Processing | verified payment (client callback or webhook) |
//! | Processing | Shipped | admin |
//! | Shipped | Delivered | admin |
//! | Pending | Cancelled | customer, admin, failed payment, expiry |
//! | Processing | Cancelled | admin, after a full gateway refund |
//! | Processing, Shipped, Delivered | Refunded | admin refund |
//!
//! A verified payment that reaches a `Cancelled` order is refunded in full;
//! the order stays `Cancelled`.

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::models::{ConfirmPaymentRequest, Order, OrderStatus, PaymentStatus, RefundRequest};
use shared::util::now_millis;

use super::error::{OrderError, OrderResult};
use super::locks::OrderLocks;
use crate::events::{DomainEvent, EventBus};
use crate::inventory::{InventoryLedger, restore_all};
use crate::payment::{GatewayRegistry, PaymentGateway, RefundCall, RefundOutcome};
use crate::security_log;
use crate::store::OrderStore;

/// Who or what is cancelling an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    Customer(i64),
    Admin(i64),
    PaymentFailed,
    Expired,
    /// Intent creation failed right after the order was persisted
    PlacementAborted,
}

impl CancelSource {
    fn reason(&self) -> &'static str {
        match self {
            Self::Customer(_) => "cancelled by customer",
            Self::Admin(_) => "cancelled by admin",
            Self::PaymentFailed => "payment failed",
            Self::Expired => "payment not received in time",
            Self::PlacementAborted => "payment could not be initiated",
        }
    }

    /// System sources only act on orders that are still awaiting payment
    fn is_system(&self) -> bool {
        matches!(
            self,
            Self::PaymentFailed | Self::Expired | Self::PlacementAborted
        )
    }
}

#[derive(Clone)]
pub struct OrderLifecycle {
    orders: Arc<dyn OrderStore>,
    ledger: Arc<dyn InventoryLedger>,
    gateways: Arc<GatewayRegistry>,
    locks: OrderLocks,
    events: EventBus,
}

fn ensure_transition(order: &Order, to: OrderStatus) -> OrderResult<()> {
    if order.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(OrderError::InvalidTransition {
            from: order.status,
            to,
        })
    }
}

fn item_lines(order: &Order) -> Vec<(i64, i32)> {
    order
        .items
        .iter()
        .map(|i| (i.product_id, i.quantity))
        .collect()
}

impl OrderLifecycle {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        ledger: Arc<dyn InventoryLedger>,
        gateways: Arc<GatewayRegistry>,
        events: EventBus,
    ) -> Self {
        Self {
            orders,
            ledger,
            gateways,
            locks: OrderLocks::new(),
            events,
        }
    }

    pub fn locks(&self) -> &OrderLocks {
        &self.locks
    }

    pub async fn get(&self, order_id: &str) -> OrderResult<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    /// Orders of other users are reported as not found
    pub async fn get_for_user(&self, order_id: &str, user_id: i64) -> OrderResult<Order> {
        let order = self.get(order_id).await?;
        if order.user_id != user_id {
            return Err(OrderError::NotFound(order_id.to_string()));
        }
        Ok(order)
    }

    async fn commit(&self, mut order: Order) -> OrderResult<Order> {
        let expected = order.version;
        order.version += 1;
        order.updated_at = now_millis();
        order.payment.updated_at = order.updated_at;
        self.orders.update_order(&order, expected).await?;
        Ok(order)
    }

    /// Record the gateway reference of a freshly placed order
    pub(crate) async fn attach_intent(&self, order_id: &str, reference: &str) -> OrderResult<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get(order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: order.status,
                to: OrderStatus::Pending,
            });
        }
        order.payment.gateway_reference = Some(reference.to_string());
        self.commit(order).await
    }

    /// Client-reported payment. The gateway must vouch for it before the
    /// order leaves `Pending`. A verified payment for an order that was
    /// cancelled in the meantime is refunded.
    pub async fn confirm_payment(
        &self,
        user_id: i64,
        req: &ConfirmPaymentRequest,
    ) -> OrderResult<Order> {
        let _guard = self.locks.acquire(&req.order_id).await;
        let order = self.get_for_user(&req.order_id, user_id).await?;

        if order.status != OrderStatus::Cancelled {
            if order.payment.status == PaymentStatus::Paid {
                if order.payment.gateway_payment_id.as_deref() == Some(req.payment_id.as_str()) {
                    return Ok(order);
                }
                return Err(OrderError::InvalidTransition {
                    from: order.status,
                    to: OrderStatus::Processing,
                });
            }
            ensure_transition(&order, OrderStatus::Processing)?;
        }

        let kind = order.payment.gateway;
        if order.payment.gateway_reference.as_deref() != Some(req.gateway_reference.as_str()) {
            security_log!(
                WARN,
                "payment_reference_mismatch",
                order_id = %order.id,
                user_id,
                gateway = %kind
            );
            return Err(OrderError::SignatureInvalid);
        }

        let gateway = self.gateways.for_settlement(kind)?;
        if !gateway
            .verify_signature(&req.gateway_reference, &req.payment_id, &req.signature)
            .await
        {
            security_log!(
                WARN,
                "payment_signature_invalid",
                order_id = %order.id,
                user_id,
                gateway = %kind
            );
            return Err(OrderError::SignatureInvalid);
        }

        if order.status == OrderStatus::Cancelled {
            return self.refund_late_payment(order, &req.payment_id).await;
        }
        self.mark_paid(order, &req.payment_id).await
    }

    /// Payment reported by an authenticated gateway webhook
    pub async fn confirm_from_webhook(
        &self,
        order_id: &str,
        reference: &str,
        payment_id: &str,
    ) -> OrderResult<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.get(order_id).await?;

        if order.status != OrderStatus::Cancelled {
            if order.payment.status == PaymentStatus::Paid {
                return Ok(order);
            }
            ensure_transition(&order, OrderStatus::Processing)?;
        }
        if order.payment.gateway_reference.as_deref() != Some(reference) {
            security_log!(
                WARN,
                "webhook_reference_mismatch",
                order_id = %order.id,
                gateway = %order.payment.gateway
            );
            return Err(OrderError::SignatureInvalid);
        }

        if order.status == OrderStatus::Cancelled {
            return self.refund_late_payment(order, payment_id).await;
        }
        self.mark_paid(order, payment_id).await
    }

    async fn mark_paid(&self, mut order: Order, payment_id: &str) -> OrderResult<Order> {
        order.status = OrderStatus::Processing;
        order.payment.status = PaymentStatus::Paid;
        order.payment.gateway_payment_id = Some(payment_id.to_string());
        let order = self.commit(order).await?;

        tracing::info!(
            order_id = %order.id,
            gateway = %order.payment.gateway,
            amount = %order.payment.amount,
            "Payment confirmed"
        );
        self.events.publish(DomainEvent::PaymentConfirmed {
            order_id: order.id.clone(),
            gateway: order.payment.gateway,
            payment_id: payment_id.to_string(),
        });
        Ok(order)
    }

    /// Verified payment for an order that was cancelled while its intent was
    /// still payable. The stock is already released, so the payment is
    /// refunded in full and the order stays `Cancelled`.
    async fn refund_late_payment(&self, mut order: Order, payment_id: &str) -> OrderResult<Order> {
        let same_payment = order.payment.gateway_payment_id.as_deref() == Some(payment_id);
        match order.payment.status {
            PaymentStatus::Refunded if same_payment => return Ok(order),
            PaymentStatus::Paid if same_payment => {}
            PaymentStatus::Pending | PaymentStatus::Failed => {
                security_log!(
                    WARN,
                    "late_payment_on_cancelled_order",
                    order_id = %order.id,
                    gateway = %order.payment.gateway,
                    payment_id,
                    amount = %order.payment.amount
                );
                order.payment.status = PaymentStatus::Paid;
                order.payment.gateway_payment_id = Some(payment_id.to_string());
            }
            _ => {
                return Err(OrderError::InvalidTransition {
                    from: order.status,
                    to: OrderStatus::Processing,
                });
            }
        }

        let amount = order.payment.amount;
        let (mut order, outcome) = self.refund_at_gateway(order, amount).await?;
        order.payment.status = PaymentStatus::Refunded;
        order.payment.refund_reference = Some(outcome.refund_id.clone());
        let order = self.commit(order).await?;

        security_log!(
            WARN,
            "late_payment_refunded",
            order_id = %order.id,
            gateway = %order.payment.gateway,
            refund_id = %outcome.refund_id,
            %amount
        );
        self.events.publish(DomainEvent::OrderRefunded {
            order_id: order.id.clone(),
            amount,
            refund_id: outcome.refund_id,
        });
        Ok(order)
    }

    /// Admin refund. A payment that is already refunded is returned as is
    /// without contacting the gateway.
    pub async fn refund(
        &self,
        order_id: &str,
        req: &RefundRequest,
        admin_id: i64,
    ) -> OrderResult<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.get(order_id).await?;
        tracing::info!(
            order_id,
            admin_id,
            reason = req.reason.as_deref().unwrap_or(""),
            "Refund requested"
        );
        self.settle_refund(order, req.amount, OrderStatus::Refunded)
            .await
    }

    /// Refund through the gateway, then move to `target` (`Refunded`, or
    /// `Cancelled` for a paid order cancelled by an admin). The order only
    /// changes state once the gateway confirms.
    async fn settle_refund(
        &self,
        order: Order,
        amount: Option<Decimal>,
        target: OrderStatus,
    ) -> OrderResult<Order> {
        match order.payment.status {
            PaymentStatus::Refunded => {
                tracing::info!(order_id = %order.id, "Refund already processed");
                return Ok(order);
            }
            PaymentStatus::Paid => {}
            other => return Err(OrderError::PaymentNotPaid(other)),
        }
        ensure_transition(&order, target)?;

        let paid = order.payment.amount;
        let amount = match order.payment.refunded_amount {
            Some(recorded) if order.payment.refund_in_flight() => {
                tracing::info!(order_id = %order.id, %recorded, "Resuming unsettled refund");
                recorded
            }
            _ => {
                let amount = amount.unwrap_or(paid);
                if amount <= Decimal::ZERO {
                    return Err(OrderError::Validation(
                        "Refund amount must be positive".into(),
                    ));
                }
                if amount > paid {
                    return Err(OrderError::RefundExceedsAmount {
                        requested: amount,
                        paid,
                    });
                }
                amount
            }
        };

        let kind = order.payment.gateway;
        let (mut order, outcome) = self.refund_at_gateway(order, amount).await?;

        let order_id = order.id.clone();
        let from = order.status;
        order.status = target;
        order.payment.status = PaymentStatus::Refunded;
        order.payment.refund_reference = Some(outcome.refund_id.clone());
        let order = match self.commit(order).await {
            Ok(order) => order,
            Err(e) => {
                tracing::error!(
                    order_id = %order_id,
                    gateway = %kind,
                    refund_id = %outcome.refund_id,
                    error = %e,
                    "Refund succeeded at gateway but order update failed, next attempt reconciles"
                );
                return Err(e);
            }
        };

        restore_all(self.ledger.as_ref(), &item_lines(&order)).await;
        tracing::info!(
            order_id = %order.id,
            gateway = %kind,
            %amount,
            refund_id = %outcome.refund_id,
            %from,
            to = %target,
            "Order refunded"
        );
        self.events.publish(DomainEvent::OrderRefunded {
            order_id: order.id.clone(),
            amount,
            refund_id: outcome.refund_id,
        });
        if target == OrderStatus::Cancelled {
            self.events.publish(DomainEvent::OrderCancelled {
                order_id: order.id.clone(),
                reason: "cancelled by admin, payment refunded".to_string(),
            });
        }
        Ok(order)
    }

    /// Gateway refund of `amount` behind a persisted in-flight marker.
    ///
    /// The marker is committed before the gateway is called. If it is
    /// already set, an earlier attempt may have refunded without recording
    /// it, so the gateway is asked for an existing refund first. The marker
    /// is cleared only when the gateway rejected a fresh request outright.
    /// Returns the order as committed with the marker.
    async fn refund_at_gateway(
        &self,
        mut order: Order,
        amount: Decimal,
    ) -> OrderResult<(Order, RefundOutcome)> {
        let kind = order.payment.gateway;
        let gateway = self.gateways.for_settlement(kind)?;
        let resuming = order.payment.refund_in_flight();
        if !resuming {
            order.payment.refunded_amount = Some(amount);
            order = self.commit(order).await?;
        }

        let result = {
            let call = RefundCall {
                order_id: &order.id,
                reference: order.payment.gateway_reference.as_deref().unwrap_or_default(),
                payment_id: order.payment.gateway_payment_id.as_deref(),
                amount: (amount < order.payment.amount).then_some(amount),
                currency: &order.currency,
            };
            let existing = if resuming {
                gateway.find_refund(&call).await
            } else {
                Ok(None)
            };
            match existing {
                Ok(Some(outcome)) => {
                    tracing::info!(
                        order_id = %order.id,
                        gateway = %kind,
                        refund_id = %outcome.refund_id,
                        "Found refund issued by an earlier attempt"
                    );
                    Ok(outcome)
                }
                Ok(None) => gateway.refund(&call).await,
                Err(e) => Err(e),
            }
        };

        let e = match result {
            Ok(outcome) => return Ok((order, outcome)),
            Err(e) => e,
        };
        let order_id = order.id.clone();
        tracing::error!(
            order_id = %order_id,
            gateway = %kind,
            error = %e,
            "Gateway refund failed"
        );
        if !resuming && !e.is_transient() {
            order.payment.refunded_amount = None;
            if let Err(clear_err) = self.commit(order).await {
                tracing::error!(order_id = %order_id, error = %clear_err, "Failed to clear refund marker");
            }
        }
        Err(e.into())
    }

    /// Cancel an order. Repeating a cancellation returns the cancelled
    /// order unchanged.
    pub async fn cancel(&self, order_id: &str, source: CancelSource) -> OrderResult<Order> {
        let _guard = self.locks.acquire(order_id).await;
        let order = match source {
            CancelSource::Customer(user_id) => self.get_for_user(order_id, user_id).await?,
            _ => self.get(order_id).await?,
        };

        if order.status == OrderStatus::Cancelled {
            return Ok(order);
        }
        match (source, order.status) {
            (_, OrderStatus::Pending) => self.cancel_pending(order, source).await,
            (CancelSource::Admin(admin_id), OrderStatus::Processing) => {
                tracing::info!(order_id, admin_id, "Cancelling paid order, refunding first");
                self.settle_refund(order, None, OrderStatus::Cancelled)
                    .await
            }
            (s, _) if s.is_system() => {
                tracing::debug!(order_id, status = %order.status, "Order no longer pending, skipping cancellation");
                Ok(order)
            }
            (_, from) => Err(OrderError::InvalidTransition {
                from,
                to: OrderStatus::Cancelled,
            }),
        }
    }

    async fn cancel_pending(&self, mut order: Order, source: CancelSource) -> OrderResult<Order> {
        order.status = OrderStatus::Cancelled;
        order.payment.status = PaymentStatus::Failed;
        let order = self.commit(order).await?;

        restore_all(self.ledger.as_ref(), &item_lines(&order)).await;
        tracing::info!(order_id = %order.id, reason = source.reason(), "Order cancelled");
        self.events.publish(DomainEvent::OrderCancelled {
            order_id: order.id.clone(),
            reason: source.reason().to_string(),
        });
        self.void_intent(&order).await;
        Ok(order)
    }

    /// Stop the gateway from taking payment for a cancelled order. Failure
    /// is only logged: a payment that still arrives is refunded then.
    async fn void_intent(&self, order: &Order) {
        let Some(reference) = order.payment.gateway_reference.as_deref() else {
            return;
        };
        let kind = order.payment.gateway;
        let result = match self.gateways.for_settlement(kind) {
            Ok(gateway) => gateway.cancel_intent(reference).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(
                order_id = %order.id,
                gateway = %kind,
                error = %e,
                "Could not cancel payment intent"
            );
        }
    }

    /// Manual fulfilment update by an admin. `Cancelled` goes through
    /// [`Self::cancel`]; `Processing` and `Refunded` have dedicated paths and
    /// are rejected here.
    pub async fn advance(
        &self,
        order_id: &str,
        target: OrderStatus,
        admin_id: i64,
    ) -> OrderResult<Order> {
        if target == OrderStatus::Cancelled {
            return self.cancel(order_id, CancelSource::Admin(admin_id)).await;
        }

        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.get(order_id).await?;
        let from = order.status;
        if !matches!(target, OrderStatus::Shipped | OrderStatus::Delivered) {
            return Err(OrderError::InvalidTransition { from, to: target });
        }
        if order.payment.refund_in_flight() {
            return Err(OrderError::RefundInFlight(order.id));
        }
        ensure_transition(&order, target)?;

        order.status = target;
        let order = self.commit(order).await?;

        tracing::info!(order_id, admin_id, %from, to = %target, "Order status updated");
        self.events.publish(DomainEvent::OrderStatusChanged {
            order_id: order.id.clone(),
            from,
            to: target,
        });
        Ok(order)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::inventory::MemoryLedger;
    use crate::payment::{Gateway, GatewaySlot, PaymentError, RazorpayGateway};
    use crate::store::MemoryStore;
    use shared::models::{GatewayKind, OrderItem, Payment, ShippingDetails};

    pub(crate) const RZP_SECRET: &str = "rzp_test_secret";

    pub(crate) fn razorpay() -> RazorpayGateway {
        RazorpayGateway::new(reqwest::Client::new(), "http://127.0.0.1:9", "rzp_test_key", RZP_SECRET)
    }

    pub(crate) fn registry() -> Arc<GatewayRegistry> {
        Arc::new(GatewayRegistry::new(
            vec![GatewaySlot::new(
                GatewayKind::Razorpay,
                Some(Gateway::Razorpay(razorpay())),
                true,
                vec!["INR".into()],
            )],
            None,
        ))
    }

    pub(crate) fn pending_order(id: &str, user_id: i64, product_id: i64, quantity: i32) -> Order {
        let now = now_millis();
        let unit_price = Decimal::new(50000, 2);
        let total = unit_price * Decimal::from(quantity);
        Order {
            id: id.to_string(),
            user_id,
            total_amount: total,
            currency: "INR".into(),
            status: OrderStatus::Pending,
            customer_name: "Ann".into(),
            shipping: ShippingDetails {
                name: "Ann".into(),
                email: "ann@example.com".into(),
                phone: "+91 98765 43210".into(),
                address: "12 MG Road, Bengaluru".into(),
            },
            items: vec![OrderItem {
                order_id: id.to_string(),
                product_id,
                product_name: "Diwali Sweets Hamper".into(),
                quantity,
                unit_price,
            }],
            payment: Payment {
                order_id: id.to_string(),
                amount: total,
                currency: "INR".into(),
                status: PaymentStatus::Pending,
                gateway: GatewayKind::Razorpay,
                gateway_reference: Some(format!("order_{id}")),
                gateway_payment_id: None,
                refunded_amount: None,
                refund_reference: None,
                created_at: now,
                updated_at: now,
            },
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    struct Fixture {
        lifecycle: OrderLifecycle,
        store: Arc<MemoryStore>,
        ledger: Arc<MemoryLedger>,
        events: EventBus,
    }

    /// One pending order `HMP-T1` for user 7 holding 2 units of product 1
    /// (stock 3 left after reservation)
    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set_stock(1, 3);
        store.insert_order(&pending_order("HMP-T1", 7, 1, 2)).await.unwrap();
        let events = EventBus::new();
        let lifecycle = OrderLifecycle::new(store.clone(), ledger.clone(), registry(), events.clone());
        Fixture {
            lifecycle,
            store,
            ledger,
            events,
        }
    }

    fn confirm_request(payment_id: &str, signature: String) -> ConfirmPaymentRequest {
        ConfirmPaymentRequest {
            order_id: "HMP-T1".into(),
            gateway_reference: "order_HMP-T1".into(),
            payment_id: payment_id.into(),
            signature,
        }
    }

    fn valid_confirm() -> ConfirmPaymentRequest {
        let sig = razorpay().sign("order_HMP-T1", "pay_1").unwrap();
        confirm_request("pay_1", sig)
    }

    async fn stored(store: &MemoryStore, id: &str) -> Order {
        store.get_order(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_confirm_marks_paid_and_processing() {
        let fx = fixture().await;
        let mut rx = fx.events.subscribe();

        let order = fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment.status, PaymentStatus::Paid);
        assert_eq!(order.payment.gateway_payment_id.as_deref(), Some("pay_1"));
        assert_eq!(order.version, 1);
        assert_eq!(stored(&fx.store, "HMP-T1").await.status, OrderStatus::Processing);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "payment_confirmed");
    }

    #[tokio::test]
    async fn test_confirm_is_idempotent() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        let again = fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        assert_eq!(again.version, 1);
    }

    #[tokio::test]
    async fn test_tampered_signature_leaves_order_pending() {
        let fx = fixture().await;
        let mut sig = razorpay().sign("order_HMP-T1", "pay_1").unwrap();
        sig.replace_range(0..1, if sig.starts_with('0') { "1" } else { "0" });

        let err = fx
            .lifecycle
            .confirm_payment(7, &confirm_request("pay_1", sig))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::SignatureInvalid));

        let order = stored(&fx.store, "HMP-T1").await;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_signature_for_other_payment_rejected() {
        let fx = fixture().await;
        let sig = razorpay().sign("order_HMP-T1", "pay_other").unwrap();
        let err = fx
            .lifecycle
            .confirm_payment(7, &confirm_request("pay_1", sig))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::SignatureInvalid));
    }

    #[tokio::test]
    async fn test_confirm_by_other_user_is_not_found() {
        let fx = fixture().await;
        let err = fx.lifecycle.confirm_payment(8, &valid_confirm()).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_customer_cancel_restores_stock_once() {
        let fx = fixture().await;
        let order = fx.lifecycle.cancel("HMP-T1", CancelSource::Customer(7)).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment.status, PaymentStatus::Failed);
        assert_eq!(fx.ledger.stock(1).await.unwrap(), Some(5));

        fx.lifecycle.cancel("HMP-T1", CancelSource::Customer(7)).await.unwrap();
        fx.lifecycle.cancel("HMP-T1", CancelSource::Expired).await.unwrap();
        assert_eq!(fx.ledger.stock(1).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_customer_cannot_cancel_paid_order() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        let err = fx.lifecycle.cancel("HMP-T1", CancelSource::Customer(7)).await.unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Processing,
                to: OrderStatus::Cancelled
            }
        ));
    }

    #[tokio::test]
    async fn test_expiry_skips_paid_order() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        let order = fx.lifecycle.cancel("HMP-T1", CancelSource::Expired).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(fx.ledger.stock(1).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_fulfilment_path_and_backwards_rejected() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        fx.lifecycle.advance("HMP-T1", OrderStatus::Shipped, 1).await.unwrap();
        let order = fx.lifecycle.advance("HMP-T1", OrderStatus::Delivered, 1).await.unwrap();
        assert_eq!(order.status, OrderStatus::Delivered);

        let err = fx
            .lifecycle
            .advance("HMP-T1", OrderStatus::Processing, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OrderError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Processing
            }
        ));
        assert_eq!(stored(&fx.store, "HMP-T1").await.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_cannot_ship_unpaid_order() {
        let fx = fixture().await;
        let err = fx.lifecycle.advance("HMP-T1", OrderStatus::Shipped, 1).await.unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_refund_requires_paid() {
        let fx = fixture().await;
        let err = fx
            .lifecycle
            .refund("HMP-T1", &RefundRequest::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::PaymentNotPaid(PaymentStatus::Pending)));
    }

    #[tokio::test]
    async fn test_refund_over_paid_amount_rejected() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        let req = RefundRequest {
            amount: Some(Decimal::new(100001, 2)),
            reason: None,
        };
        let err = fx.lifecycle.refund("HMP-T1", &req, 1).await.unwrap_err();
        assert!(matches!(err, OrderError::RefundExceedsAmount { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_gateway_keeps_refund_marker() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();

        // gateway base url points at a closed port
        let err = fx
            .lifecycle
            .refund("HMP-T1", &RefundRequest::default(), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Payment(PaymentError::Unavailable { .. })));

        // outcome unknown: still paid, but the next attempt must look first
        let order = stored(&fx.store, "HMP-T1").await;
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment.status, PaymentStatus::Paid);
        assert!(order.payment.refund_in_flight());
        assert_eq!(order.payment.refunded_amount, Some(order.payment.amount));
        assert_eq!(fx.ledger.stock(1).await.unwrap(), Some(3));

        let err = fx.lifecycle.advance("HMP-T1", OrderStatus::Shipped, 1).await.unwrap_err();
        assert!(matches!(err, OrderError::RefundInFlight(_)));
    }

    #[tokio::test]
    async fn test_resumed_refund_keeps_recorded_amount() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        let partial = RefundRequest {
            amount: Some(Decimal::new(20000, 2)),
            reason: None,
        };
        fx.lifecycle.refund("HMP-T1", &partial, 1).await.unwrap_err();

        // a different amount on retry does not replace the one in flight
        fx.lifecycle
            .refund("HMP-T1", &RefundRequest::default(), 1)
            .await
            .unwrap_err();
        let order = stored(&fx.store, "HMP-T1").await;
        assert_eq!(order.payment.refunded_amount, Some(Decimal::new(20000, 2)));
    }

    #[tokio::test]
    async fn test_late_payment_on_cancelled_order_is_captured_for_refund() {
        let fx = fixture().await;
        fx.lifecycle.cancel("HMP-T1", CancelSource::Customer(7)).await.unwrap();

        // verified payment arrives after cancellation; the refund cannot
        // reach the gateway, so the payment stays on record as owed
        let err = fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap_err();
        assert!(matches!(err, OrderError::Payment(_)));

        let order = stored(&fx.store, "HMP-T1").await;
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.payment.status, PaymentStatus::Paid);
        assert_eq!(order.payment.gateway_payment_id.as_deref(), Some("pay_1"));
        assert!(order.payment.refund_in_flight());
        assert_eq!(fx.ledger.stock(1).await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_unverified_payment_on_cancelled_order_rejected() {
        let fx = fixture().await;
        fx.lifecycle.cancel("HMP-T1", CancelSource::Customer(7)).await.unwrap();
        let sig = razorpay().sign("order_HMP-T1", "pay_other").unwrap();

        let err = fx
            .lifecycle
            .confirm_payment(7, &confirm_request("pay_1", sig))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::SignatureInvalid));
        let order = stored(&fx.store, "HMP-T1").await;
        assert_eq!(order.payment.status, PaymentStatus::Failed);
        assert_eq!(order.payment.refunded_amount, None);
    }

    #[tokio::test]
    async fn test_refund_of_refunded_payment_is_noop() {
        let fx = fixture().await;
        let mut order = stored(&fx.store, "HMP-T1").await;
        order.status = OrderStatus::Refunded;
        order.payment.status = PaymentStatus::Refunded;
        order.version = 1;
        fx.store.update_order(&order, 0).await.unwrap();

        // no gateway is reachable, so success proves it was never called
        let order = fx
            .lifecycle
            .refund("HMP-T1", &RefundRequest::default(), 1)
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(fx.ledger.stock(1).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_advance_rejects_refunded_target() {
        let fx = fixture().await;
        fx.lifecycle.confirm_payment(7, &valid_confirm()).await.unwrap();
        let err = fx
            .lifecycle
            .advance("HMP-T1", OrderStatus::Refunded, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_webhook_confirmation_checks_reference() {
        let fx = fixture().await;
        let err = fx
            .lifecycle
            .confirm_from_webhook("HMP-T1", "order_other", "pay_1")
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::SignatureInvalid));

        let order = fx
            .lifecycle
            .confirm_from_webhook("HMP-T1", "order_HMP-T1", "pay_1")
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }
}
