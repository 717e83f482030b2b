//! Domain events
//!
//! Published on a `tokio::sync::broadcast` channel only after the state
//! change they describe is durable. Delivery is fire-and-forget: a missing
//! or lagging subscriber never affects the order that produced the event.

use rust_decimal::Decimal;
use serde::Serialize;
use shared::models::{GatewayKind, OrderStatus};
use tokio::sync::broadcast;

/// Event broadcast channel capacity
const EVENT_CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    OrderCreated {
        order_id: String,
        user_id: i64,
        total_amount: Decimal,
        currency: String,
        gateway: GatewayKind,
    },
    PaymentConfirmed {
        order_id: String,
        gateway: GatewayKind,
        payment_id: String,
    },
    OrderCancelled {
        order_id: String,
        reason: String,
    },
    OrderRefunded {
        order_id: String,
        amount: Decimal,
        refund_id: String,
    },
    OrderStatusChanged {
        order_id: String,
        from: OrderStatus,
        to: OrderStatus,
    },
}

impl DomainEvent {
    pub fn order_id(&self) -> &str {
        match self {
            Self::OrderCreated { order_id, .. }
            | Self::PaymentConfirmed { order_id, .. }
            | Self::OrderCancelled { order_id, .. }
            | Self::OrderRefunded { order_id, .. }
            | Self::OrderStatusChanged { order_id, .. } => order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OrderCreated { .. } => "order_created",
            Self::PaymentConfirmed { .. } => "payment_confirmed",
            Self::OrderCancelled { .. } => "order_cancelled",
            Self::OrderRefunded { .. } => "order_refunded",
            Self::OrderStatusChanged { .. } => "order_status_changed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish without waiting; having no subscribers is not an error
    pub fn publish(&self, event: DomainEvent) {
        tracing::debug!(event = event.name(), order_id = %event.order_id(), "Publishing domain event");
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

/// Notification worker: the stand-in consumer for email and analytics
pub async fn run_notifier(mut rx: broadcast::Receiver<DomainEvent>) {
    tracing::info!("Notification worker started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                tracing::info!(
                    event = event.name(),
                    order_id = %event.order_id(),
                    payload = %payload,
                    "Order notification"
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Notification worker lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::info!("Event bus closed, notification worker stopping");
                break;
            }
        }
    }
}
