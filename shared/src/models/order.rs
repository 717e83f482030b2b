//! Order Model

use super::payment::{CheckoutInfo, Payment};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order lifecycle status
///
/// ```text
/// Pending ──► Processing ──► Shipped ──► Delivered
///    │            │             │            │
///    └──► Cancelled ◄┘          └──► Refunded ◄┘
/// ```
///
/// `Processing` also leads to `Refunded`. `Cancelled` and `Refunded` are
/// terminal; `Delivered` only accepts `Refunded`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Parse from database string
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Whether `self -> next` is a legal edge of the lifecycle graph
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Pending, Cancelled)
                | (Processing, Cancelled)
                | (Processing, Refunded)
                | (Shipped, Refunded)
                | (Delivered, Refunded)
        )
    }

    /// No outgoing transitions at all
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Refunded => "Refunded",
        };
        f.write_str(name)
    }
}

/// Where the hamper goes
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
}

/// Order line item (price snapshot taken at purchase)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub order_id: String,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i32,
    /// Unit price at purchase in currency unit
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Order entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    /// `HMP-YYYYMMDD-<hex>`
    pub id: String,
    pub user_id: i64,
    /// Total amount in currency unit
    pub total_amount: Decimal,
    pub currency: String,
    pub status: OrderStatus,
    pub customer_name: String,
    pub shipping: ShippingDetails,
    pub items: Vec<OrderItem>,
    pub payment: Payment,
    /// Optimistic concurrency counter, bumped on every status change
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

// ============================================================================
// Requests / responses
// ============================================================================

/// One cart line as submitted by the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: i64,
    pub quantity: i32,
}

/// `POST /api/orders`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Vec<CartItem>,
    pub shipping_details: ShippingDetails,
    /// Client-computed total; rejected when it disagrees with live prices
    #[serde(default)]
    pub expected_total: Option<Decimal>,
}

/// Order plus what the client needs to open the gateway checkout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderResponse {
    pub order: Order,
    pub checkout: CheckoutInfo,
}

/// `PATCH /api/admin/orders/{id}/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    #[test]
    fn test_forward_path() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
        assert!(OrderStatus::Processing.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_illegal_edges() {
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Processing));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Shipped.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn test_refund_sources() {
        let sources: Vec<_> = ALL
            .iter()
            .filter(|s| s.can_transition_to(OrderStatus::Refunded))
            .copied()
            .collect();
        assert_eq!(
            sources,
            vec![
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered
            ]
        );
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in [OrderStatus::Cancelled, OrderStatus::Refunded] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_no_self_transitions() {
        for s in ALL {
            assert!(!s.can_transition_to(s));
        }
    }

    #[test]
    fn test_db_roundtrip() {
        for s in ALL {
            assert_eq!(OrderStatus::from_db(s.as_db()), Some(s));
        }
        assert_eq!(OrderStatus::from_db("lost"), None);
    }

    #[test]
    fn test_place_order_request_camel_case() {
        let json = r#"{
            "items": [{"productId": 7, "quantity": 2}],
            "shippingDetails": {"name": "A", "email": "a@b.c", "phone": "1", "address": "x"},
            "expectedTotal": "24.50"
        }"#;
        let req: PlaceOrderRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.items[0].product_id, 7);
        assert_eq!(req.expected_total, Some(Decimal::new(2450, 2)));
    }

    #[test]
    fn test_line_total() {
        let item = OrderItem {
            order_id: "HMP-1".into(),
            product_id: 1,
            product_name: "Tea Hamper".into(),
            quantity: 3,
            unit_price: Decimal::new(1999, 2),
        };
        assert_eq!(item.line_total(), Decimal::new(5997, 2));
    }
}
