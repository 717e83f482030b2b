//! Payment Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Payment status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            "FAILED" => Some(Self::Failed),
            "REFUNDED" => Some(Self::Refunded),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Failed => "FAILED",
            Self::Refunded => "REFUNDED",
        }
    }
}

/// Supported payment gateway families
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    /// HMAC-signed order/payment confirmation
    Razorpay,
    /// REST API key, PaymentIntents
    Stripe,
}

impl GatewayKind {
    pub const ALL: [GatewayKind; 2] = [GatewayKind::Razorpay, GatewayKind::Stripe];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Razorpay => "razorpay",
            Self::Stripe => "stripe",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "razorpay" => Some(Self::Razorpay),
            "stripe" => Some(Self::Stripe),
            _ => None,
        }
    }
}

impl std::fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment record, one per order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub order_id: String,
    /// Amount in currency unit
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub gateway: GatewayKind,
    /// Gateway order / intent id, set once the intent exists
    pub gateway_reference: Option<String>,
    /// Gateway payment id reported at confirmation
    pub gateway_payment_id: Option<String>,
    /// Written before the gateway is asked to refund
    pub refunded_amount: Option<Decimal>,
    /// Gateway refund id, written once the gateway confirmed the refund
    pub refund_reference: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Payment {
    /// A refund was started but its outcome is not recorded yet. The gateway
    /// may or may not have executed it, so it must be looked up before any
    /// new refund is issued.
    pub fn refund_in_flight(&self) -> bool {
        self.status == PaymentStatus::Paid
            && self.refunded_amount.is_some()
            && self.refund_reference.is_none()
    }
}

/// Data the client needs to complete checkout with the chosen gateway
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutInfo {
    pub gateway: GatewayKind,
    pub reference: String,
    /// Amount in minor units, as sent to the gateway
    pub amount_minor: i64,
    pub currency: String,
    /// Stripe PaymentIntent client secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Razorpay public key id for the checkout widget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

/// `POST /api/payments/confirm`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmPaymentRequest {
    pub order_id: String,
    pub gateway_reference: String,
    pub payment_id: String,
    #[serde(default)]
    pub signature: String,
}

/// `POST /api/admin/orders/{id}/refund`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundRequest {
    /// Partial amount in currency unit; full refund when absent
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Gateway state as reported to admins (never includes secrets)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayStatus {
    pub name: GatewayKind,
    pub configured: bool,
    pub enabled: bool,
    pub currencies: Vec<String>,
}

/// `PUT /api/admin/gateways/{name}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayToggleRequest {
    pub enabled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Refunded).unwrap(),
            "\"REFUNDED\""
        );
        assert_eq!(PaymentStatus::from_db("PAID"), Some(PaymentStatus::Paid));
        assert_eq!(PaymentStatus::from_db("paid"), None);
    }

    #[test]
    fn test_gateway_kind_parse() {
        assert_eq!(GatewayKind::parse("Stripe"), Some(GatewayKind::Stripe));
        assert_eq!(GatewayKind::parse("razorpay"), Some(GatewayKind::Razorpay));
        assert_eq!(GatewayKind::parse("paypal"), None);
        assert_eq!(
            serde_json::to_string(&GatewayKind::Razorpay).unwrap(),
            "\"razorpay\""
        );
    }

    #[test]
    fn test_checkout_info_omits_absent_fields() {
        let info = CheckoutInfo {
            gateway: GatewayKind::Razorpay,
            reference: "order_abc".into(),
            amount_minor: 149_900,
            currency: "INR".into(),
            client_secret: None,
            key_id: Some("rzp_test_1".into()),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert!(json.get("client_secret").is_none());
        assert_eq!(json["key_id"], "rzp_test_1");
    }

    #[test]
    fn test_refund_in_flight_marker() {
        let mut payment = Payment {
            order_id: "HMP-1".into(),
            amount: Decimal::new(99900, 2),
            currency: "INR".into(),
            status: PaymentStatus::Paid,
            gateway: GatewayKind::Razorpay,
            gateway_reference: Some("order_1".into()),
            gateway_payment_id: Some("pay_1".into()),
            refunded_amount: None,
            refund_reference: None,
            created_at: 0,
            updated_at: 0,
        };
        assert!(!payment.refund_in_flight());

        payment.refunded_amount = Some(payment.amount);
        assert!(payment.refund_in_flight());

        payment.refund_reference = Some("rfnd_1".into());
        payment.status = PaymentStatus::Refunded;
        assert!(!payment.refund_in_flight());
    }
}
