//! Payment gateway adapters
//!
//! One capability interface ([`PaymentGateway`]) with a closed set of
//! variants ([`Gateway`]): Razorpay (order + HMAC-signed confirmation) and
//! Stripe (PaymentIntents behind a secret API key). [`GatewayRegistry`]
//! picks the variant for a currency from configuration and enforces the
//! per-gateway enable switch.
//!
//! Credentials are never logged.

pub mod razorpay;
pub mod registry;
pub mod stripe;

pub use razorpay::RazorpayGateway;
pub use registry::{GatewayRegistry, GatewaySlot};
pub use stripe::StripeGateway;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use shared::error::{AppError, ErrorCode};
use shared::models::{CheckoutInfo, GatewayKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Operator switched the gateway off
    #[error("{0} gateway is disabled")]
    Disabled(GatewayKind),
    /// No API secret present
    #[error("{0} gateway is not configured")]
    NotConfigured(GatewayKind),
    #[error("no payment gateway accepts {0}")]
    NoRoute(String),
    /// Network failure, timeout or gateway-side 5xx
    #[error("{gateway} unavailable: {reason}")]
    Unavailable { gateway: GatewayKind, reason: String },
    /// Gateway refused the request (4xx or unusable response)
    #[error("{gateway} rejected request: {reason}")]
    Rejected { gateway: GatewayKind, reason: String },
    #[error("{gateway} refund failed: {reason}")]
    RefundFailed { gateway: GatewayKind, reason: String },
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}

impl PaymentError {
    /// Whether repeating the same idempotent call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

impl From<PaymentError> for AppError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::Disabled(gateway) | PaymentError::NotConfigured(gateway) => {
                AppError::with_message(ErrorCode::GatewayDisabled, e.to_string())
                    .with_detail("gateway", gateway.as_str())
            }
            PaymentError::NoRoute(ref currency) => {
                AppError::with_message(ErrorCode::GatewayDisabled, e.to_string())
                    .with_detail("currency", currency.clone())
            }
            PaymentError::Unavailable { gateway, .. } => AppError::new(ErrorCode::GatewayUnavailable)
                .with_detail("gateway", gateway.as_str()),
            PaymentError::Rejected { gateway, .. } => {
                AppError::new(ErrorCode::PaymentFailed).with_detail("gateway", gateway.as_str())
            }
            PaymentError::RefundFailed { gateway, reason } => {
                AppError::with_message(ErrorCode::RefundFailed, format!("Refund failed: {reason}"))
                    .with_detail("gateway", gateway.as_str())
            }
            PaymentError::InvalidAmount(msg) => AppError::validation(msg),
        }
    }
}

/// Open a payable intent for an order
#[derive(Debug, Clone)]
pub struct IntentRequest<'a> {
    /// Also the idempotency key
    pub order_id: &'a str,
    pub amount: Decimal,
    pub currency: &'a str,
}

/// Gateway-side intent/order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayIntent {
    pub reference: String,
    pub amount_minor: i64,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RefundCall<'a> {
    pub order_id: &'a str,
    /// Intent / gateway order id
    pub reference: &'a str,
    /// Captured payment id, when the gateway refunds by payment
    pub payment_id: Option<&'a str>,
    /// Partial amount; `None` refunds the full captured amount
    pub amount: Option<Decimal>,
    pub currency: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundOutcome {
    pub refund_id: String,
}

/// Uniform gateway capability
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn kind(&self) -> GatewayKind;

    async fn create_intent(&self, req: &IntentRequest<'_>) -> Result<GatewayIntent, PaymentError>;

    /// Intent already opened for this order by an earlier attempt whose
    /// response was lost. Gateways that deduplicate creation through an
    /// idempotency key have nothing to look up.
    async fn find_intent(
        &self,
        _req: &IntentRequest<'_>,
    ) -> Result<Option<GatewayIntent>, PaymentError> {
        Ok(None)
    }

    /// Stop an unpaid intent from accepting payment
    async fn cancel_intent(&self, reference: &str) -> Result<(), PaymentError>;

    /// Authenticity check for a client-reported payment. Never errors:
    /// anything short of positive proof is `false`.
    async fn verify_signature(&self, reference: &str, payment_id: &str, signature: &str) -> bool;

    async fn refund(&self, req: &RefundCall<'_>) -> Result<RefundOutcome, PaymentError>;

    /// Refund already issued for this payment, if any
    async fn find_refund(&self, req: &RefundCall<'_>) -> Result<Option<RefundOutcome>, PaymentError>;
}

/// Closed set of supported gateways
#[derive(Debug, Clone)]
pub enum Gateway {
    Razorpay(RazorpayGateway),
    Stripe(StripeGateway),
}

impl Gateway {
    /// What the storefront needs to open this gateway's checkout
    pub fn checkout_info(&self, intent: &GatewayIntent, currency: &str) -> CheckoutInfo {
        CheckoutInfo {
            gateway: self.kind(),
            reference: intent.reference.clone(),
            amount_minor: intent.amount_minor,
            currency: currency.to_string(),
            client_secret: intent.client_secret.clone(),
            key_id: match self {
                Gateway::Razorpay(g) => Some(g.key_id().to_string()),
                Gateway::Stripe(_) => None,
            },
        }
    }
}

#[async_trait]
impl PaymentGateway for Gateway {
    fn kind(&self) -> GatewayKind {
        match self {
            Gateway::Razorpay(g) => g.kind(),
            Gateway::Stripe(g) => g.kind(),
        }
    }

    async fn create_intent(&self, req: &IntentRequest<'_>) -> Result<GatewayIntent, PaymentError> {
        match self {
            Gateway::Razorpay(g) => g.create_intent(req).await,
            Gateway::Stripe(g) => g.create_intent(req).await,
        }
    }

    async fn find_intent(
        &self,
        req: &IntentRequest<'_>,
    ) -> Result<Option<GatewayIntent>, PaymentError> {
        match self {
            Gateway::Razorpay(g) => g.find_intent(req).await,
            Gateway::Stripe(g) => g.find_intent(req).await,
        }
    }

    async fn cancel_intent(&self, reference: &str) -> Result<(), PaymentError> {
        match self {
            Gateway::Razorpay(g) => g.cancel_intent(reference).await,
            Gateway::Stripe(g) => g.cancel_intent(reference).await,
        }
    }

    async fn verify_signature(&self, reference: &str, payment_id: &str, signature: &str) -> bool {
        match self {
            Gateway::Razorpay(g) => g.verify_signature(reference, payment_id, signature).await,
            Gateway::Stripe(g) => g.verify_signature(reference, payment_id, signature).await,
        }
    }

    async fn refund(&self, req: &RefundCall<'_>) -> Result<RefundOutcome, PaymentError> {
        match self {
            Gateway::Razorpay(g) => g.refund(req).await,
            Gateway::Stripe(g) => g.refund(req).await,
        }
    }

    async fn find_refund(&self, req: &RefundCall<'_>) -> Result<Option<RefundOutcome>, PaymentError> {
        match self {
            Gateway::Razorpay(g) => g.find_refund(req).await,
            Gateway::Stripe(g) => g.find_refund(req).await,
        }
    }
}

/// ISO-4217 currencies without a minor unit
const ZERO_DECIMAL_CURRENCIES: &[&str] = &[
    "BIF", "CLP", "DJF", "GNF", "JPY", "KMF", "KRW", "MGA", "PYG", "RWF", "UGX", "VND", "VUV",
    "XAF", "XOF", "XPF",
];

/// Convert a currency-unit amount to the integer minor units gateways expect
pub fn to_minor_units(amount: Decimal, currency: &str) -> Result<i64, PaymentError> {
    if amount <= Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    let zero_decimal = ZERO_DECIMAL_CURRENCIES.contains(&currency.to_ascii_uppercase().as_str());
    let minor = if zero_decimal {
        amount
    } else {
        amount * Decimal::ONE_HUNDRED
    };
    if minor.fract() != Decimal::ZERO {
        return Err(PaymentError::InvalidAmount(format!(
            "{amount} has more precision than {currency} allows"
        )));
    }
    minor
        .to_i64()
        .ok_or_else(|| PaymentError::InvalidAmount(format!("{amount} is out of range")))
}

/// Classify a transport-level failure
pub(crate) fn transport_error(gateway: GatewayKind, err: reqwest::Error) -> PaymentError {
    let reason = if err.is_timeout() {
        "timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        // Strip URL (may carry ids) from the message
        err.without_url().to_string()
    };
    PaymentError::Unavailable { gateway, reason }
}

/// Send a request and decode a JSON body, mapping 5xx to `Unavailable` and
/// 4xx to `Rejected` with the gateway's error description.
pub(crate) async fn send_json(
    gateway: GatewayKind,
    request: reqwest::RequestBuilder,
) -> Result<serde_json::Value, PaymentError> {
    let resp = request
        .send()
        .await
        .map_err(|e| transport_error(gateway, e))?;
    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .await
        .unwrap_or_else(|_| serde_json::Value::Null);

    if status.is_server_error() {
        return Err(PaymentError::Unavailable {
            gateway,
            reason: format!("HTTP {status}"),
        });
    }
    if !status.is_success() {
        let reason = body["error"]["description"]
            .as_str()
            .or_else(|| body["error"]["message"].as_str())
            .unwrap_or("request rejected")
            .to_string();
        return Err(PaymentError::Rejected { gateway, reason });
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minor_units_two_decimal() {
        assert_eq!(to_minor_units(Decimal::new(1999, 2), "USD").unwrap(), 1999);
        assert_eq!(to_minor_units(Decimal::new(15, 0), "inr").unwrap(), 1500);
    }

    #[test]
    fn test_minor_units_zero_decimal() {
        assert_eq!(to_minor_units(Decimal::new(1500, 0), "JPY").unwrap(), 1500);
        assert!(to_minor_units(Decimal::new(15005, 1), "JPY").is_err());
    }

    #[test]
    fn test_minor_units_rejects_sub_cent_and_non_positive() {
        assert!(to_minor_units(Decimal::new(10001, 3), "USD").is_err());
        assert!(to_minor_units(Decimal::ZERO, "USD").is_err());
        assert!(to_minor_units(Decimal::new(-5, 0), "USD").is_err());
    }

    #[test]
    fn test_disabled_and_unavailable_are_distinct() {
        let disabled: AppError = PaymentError::Disabled(GatewayKind::Stripe).into();
        let down: AppError = PaymentError::Unavailable {
            gateway: GatewayKind::Stripe,
            reason: "timed out".into(),
        }
        .into();
        assert_eq!(disabled.code, ErrorCode::GatewayDisabled);
        assert_eq!(down.code, ErrorCode::GatewayUnavailable);
        assert_eq!(down.http_status(), http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_refund_failure_maps_to_bad_gateway() {
        let err: AppError = PaymentError::RefundFailed {
            gateway: GatewayKind::Razorpay,
            reason: "already refunded".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::RefundFailed);
        assert_eq!(err.http_status(), http::StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_only_unavailable_is_transient() {
        assert!(
            PaymentError::Unavailable {
                gateway: GatewayKind::Razorpay,
                reason: String::new()
            }
            .is_transient()
        );
        assert!(
            !PaymentError::Rejected {
                gateway: GatewayKind::Razorpay,
                reason: String::new()
            }
            .is_transient()
        );
    }
}
