//! Razorpay integration via REST API (no SDK dependency)
//!
//! Checkout flow: server creates a Razorpay order, the client pays it in the
//! checkout widget and reports `(razorpay_order_id, razorpay_payment_id,
//! razorpay_signature)`. The signature is
//! `hex(HMAC-SHA256(key_secret, order_id + "|" + payment_id))`.
//!
//! Razorpay takes no idempotency key. Orders carry our order id as `receipt`
//! and refunds carry `refund-<order id>`, so a retry can find what an earlier
//! attempt created instead of creating it twice.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::models::GatewayKind;

use super::{
    GatewayIntent, IntentRequest, PaymentError, PaymentGateway, RefundCall, RefundOutcome,
    send_json, to_minor_units,
};

#[derive(Clone)]
pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl std::fmt::Debug for RazorpayGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayGateway")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl RazorpayGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        }
    }

    /// Public key id handed to the checkout widget
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Expected signature for an order/payment pair (hex)
    pub fn sign(&self, order_ref: &str, payment_id: &str) -> Option<String> {
        let mac = self.mac(order_ref, payment_id)?;
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self, order_ref: &str, payment_id: &str) -> Option<Hmac<Sha256>> {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(self.key_secret.as_bytes()).ok()?;
        mac.update(order_ref.as_bytes());
        mac.update(b"|");
        mac.update(payment_id.as_bytes());
        Some(mac)
    }

    fn verify(&self, order_ref: &str, payment_id: &str, signature: &str) -> bool {
        if order_ref.is_empty() || payment_id.is_empty() {
            return false;
        }
        let Ok(sig_bytes) = hex::decode(signature.trim()) else {
            return false;
        };
        let Some(mac) = self.mac(order_ref, payment_id) else {
            return false;
        };
        // Constant-time comparison via hmac::verify_slice
        mac.verify_slice(&sig_bytes).is_ok()
    }
}

fn refund_receipt(order_id: &str) -> String {
    format!("refund-{order_id}")
}

/// `items` of a Razorpay collection response
fn collection_items(body: &serde_json::Value) -> &[serde_json::Value] {
    body["items"].as_array().map(Vec::as_slice).unwrap_or_default()
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Razorpay
    }

    async fn create_intent(&self, req: &IntentRequest<'_>) -> Result<GatewayIntent, PaymentError> {
        let amount_minor = to_minor_units(req.amount, req.currency)?;
        let body = send_json(
            self.kind(),
            self.client
                .post(format!("{}/v1/orders", self.base_url))
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(&serde_json::json!({
                    "amount": amount_minor,
                    "currency": req.currency.to_ascii_uppercase(),
                    "receipt": req.order_id,
                    "notes": { "order_id": req.order_id },
                })),
        )
        .await?;

        let reference = body["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| PaymentError::Rejected {
                gateway: self.kind(),
                reason: "order response without id".into(),
            })?;

        Ok(GatewayIntent {
            reference,
            amount_minor,
            client_secret: None,
        })
    }

    async fn find_intent(
        &self,
        req: &IntentRequest<'_>,
    ) -> Result<Option<GatewayIntent>, PaymentError> {
        let body = send_json(
            self.kind(),
            self.client
                .get(format!("{}/v1/orders", self.base_url))
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .query(&[("receipt", req.order_id)]),
        )
        .await?;

        let found = collection_items(&body)
            .iter()
            .find(|o| o["receipt"].as_str() == Some(req.order_id))
            .and_then(|o| {
                Some(GatewayIntent {
                    reference: o["id"].as_str()?.to_string(),
                    amount_minor: o["amount"].as_i64()?,
                    client_secret: None,
                })
            });
        Ok(found)
    }

    /// Razorpay orders cannot be cancelled; a payment that still lands on
    /// one is refunded when it is reported.
    async fn cancel_intent(&self, reference: &str) -> Result<(), PaymentError> {
        tracing::debug!(gateway = "razorpay", reference, "Orders cannot be voided, nothing to cancel");
        Ok(())
    }

    async fn verify_signature(&self, reference: &str, payment_id: &str, signature: &str) -> bool {
        self.verify(reference, payment_id, signature)
    }

    async fn refund(&self, req: &RefundCall<'_>) -> Result<RefundOutcome, PaymentError> {
        let payment_id = req.payment_id.ok_or_else(|| PaymentError::RefundFailed {
            gateway: self.kind(),
            reason: "no captured payment id on record".into(),
        })?;

        let mut payload = serde_json::json!({
            "receipt": refund_receipt(req.order_id),
            "notes": { "order_id": req.order_id },
        });
        if let Some(amount) = req.amount {
            payload["amount"] = to_minor_units(amount, req.currency)?.into();
        }

        let body = send_json(
            self.kind(),
            self.client
                .post(format!("{}/v1/payments/{payment_id}/refund", self.base_url))
                .basic_auth(&self.key_id, Some(&self.key_secret))
                .json(&payload),
        )
        .await
        .map_err(|e| match e {
            PaymentError::Rejected { gateway, reason } => {
                PaymentError::RefundFailed { gateway, reason }
            }
            other => other,
        })?;

        if body["status"].as_str() == Some("failed") {
            return Err(PaymentError::RefundFailed {
                gateway: self.kind(),
                reason: "refund reported failed".into(),
            });
        }

        body["id"]
            .as_str()
            .map(|id| RefundOutcome {
                refund_id: id.to_string(),
            })
            .ok_or_else(|| PaymentError::RefundFailed {
                gateway: self.kind(),
                reason: "refund response without id".into(),
            })
    }

    async fn find_refund(&self, req: &RefundCall<'_>) -> Result<Option<RefundOutcome>, PaymentError> {
        let Some(payment_id) = req.payment_id else {
            return Ok(None);
        };
        let body = send_json(
            self.kind(),
            self.client
                .get(format!("{}/v1/payments/{payment_id}/refunds", self.base_url))
                .basic_auth(&self.key_id, Some(&self.key_secret)),
        )
        .await?;

        let receipt = refund_receipt(req.order_id);
        Ok(collection_items(&body)
            .iter()
            .filter(|r| r["status"].as_str() != Some("failed"))
            .find(|r| r["receipt"].as_str() == Some(receipt.as_str()))
            .and_then(|r| r["id"].as_str())
            .map(|id| RefundOutcome {
                refund_id: id.to_string(),
            }))
    }
}
