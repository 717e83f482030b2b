//! Stripe integration via REST API (no SDK dependency)
//!
//! Payments use PaymentIntents. Confirmation is verified server-side by
//! fetching the intent with the secret key (the client-side "signature" is
//! not trusted); webhooks are verified with the endpoint signing secret.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::models::GatewayKind;

use super::{
    GatewayIntent, IntentRequest, PaymentError, PaymentGateway, RefundCall, RefundOutcome,
    send_json, to_minor_units,
};

/// Webhook events older than this are rejected (replay protection)
const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl StripeGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    async fn fetch_intent(&self, reference: &str) -> Result<serde_json::Value, PaymentError> {
        send_json(
            self.kind(),
            self.client
                .get(format!("{}/v1/payment_intents/{reference}", self.base_url))
                .basic_auth(&self.secret_key, None::<&str>),
        )
        .await
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn kind(&self) -> GatewayKind {
        GatewayKind::Stripe
    }

    async fn create_intent(&self, req: &IntentRequest<'_>) -> Result<GatewayIntent, PaymentError> {
        let amount_minor = to_minor_units(req.amount, req.currency)?;
        let amount = amount_minor.to_string();
        let currency = req.currency.to_ascii_lowercase();
        let body = send_json(
            self.kind(),
            self.client
                .post(format!("{}/v1/payment_intents", self.base_url))
                .basic_auth(&self.secret_key, None::<&str>)
                .header("Idempotency-Key", format!("intent-{}", req.order_id))
                .form(&[
                    ("amount", amount.as_str()),
                    ("currency", currency.as_str()),
                    ("metadata[order_id]", req.order_id),
                    ("automatic_payment_methods[enabled]", "true"),
                ]),
        )
        .await?;

        let reference = body["id"].as_str().map(String::from);
        let client_secret = body["client_secret"].as_str().map(String::from);
        match (reference, client_secret) {
            (Some(reference), Some(secret)) => Ok(GatewayIntent {
                reference,
                amount_minor,
                client_secret: Some(secret),
            }),
            _ => Err(PaymentError::Rejected {
                gateway: self.kind(),
                reason: "payment intent response without id or client_secret".into(),
            }),
        }
    }

    async fn cancel_intent(&self, reference: &str) -> Result<(), PaymentError> {
        send_json(
            self.kind(),
            self.client
                .post(format!("{}/v1/payment_intents/{reference}/cancel", self.base_url))
                .basic_auth(&self.secret_key, None::<&str>)
                .form(&[("cancellation_reason", "abandoned")]),
        )
        .await?;
        Ok(())
    }

    /// The intent must exist under our key, be `succeeded`, and the reported
    /// payment id must be the intent itself or its latest charge.
    async fn verify_signature(&self, reference: &str, payment_id: &str, _signature: &str) -> bool {
        if reference.is_empty() || payment_id.is_empty() {
            return false;
        }
        let intent = match self.fetch_intent(reference).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(gateway = "stripe", error = %e, "Could not fetch payment intent for verification");
                return false;
            }
        };
        let id_matches = intent["id"].as_str() == Some(reference);
        let succeeded = intent["status"].as_str() == Some("succeeded");
        let payment_matches =
            payment_id == reference || intent["latest_charge"].as_str() == Some(payment_id);
        id_matches && succeeded && payment_matches
    }

    async fn refund(&self, req: &RefundCall<'_>) -> Result<RefundOutcome, PaymentError> {
        let mut form: Vec<(&str, String)> = vec![
            ("payment_intent", req.reference.to_string()),
            ("metadata[order_id]", req.order_id.to_string()),
        ];
        if let Some(amount) = req.amount {
            form.push(("amount", to_minor_units(amount, req.currency)?.to_string()));
        }

        let body = send_json(
            self.kind(),
            self.client
                .post(format!("{}/v1/refunds", self.base_url))
                .basic_auth(&self.secret_key, None::<&str>)
                .header("Idempotency-Key", format!("refund-{}", req.order_id))
                .form(&form),
        )
        .await
        .map_err(|e| match e {
            PaymentError::Rejected { gateway, reason } => {
                PaymentError::RefundFailed { gateway, reason }
            }
            other => other,
        })?;

        match body["status"].as_str() {
            Some("failed") | Some("canceled") => Err(PaymentError::RefundFailed {
                gateway: self.kind(),
                reason: format!("refund {}", body["status"].as_str().unwrap_or_default()),
            }),
            _ => body["id"]
                .as_str()
                .map(|id| RefundOutcome {
                    refund_id: id.to_string(),
                })
                .ok_or_else(|| PaymentError::RefundFailed {
                    gateway: self.kind(),
                    reason: "refund response without id".into(),
                }),
        }
    }

    async fn find_refund(&self, req: &RefundCall<'_>) -> Result<Option<RefundOutcome>, PaymentError> {
        if req.reference.is_empty() {
            return Ok(None);
        }
        let body = send_json(
            self.kind(),
            self.client
                .get(format!("{}/v1/refunds", self.base_url))
                .basic_auth(&self.secret_key, None::<&str>)
                .query(&[("payment_intent", req.reference)]),
        )
        .await?;

        let refunds = body["data"].as_array().map(Vec::as_slice).unwrap_or_default();
        Ok(refunds
            .iter()
            .filter(|r| !matches!(r["status"].as_str(), Some("failed") | Some("canceled")))
            .find_map(|r| r["id"].as_str())
            .map(|id| RefundOutcome {
                refund_id: id.to_string(),
            }))
    }
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`)
pub fn verify_webhook_signature(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
) -> Result<(), &'static str> {
    verify_webhook_signature_at(payload, sig_header, secret, chrono::Utc::now().timestamp())
}

pub fn verify_webhook_signature_at(
    payload: &[u8],
    sig_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signatures = Vec::new();
    for part in sig_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signatures.push(v);
        }
    }

    if timestamp.is_empty() || signatures.is_empty() {
        return Err("Invalid Stripe-Signature header");
    }

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    if (now - ts).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err("Webhook timestamp outside tolerance");
    }

    let mut mac =
        <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);

    // Constant-time comparison via hmac::verify_slice, any v1 entry may match
    let matched = signatures.iter().any(|sig| {
        hex::decode(sig)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false)
    });
    if matched {
        Ok(())
    } else {
        Err("Webhook signature mismatch")
    }
}

/// Build a `Stripe-Signature` header value (used by tests and local tooling)
pub fn sign_webhook_payload(payload: &[u8], secret: &str, timestamp: i64) -> Option<String> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(format!(
        "t={timestamp},v1={}",
        hex::encode(mac.finalize().into_bytes())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_760_000_000;

    #[test]
    fn test_webhook_signature_roundtrip() {
        let payload = br#"{"id":"evt_1","type":"payment_intent.succeeded"}"#;
        let header = sign_webhook_payload(payload, SECRET, NOW).unwrap();
        assert!(verify_webhook_signature_at(payload, &header, SECRET, NOW + 10).is_ok());
    }

    #[test]
    fn test_webhook_tampered_payload_rejected() {
        let header = sign_webhook_payload(b"{\"amount\":100}", SECRET, NOW).unwrap();
        assert_eq!(
            verify_webhook_signature_at(b"{\"amount\":1}", &header, SECRET, NOW),
            Err("Webhook signature mismatch")
        );
    }

    #[test]
    fn test_webhook_replay_rejected() {
        let payload = b"{}";
        let header = sign_webhook_payload(payload, SECRET, NOW).unwrap();
        assert!(verify_webhook_signature_at(payload, &header, SECRET, NOW + 301).is_err());
    }

    #[test]
    fn test_webhook_accepts_any_matching_v1() {
        let payload = b"{}";
        let good = sign_webhook_payload(payload, SECRET, NOW).unwrap();
        let v1 = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={v1}");
        assert!(verify_webhook_signature_at(payload, &header, SECRET, NOW).is_ok());
    }

    #[test]
    fn test_webhook_malformed_header() {
        assert!(verify_webhook_signature_at(b"{}", "garbage", SECRET, NOW).is_err());
        assert!(verify_webhook_signature_at(b"{}", "t=abc,v1=00", SECRET, NOW).is_err());
    }

    #[tokio::test]
    async fn test_verify_without_ids_is_false() {
        let gw = StripeGateway::new(reqwest::Client::new(), "http://127.0.0.1:9", "sk_test");
        assert!(!gw.verify_signature("", "pi_1", "").await);
        assert!(!gw.verify_signature("pi_1", "", "").await);
    }

    #[tokio::test]
    async fn test_find_refund_without_intent_is_none() {
        let gw = StripeGateway::new(reqwest::Client::new(), "http://127.0.0.1:9", "sk_test");
        let found = gw
            .find_refund(&RefundCall {
                order_id: "HMP-1",
                reference: "",
                payment_id: None,
                amount: None,
                currency: "USD",
            })
            .await
            .unwrap();
        assert_eq!(found, None);
    }

    #[tokio::test]
    async fn test_cancel_intent_unreachable_is_transient() {
        let gw = StripeGateway::new(reqwest::Client::new(), "http://127.0.0.1:9", "sk_test");
        let err = gw.cancel_intent("pi_1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_debug_hides_secret() {
        let gw = StripeGateway::new(reqwest::Client::new(), "http://x", "sk_live_secret");
        assert!(!format!("{gw:?}").contains("sk_live_secret"));
    }
}
