//! Stripe webhook
//!
//! POST /api/webhooks/stripe: raw body, authenticated by `Stripe-Signature`.
//! Processing is idempotent (confirmation and cancellation both tolerate
//! repeats), so redelivered events are harmless. A success event for an
//! order that was already cancelled refunds the payment.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};

use crate::orders::{CancelSource, OrderError};
use crate::payment::stripe::verify_webhook_signature;
use crate::security_log;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/stripe", post(stripe_webhook))
}

/// Outcome of applying an event to an order: storage and gateway failures
/// (such as a refund of a late payment that did not go through) ask Stripe
/// to redeliver, anything else is acknowledged.
fn ack(result: Result<(), OrderError>, event_type: &str, order_id: &str) -> StatusCode {
    match result {
        Ok(()) => StatusCode::OK,
        Err(e @ (OrderError::Store(_) | OrderError::Payment(_))) => {
            tracing::error!(event_type, order_id, error = %e, "Webhook processing failed, requesting redelivery");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            tracing::warn!(event_type, order_id, error = %e, "Webhook event not applied");
            StatusCode::OK
        }
    }
}

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let Some(secret) = state.gateways.stripe_webhook_secret() else {
        tracing::warn!("Stripe webhook received but no webhook secret is configured");
        return StatusCode::SERVICE_UNAVAILABLE;
    };

    let Some(sig_header) = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
    else {
        security_log!(WARN, "webhook_signature_missing", gateway = "stripe");
        return StatusCode::BAD_REQUEST;
    };

    if let Err(reason) = verify_webhook_signature(&body, sig_header, secret) {
        security_log!(WARN, "webhook_signature_invalid", gateway = "stripe", reason);
        return StatusCode::BAD_REQUEST;
    }

    let event: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse webhook JSON");
            return StatusCode::BAD_REQUEST;
        }
    };

    let event_type = event["type"].as_str().unwrap_or_default();
    let intent = &event["data"]["object"];
    let Some(order_id) = intent["metadata"]["order_id"].as_str() else {
        tracing::debug!(event_type, "Webhook event without order id, ignored");
        return StatusCode::OK;
    };
    tracing::info!(event_type, order_id, "Received Stripe webhook");

    match event_type {
        "payment_intent.succeeded" => {
            let Some(reference) = intent["id"].as_str() else {
                return StatusCode::BAD_REQUEST;
            };
            let payment_id = intent["latest_charge"].as_str().unwrap_or(reference);
            let result = state
                .lifecycle
                .confirm_from_webhook(order_id, reference, payment_id)
                .await
                .map(|_| ());
            ack(result, event_type, order_id)
        }
        "payment_intent.payment_failed" | "payment_intent.canceled" => {
            let result = state
                .lifecycle
                .cancel(order_id, CancelSource::PaymentFailed)
                .await
                .map(|_| ());
            ack(result, event_type, order_id)
        }
        _ => StatusCode::OK,
    }
}
