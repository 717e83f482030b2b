//! Configuration-driven gateway selection
//!
//! One slot per gateway family. A slot without a secret is *unconfigured*;
//! a configured slot can be switched off at runtime (*disabled*). New
//! payments need a configured and enabled gateway; settling existing
//! payments (verify, refund) only needs it configured.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use shared::models::{GatewayKind, GatewayStatus};

use super::{Gateway, PaymentError, RazorpayGateway, StripeGateway};
use crate::BoxError;
use crate::config::Config;

#[derive(Debug)]
pub struct GatewaySlot {
    kind: GatewayKind,
    gateway: Option<Gateway>,
    enabled: AtomicBool,
    currencies: Vec<String>,
}

impl GatewaySlot {
    pub fn new(
        kind: GatewayKind,
        gateway: Option<Gateway>,
        enabled: bool,
        currencies: Vec<String>,
    ) -> Self {
        Self {
            kind,
            gateway,
            enabled: AtomicBool::new(enabled),
            currencies: currencies
                .into_iter()
                .map(|c| c.to_ascii_uppercase())
                .collect(),
        }
    }

    fn status(&self) -> GatewayStatus {
        GatewayStatus {
            name: self.kind,
            configured: self.gateway.is_some(),
            enabled: self.enabled.load(Ordering::Acquire),
            currencies: self.currencies.clone(),
        }
    }
}

#[derive(Debug)]
pub struct GatewayRegistry {
    slots: Vec<GatewaySlot>,
    stripe_webhook_secret: Option<String>,
}

impl GatewayRegistry {
    pub fn new(slots: Vec<GatewaySlot>, stripe_webhook_secret: Option<String>) -> Self {
        Self {
            slots,
            stripe_webhook_secret,
        }
    }

    /// Build both gateways from config, sharing one HTTP client with a
    /// bounded per-request timeout
    pub fn from_config(config: &Config) -> Result<Self, BoxError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.gateway_timeout_secs))
            .connect_timeout(Duration::from_secs(config.gateway_timeout_secs.min(5)))
            .build()?;

        let razorpay = config.razorpay.secret.as_ref().filter(|s| !s.is_empty()).map(|secret| {
            Gateway::Razorpay(RazorpayGateway::new(
                client.clone(),
                config.razorpay.base_url.clone(),
                config.razorpay.key_id.clone().unwrap_or_default(),
                secret.clone(),
            ))
        });
        let stripe = config.stripe.secret.as_ref().filter(|s| !s.is_empty()).map(|secret| {
            Gateway::Stripe(StripeGateway::new(
                client.clone(),
                config.stripe.base_url.clone(),
                secret.clone(),
            ))
        });

        for (kind, gw, enabled) in [
            (GatewayKind::Razorpay, razorpay.is_some(), config.razorpay.enabled),
            (GatewayKind::Stripe, stripe.is_some(), config.stripe.enabled),
        ] {
            tracing::info!(gateway = %kind, configured = gw, enabled, "Payment gateway");
        }

        Ok(Self::new(
            vec![
                GatewaySlot::new(
                    GatewayKind::Razorpay,
                    razorpay,
                    config.razorpay.enabled,
                    config.razorpay.currencies.clone(),
                ),
                GatewaySlot::new(
                    GatewayKind::Stripe,
                    stripe,
                    config.stripe.enabled,
                    config.stripe.currencies.clone(),
                ),
            ],
            config.stripe.webhook_secret.clone(),
        ))
    }

    fn slot(&self, kind: GatewayKind) -> Option<&GatewaySlot> {
        self.slots.iter().find(|s| s.kind == kind)
    }

    /// Gateway for a new payment in `currency`. Fails fast, before any
    /// inventory is touched, when the route is missing, unconfigured or
    /// switched off.
    pub fn route(&self, currency: &str) -> Result<&Gateway, PaymentError> {
        let currency = currency.to_ascii_uppercase();
        let slot = self
            .slots
            .iter()
            .find(|s| s.currencies.contains(&currency))
            .ok_or(PaymentError::NoRoute(currency))?;
        let gateway = slot
            .gateway
            .as_ref()
            .ok_or(PaymentError::NotConfigured(slot.kind))?;
        if !slot.enabled.load(Ordering::Acquire) {
            return Err(PaymentError::Disabled(slot.kind));
        }
        Ok(gateway)
    }

    /// Gateway for verifying or refunding an existing payment
    pub fn for_settlement(&self, kind: GatewayKind) -> Result<&Gateway, PaymentError> {
        self.slot(kind)
            .and_then(|s| s.gateway.as_ref())
            .ok_or(PaymentError::NotConfigured(kind))
    }

    pub fn set_enabled(&self, kind: GatewayKind, enabled: bool) -> Result<GatewayStatus, PaymentError> {
        let slot = self.slot(kind).ok_or(PaymentError::NotConfigured(kind))?;
        slot.enabled.store(enabled, Ordering::Release);
        tracing::info!(gateway = %kind, enabled, "Payment gateway toggled");
        Ok(slot.status())
    }

    pub fn statuses(&self) -> Vec<GatewayStatus> {
        self.slots.iter().map(GatewaySlot::status).collect()
    }

    pub fn stripe_webhook_secret(&self) -> Option<&str> {
        self.stripe_webhook_secret.as_deref()
    }
}
