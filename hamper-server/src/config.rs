//! Server configuration

use crate::BoxError;

/// Settings for one payment gateway
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    /// Operator switch (`*_ENABLED`)
    pub enabled: bool,
    /// Public key id (Razorpay only)
    pub key_id: Option<String>,
    /// API secret; `None` means the gateway is unconfigured
    pub secret: Option<String>,
    /// Webhook signing secret (Stripe only)
    pub webhook_secret: Option<String>,
    pub base_url: String,
    /// ISO-4217 codes routed to this gateway (upper case)
    pub currencies: Vec<String>,
}

impl GatewayConfig {
    pub fn is_configured(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Hamper server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL
    pub database_url: String,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    /// HS256 secret for access tokens
    pub jwt_access_secret: String,
    /// HS256 secret for refresh tokens (must differ from the access secret)
    pub jwt_refresh_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    pub razorpay: GatewayConfig,
    pub stripe: GatewayConfig,
    /// Per-call timeout for gateway HTTP requests
    pub gateway_timeout_secs: u64,
    /// How many times `create_intent` is attempted before giving up
    pub create_intent_attempts: u32,
    /// Unpaid orders older than this are cancelled by the expiry worker
    pub pending_order_ttl_minutes: i64,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Require a secret env var: must be set and non-empty in non-development environments.
    fn require_secret(name: &str, environment: &str) -> Result<String, BoxError> {
        let val = match std::env::var(name) {
            Ok(v) => v,
            Err(_) => {
                if environment != "development" {
                    return Err(format!("{name} must be set in {environment} environment").into());
                }
                format!("dev-{name}-not-for-production")
            }
        };
        if val.is_empty() && environment != "development" {
            return Err(format!("{name} must not be empty in {environment} environment").into());
        }
        Ok(val)
    }

    fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|s| !s.is_empty())
    }

    fn currencies(name: &str, default: &str) -> Vec<String> {
        std::env::var(name)
            .unwrap_or_else(|_| default.into())
            .split(',')
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: Self::parse_or("HTTP_PORT", 8080),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: Self::parse_or("LOG_JSON", false),
            log_dir: Self::optional("LOG_DIR"),
            jwt_access_secret: Self::require_secret("JWT_ACCESS_SECRET", &environment)?,
            jwt_refresh_secret: Self::require_secret("JWT_REFRESH_SECRET", &environment)?,
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "hamper-server".into()),
            access_token_ttl_minutes: Self::parse_or("ACCESS_TOKEN_TTL_MINUTES", 15),
            refresh_token_ttl_days: Self::parse_or("REFRESH_TOKEN_TTL_DAYS", 7),
            razorpay: GatewayConfig {
                enabled: Self::parse_or("RAZORPAY_ENABLED", true),
                key_id: Self::optional("RAZORPAY_KEY_ID"),
                secret: Self::optional("RAZORPAY_KEY_SECRET"),
                webhook_secret: None,
                base_url: std::env::var("RAZORPAY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.razorpay.com".into()),
                currencies: Self::currencies("RAZORPAY_CURRENCIES", "INR"),
            },
            stripe: GatewayConfig {
                enabled: Self::parse_or("STRIPE_ENABLED", true),
                key_id: None,
                secret: Self::optional("STRIPE_SECRET_KEY"),
                webhook_secret: Self::optional("STRIPE_WEBHOOK_SECRET"),
                base_url: std::env::var("STRIPE_BASE_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com".into()),
                currencies: Self::currencies("STRIPE_CURRENCIES", "USD,EUR,GBP"),
            },
            gateway_timeout_secs: Self::parse_or("GATEWAY_TIMEOUT_SECS", 10),
            create_intent_attempts: Self::parse_or("CREATE_INTENT_ATTEMPTS", 2u32).max(1),
            pending_order_ttl_minutes: Self::parse_or("PENDING_ORDER_TTL_MINUTES", 30),
            request_timeout_secs: Self::parse_or("REQUEST_TIMEOUT_SECS", 30),
            environment,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks that `from_env` cannot express per variable
    pub fn validate(&self) -> Result<(), BoxError> {
        if self.jwt_access_secret == self.jwt_refresh_secret {
            return Err("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ".into());
        }
        if self.environment != "development"
            && (self.jwt_access_secret.len() < 32 || self.jwt_refresh_secret.len() < 32)
        {
            return Err("JWT secrets must be at least 32 characters long".into());
        }
        if self.access_token_ttl_minutes <= 0 || self.refresh_token_ttl_days <= 0 {
            return Err("token lifetimes must be positive".into());
        }
        if let Some(c) = self
            .razorpay
            .currencies
            .iter()
            .find(|c| self.stripe.currencies.contains(c))
        {
            return Err(format!("currency {c} is routed to more than one gateway").into());
        }
        Ok(())
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Config {
    /// Development defaults with both gateways unconfigured, for tests and
    /// local tooling that never read the environment
    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            http_port: 0,
            environment: "development".into(),
            log_level: "info".into(),
            log_json: false,
            log_dir: None,
            jwt_access_secret: "test-access-secret".into(),
            jwt_refresh_secret: "test-refresh-secret".into(),
            jwt_issuer: "hamper-server".into(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            razorpay: GatewayConfig {
                enabled: true,
                currencies: vec!["INR".into()],
                base_url: "http://127.0.0.1:9".into(),
                ..Default::default()
            },
            stripe: GatewayConfig {
                enabled: true,
                currencies: vec!["USD".into()],
                base_url: "http://127.0.0.1:9".into(),
                ..Default::default()
            },
            gateway_timeout_secs: 2,
            create_intent_attempts: 2,
            pending_order_ttl_minutes: 30,
            request_timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_secrets_rejected() {
        let mut config = Config::for_tests();
        config.jwt_refresh_secret = config.jwt_access_secret.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlapping_currency_routes_rejected() {
        let mut config = Config::for_tests();
        config.stripe.currencies.push("INR".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_short_secrets_rejected_outside_development() {
        let mut config = Config::for_tests();
        config.environment = "production".into();
        assert!(config.validate().is_err());
        config.jwt_access_secret = "a".repeat(32);
        config.jwt_refresh_secret = "b".repeat(32);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gateway_configured_requires_secret() {
        let mut gw = GatewayConfig::default();
        assert!(!gw.is_configured());
        gw.secret = Some(String::new());
        assert!(!gw.is_configured());
        gw.secret = Some("sk_test".into());
        assert!(gw.is_configured());
    }
}
