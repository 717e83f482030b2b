//! Application state

use std::sync::Arc;
use std::time::Duration;

use crate::BoxError;
use crate::auth::{RateLimiter, SessionService, TokenService};
use crate::config::Config;
use crate::db::PgStore;
use crate::events::{EventBus, run_notifier};
use crate::inventory::{InventoryLedger, MemoryLedger};
use crate::orders::{ExpiryWorker, OrderLifecycle, OrderService};
use crate::payment::GatewayRegistry;
use crate::store::{AccountStore, MemoryStore, OrderStore, ProductCatalog, RefreshTokenStore};

/// Storage implementations the services run on
#[derive(Clone)]
pub struct Backends {
    pub catalog: Arc<dyn ProductCatalog>,
    pub orders: Arc<dyn OrderStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub ledger: Arc<dyn InventoryLedger>,
}

impl Backends {
    pub fn postgres(store: PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            catalog: store.clone(),
            orders: store.clone(),
            accounts: store.clone(),
            refresh_tokens: store.clone(),
            ledger: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>, ledger: Arc<MemoryLedger>) -> Self {
        Self {
            catalog: store.clone(),
            orders: store.clone(),
            accounts: store.clone(),
            refresh_tokens: store,
            ledger,
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Login, refresh rotation and token verification
    pub sessions: SessionService,
    /// Account lookups for admin permission checks
    pub accounts: Arc<dyn AccountStore>,
    /// Order placement
    pub orders: OrderService,
    /// Transitions after placement
    pub lifecycle: OrderLifecycle,
    pub gateways: Arc<GatewayRegistry>,
    pub events: EventBus,
    /// Rate limiter for login/refresh routes
    pub rate_limiter: RateLimiter,
    order_store: Arc<dyn OrderStore>,
}

impl AppState {
    pub fn new(config: Config, backends: Backends, gateways: GatewayRegistry) -> Self {
        let gateways = Arc::new(gateways);
        let events = EventBus::new();
        let sessions = SessionService::new(
            TokenService::from_config(&config),
            backends.accounts.clone(),
            backends.refresh_tokens.clone(),
        );
        let lifecycle = OrderLifecycle::new(
            backends.orders.clone(),
            backends.ledger.clone(),
            gateways.clone(),
            events.clone(),
        );
        let orders = OrderService::new(
            backends.catalog,
            backends.orders.clone(),
            backends.ledger,
            gateways.clone(),
            lifecycle.clone(),
            events.clone(),
            config.create_intent_attempts,
        );

        Self {
            config: Arc::new(config),
            sessions,
            accounts: backends.accounts,
            orders,
            lifecycle,
            gateways,
            events,
            rate_limiter: RateLimiter::new(),
            order_store: backends.orders,
        }
    }

    /// PostgreSQL-backed state with gateways built from config
    pub async fn connect(config: Config) -> Result<Self, BoxError> {
        let store = PgStore::connect(&config.database_url).await?;
        let gateways = GatewayRegistry::from_config(&config)?;
        Ok(Self::new(config, Backends::postgres(store), gateways))
    }

    pub fn expiry_worker(&self) -> ExpiryWorker {
        let ttl = Duration::from_secs(self.config.pending_order_ttl_minutes.max(1) as u64 * 60);
        ExpiryWorker::new(
            self.order_store.clone(),
            self.lifecycle.clone(),
            ttl,
            Duration::from_secs(60),
        )
    }

    /// Notification consumer, pending-order expiry and rate limiter cleanup
    pub fn spawn_background_tasks(&self) {
        tokio::spawn(run_notifier(self.events.subscribe()));
        tokio::spawn(self.expiry_worker().run());

        // Periodic rate limiter cleanup (every 5 minutes)
        let rate_limiter = self.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                rate_limiter.cleanup().await;
            }
        });

        // Expired refresh token records (hourly)
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match sessions.purge_expired_tokens().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!(purged, "Purged expired refresh tokens"),
                    Err(e) => tracing::warn!(error = %e, "Refresh token purge failed"),
                }
            }
        });
    }
}
