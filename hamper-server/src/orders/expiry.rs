//! Background cancellation of unpaid orders

use std::sync::Arc;
use std::time::Duration;

use shared::models::OrderStatus;
use shared::util::now_millis;

use super::lifecycle::{CancelSource, OrderLifecycle};
use crate::store::OrderStore;

/// Orders examined per sweep
const SWEEP_BATCH: i64 = 100;

pub struct ExpiryWorker {
    orders: Arc<dyn OrderStore>,
    lifecycle: OrderLifecycle,
    ttl: Duration,
    interval: Duration,
}

impl ExpiryWorker {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        lifecycle: OrderLifecycle,
        ttl: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            orders,
            lifecycle,
            ttl,
            interval,
        }
    }

    /// Cancel one batch of stale `Pending` orders; returns how many were
    /// cancelled
    pub async fn sweep(&self) -> usize {
        let cutoff = now_millis() - self.ttl.as_millis() as i64;
        let ids = match self.orders.list_stale_pending(cutoff, SWEEP_BATCH).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list stale pending orders");
                return 0;
            }
        };

        let mut cancelled = 0;
        for id in ids {
            match self.lifecycle.cancel(&id, CancelSource::Expired).await {
                Ok(order) if order.status == OrderStatus::Cancelled => cancelled += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(order_id = %id, error = %e, "Failed to expire order"),
            }
        }
        self.lifecycle.locks().prune();
        if cancelled > 0 {
            tracing::info!(cancelled, "Expired unpaid orders");
        }
        cancelled
    }

    pub async fn run(self) {
        tracing::info!(
            ttl_secs = self.ttl.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Pending order expiry worker started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sweep().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::inventory::{InventoryLedger, MemoryLedger};
    use crate::orders::lifecycle::tests::{pending_order, registry};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_sweep_cancels_only_stale_orders() {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set_stock(1, 0);
        store.insert_order(&pending_order("HMP-OLD", 7, 1, 2)).await.unwrap();
        store.insert_order(&pending_order("HMP-NEW", 7, 1, 1)).await.unwrap();
        store.backdate_order("HMP-OLD", now_millis() - 31 * 60 * 1000);

        let lifecycle = OrderLifecycle::new(store.clone(), ledger.clone(), registry(), EventBus::new());
        let worker = ExpiryWorker::new(
            store.clone(),
            lifecycle,
            Duration::from_secs(30 * 60),
            Duration::from_secs(60),
        );

        assert_eq!(worker.sweep().await, 1);
        assert_eq!(ledger.stock(1).await.unwrap(), Some(2));

        let old = store.get_order("HMP-OLD").await.unwrap().unwrap();
        let new = store.get_order("HMP-NEW").await.unwrap().unwrap();
        assert_eq!(old.status, OrderStatus::Cancelled);
        assert_eq!(new.status, OrderStatus::Pending);

        // already cancelled orders are not picked up again
        assert_eq!(worker.sweep().await, 0);
        assert_eq!(ledger.stock(1).await.unwrap(), Some(2));
    }
}
