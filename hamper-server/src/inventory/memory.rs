//! In-memory ledger: one `DashMap` entry per product, mutated under the
//! entry's write lock.

use async_trait::async_trait;
use dashmap::DashMap;

use super::{InventoryError, InventoryLedger};

#[derive(Default)]
pub struct MemoryLedger {
    stock: DashMap<i64, i32>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog-side stock reset
    pub fn set_stock(&self, product_id: i64, stock: i32) {
        self.stock.insert(product_id, stock.max(0));
    }
}

#[async_trait]
impl InventoryLedger for MemoryLedger {
    async fn reserve(&self, product_id: i64, quantity: i32) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        let mut entry = self
            .stock
            .get_mut(&product_id)
            .ok_or(InventoryError::UnknownProduct(product_id))?;
        if *entry < quantity {
            return Err(InventoryError::InsufficientStock {
                product_id,
                requested: quantity,
                available: *entry,
            });
        }
        *entry -= quantity;
        Ok(())
    }

    async fn restore(&self, product_id: i64, quantity: i32) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        let mut entry = self
            .stock
            .get_mut(&product_id)
            .ok_or(InventoryError::UnknownProduct(product_id))?;
        *entry = entry.saturating_add(quantity);
        Ok(())
    }

    async fn stock(&self, product_id: i64) -> Result<Option<i32>, InventoryError> {
        Ok(self.stock.get(&product_id).map(|s| *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reserve_exact_stock() {
        let ledger = MemoryLedger::new();
        ledger.set_stock(1, 3);
        ledger.reserve(1, 3).await.unwrap();
        assert_eq!(ledger.stock(1).await.unwrap(), Some(0));
        assert!(matches!(
            ledger.reserve(1, 1).await,
            Err(InventoryError::InsufficientStock { available: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_non_positive_quantity_rejected() {
        let ledger = MemoryLedger::new();
        ledger.set_stock(1, 3);
        assert!(matches!(
            ledger.reserve(1, 0).await,
            Err(InventoryError::InvalidQuantity(0))
        ));
        assert!(matches!(
            ledger.restore(1, -2).await,
            Err(InventoryError::InvalidQuantity(-2))
        ));
        assert_eq!(ledger.stock(1).await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_restore_adds_back() {
        let ledger = MemoryLedger::new();
        ledger.set_stock(1, 0);
        ledger.restore(1, 4).await.unwrap();
        assert_eq!(ledger.stock(1).await.unwrap(), Some(4));
        assert_eq!(ledger.stock(99).await.unwrap(), None);
    }
}
