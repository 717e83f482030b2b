//! Inventory ledger on the `inventory` table
//!
//! `reserve` is a single conditional UPDATE, so the row lock taken by
//! PostgreSQL makes the check and the decrement one atomic step.

use async_trait::async_trait;

use super::PgStore;
use crate::inventory::{InventoryError, InventoryLedger};

fn storage(e: sqlx::Error) -> InventoryError {
    InventoryError::Storage(Box::new(e))
}

#[async_trait]
impl InventoryLedger for PgStore {
    async fn reserve(&self, product_id: i64, quantity: i32) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        let updated = sqlx::query(
            "UPDATE inventory SET stock = stock - $1 WHERE product_id = $2 AND stock >= $1",
        )
        .bind(quantity)
        .bind(product_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?
        .rows_affected();
        if updated == 1 {
            return Ok(());
        }

        // Nothing updated: tell a short row from a missing one
        match self.stock(product_id).await? {
            Some(available) => Err(InventoryError::InsufficientStock {
                product_id,
                requested: quantity,
                available,
            }),
            None => Err(InventoryError::UnknownProduct(product_id)),
        }
    }

    async fn restore(&self, product_id: i64, quantity: i32) -> Result<(), InventoryError> {
        if quantity <= 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }
        let updated = sqlx::query("UPDATE inventory SET stock = stock + $1 WHERE product_id = $2")
            .bind(quantity)
            .bind(product_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?
            .rows_affected();
        if updated == 0 {
            return Err(InventoryError::UnknownProduct(product_id));
        }
        Ok(())
    }

    async fn stock(&self, product_id: i64) -> Result<Option<i32>, InventoryError> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT stock FROM inventory WHERE product_id = $1")
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        Ok(row.map(|r| r.0))
    }
}
