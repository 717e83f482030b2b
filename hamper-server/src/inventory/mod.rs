//! Inventory ledger
//!
//! Per-product stock counters mutated only through [`InventoryLedger::reserve`]
//! and [`InventoryLedger::restore`]. Each backend makes `reserve` a single
//! atomic check-and-decrement on one product, so stock never goes negative
//! and two callers can never both take the last unit.
//!
//! Multi-line orders use [`reserve_all`], which compensates (restores) the
//! lines it already took when a later line fails.

mod memory;

pub use memory::MemoryLedger;

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use thiserror::Error;

use crate::BoxError;

#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: i32,
        available: i32,
    },
    #[error("no inventory record for product {0}")]
    UnknownProduct(i64),
    #[error("quantity must be positive, got {0}")]
    InvalidQuantity(i32),
    #[error("inventory storage error: {0}")]
    Storage(#[source] BoxError),
}

impl From<InventoryError> for AppError {
    fn from(e: InventoryError) -> Self {
        match e {
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::new(ErrorCode::InsufficientStock)
                .with_detail("product_id", product_id)
                .with_detail("requested", requested)
                .with_detail("available", available),
            InventoryError::UnknownProduct(product_id) => {
                AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", product_id)
            }
            InventoryError::InvalidQuantity(q) => {
                AppError::new(ErrorCode::ValueOutOfRange).with_detail("quantity", q)
            }
            InventoryError::Storage(err) => {
                tracing::error!(error = %err, "Inventory storage error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

#[async_trait]
pub trait InventoryLedger: Send + Sync {
    /// Atomically take `quantity` units if at least that many are in stock
    async fn reserve(&self, product_id: i64, quantity: i32) -> Result<(), InventoryError>;

    /// Give `quantity` units back (no upper bound)
    async fn restore(&self, product_id: i64, quantity: i32) -> Result<(), InventoryError>;

    /// Current stock, `None` if the product has no inventory record
    async fn stock(&self, product_id: i64) -> Result<Option<i32>, InventoryError>;
}

/// Reserve every `(product_id, quantity)` line or none of them.
///
/// On the first failure, lines already reserved by this call are restored
/// before the error is returned.
pub async fn reserve_all(
    ledger: &dyn InventoryLedger,
    lines: &[(i64, i32)],
) -> Result<(), InventoryError> {
    for (idx, &(product_id, quantity)) in lines.iter().enumerate() {
        if let Err(e) = ledger.reserve(product_id, quantity).await {
            tracing::info!(
                product_id,
                quantity,
                error = %e,
                "Reservation failed, releasing {} earlier line(s)",
                idx
            );
            restore_all(ledger, &lines[..idx]).await;
            return Err(e);
        }
    }
    Ok(())
}

/// Restore every line, logging (not propagating) individual failures so one
/// bad line never blocks the others.
pub async fn restore_all(ledger: &dyn InventoryLedger, lines: &[(i64, i32)]) {
    for &(product_id, quantity) in lines {
        if let Err(e) = ledger.restore(product_id, quantity).await {
            tracing::error!(
                product_id,
                quantity,
                error = %e,
                "Failed to restore inventory, manual correction required"
            );
        }
    }
}
