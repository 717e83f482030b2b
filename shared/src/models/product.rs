//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Product entity (owned by the catalog, read-only here)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// Unit price in currency unit
    pub price: Decimal,
    /// ISO-4217 code, upper case
    pub currency: String,
    pub is_active: bool,
}

/// Per-product stock counter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct InventoryRecord {
    pub product_id: i64,
    pub stock: i32,
}
