use async_trait::async_trait;
use rust_decimal::Decimal;
use shared::models::Product;

use super::PgStore;
use crate::store::{ProductCatalog, StoreResult};

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: Decimal,
    currency: String,
    is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            id: r.id,
            name: r.name,
            price: r.price,
            currency: r.currency,
            is_active: r.is_active,
        }
    }
}

#[async_trait]
impl ProductCatalog for PgStore {
    async fn get_products(&self, ids: &[i64]) -> StoreResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(
            "SELECT id, name, price, currency, is_active FROM products WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }
}
