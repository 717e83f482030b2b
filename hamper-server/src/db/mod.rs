//! PostgreSQL backend
//!
//! [`PgStore`] implements every storage trait plus the inventory ledger on
//! one connection pool. Schema lives in `migrations/`.

mod accounts;
mod inventory;
mod orders;
mod products;
mod refresh_tokens;

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::BoxError;
use crate::store::StoreError;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply pending migrations
    pub async fn connect(database_url: &str) -> Result<Self, BoxError> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Database connected, migrations applied");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e
            && db.is_unique_violation()
        {
            return StoreError::Duplicate(db.constraint().unwrap_or("unique").to_string());
        }
        if matches!(e, sqlx::Error::RowNotFound) {
            return StoreError::NotFound;
        }
        StoreError::Backend(Box::new(e))
    }
}

/// Row holds a value this build cannot interpret
fn corrupt(what: &str, value: &str) -> StoreError {
    StoreError::Backend(format!("unrecognised {what} '{value}' in database").into())
}
