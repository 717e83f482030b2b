//! Storage traits
//!
//! Every component talks to storage through these traits so the same
//! orchestration runs on PostgreSQL ([`crate::db::PgStore`]) and in memory
//! ([`MemoryStore`]). The inventory counter has its own trait in
//! [`crate::inventory`].

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use shared::error::{AppError, ErrorCode};
use shared::models::{Admin, Order, Product, Role, User};
use thiserror::Error;

use crate::BoxError;

/// Storage-layer error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    /// Optimistic version check failed
    #[error("concurrent modification of {0}")]
    Conflict(String),
    #[error("duplicate key: {0}")]
    Duplicate(String),
    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::new(ErrorCode::NotFound),
            StoreError::Conflict(id) => AppError::new(ErrorCode::ConcurrentModification)
                .with_detail("resource", id),
            StoreError::Duplicate(key) => {
                AppError::with_message(ErrorCode::InvalidRequest, format!("Duplicate {key}"))
            }
            StoreError::Backend(err) => {
                tracing::error!(error = %err, "Storage backend error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

/// Account plus its stored password hash (never leaves the server)
#[derive(Debug, Clone)]
pub struct StoredAccount<T> {
    pub account: T,
    pub password_hash: String,
}

/// Persisted refresh token (`jti`) state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token_id: String,
    pub principal_id: i64,
    pub role: Role,
    /// Unix milliseconds
    pub expires_at: i64,
    pub revoked: bool,
}

/// Result of consuming a refresh token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Token was live and is now revoked
    Consumed(RefreshTokenRecord),
    /// Token had already been consumed or revoked
    Reused(RefreshTokenRecord),
    Unknown,
}

/// Read-only product lookup (the catalog itself is managed elsewhere)
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// Products for the given ids; unknown ids are simply absent
    async fn get_products(&self, ids: &[i64]) -> StoreResult<Vec<Product>>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Insert order, items and payment as one atomic unit
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>>;

    /// Persist status and payment fields of `order` if the stored version is
    /// still `expected_version`; the stored version becomes `order.version`.
    /// Fails with [`StoreError::Conflict`] otherwise. Items never change.
    async fn update_order(&self, order: &Order, expected_version: i64) -> StoreResult<()>;

    /// Ids of `Pending` orders created before `created_before` (Unix ms)
    async fn list_stale_pending(&self, created_before: i64, limit: i64)
    -> StoreResult<Vec<String>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredAccount<User>>>;
    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> StoreResult<Option<StoredAccount<Admin>>>;
    async fn get_user(&self, id: i64) -> StoreResult<Option<User>>;
    async fn get_admin(&self, id: i64) -> StoreResult<Option<Admin>>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> StoreResult<()>;

    /// Atomically revoke a live token, reporting what was found
    async fn consume(&self, token_id: &str) -> StoreResult<ConsumeOutcome>;

    /// Revoke every live token of a principal; returns how many were revoked
    async fn revoke_all(&self, principal_id: i64, role: Role) -> StoreResult<u64>;

    /// Delete records that expired before `now` (Unix ms), revoked or not.
    /// Unexpired revoked records stay so replays are still recognised.
    async fn purge_expired(&self, now: i64) -> StoreResult<u64>;
}
