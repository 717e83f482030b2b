//! In-memory storage backend
//!
//! Same semantics as the PostgreSQL backend; per-record atomicity comes from
//! the per-shard write lock of `DashMap`. Used by tests and local runs.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use shared::models::{Admin, Order, OrderStatus, Permission, Product, Role, User};
use shared::util::snowflake_id;

use super::{
    AccountStore, ConsumeOutcome, OrderStore, ProductCatalog, RefreshTokenRecord,
    RefreshTokenStore, StoreError, StoreResult, StoredAccount,
};

#[derive(Default)]
pub struct MemoryStore {
    products: DashMap<i64, Product>,
    orders: DashMap<String, Order>,
    users: DashMap<i64, StoredAccount<User>>,
    admins: DashMap<i64, StoredAccount<Admin>>,
    refresh_tokens: DashMap<String, RefreshTokenRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_product(&self, name: &str, price: Decimal, currency: &str) -> Product {
        let product = Product {
            id: snowflake_id(),
            name: name.to_string(),
            price,
            currency: currency.to_ascii_uppercase(),
            is_active: true,
        };
        self.products.insert(product.id, product.clone());
        product
    }

    pub fn set_product_active(&self, id: i64, active: bool) {
        if let Some(mut p) = self.products.get_mut(&id) {
            p.is_active = active;
        }
    }

    pub fn add_user(&self, email: &str, name: &str, password_hash: String) -> User {
        let user = User {
            id: snowflake_id(),
            email: email.to_ascii_lowercase(),
            name: name.to_string(),
            is_active: true,
        };
        self.users.insert(
            user.id,
            StoredAccount {
                account: user.clone(),
                password_hash,
            },
        );
        user
    }

    pub fn add_admin(
        &self,
        username: &str,
        password_hash: String,
        permissions: &[Permission],
    ) -> Admin {
        let admin = Admin {
            id: snowflake_id(),
            username: username.to_string(),
            permissions: permissions.to_vec(),
            is_active: true,
        };
        self.admins.insert(
            admin.id,
            StoredAccount {
                account: admin.clone(),
                password_hash,
            },
        );
        admin
    }

    pub fn set_user_active(&self, id: i64, active: bool) {
        if let Some(mut u) = self.users.get_mut(&id) {
            u.account.is_active = active;
        }
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Rewrite an order's creation time (expiry tests)
    pub fn backdate_order(&self, id: &str, created_at: i64) {
        if let Some(mut o) = self.orders.get_mut(id) {
            o.created_at = created_at;
        }
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn get_products(&self, ids: &[i64]) -> StoreResult<Vec<Product>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.products.get(id).map(|p| p.clone()))
            .collect())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        match self.orders.entry(order.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(format!("order {}", order.id))),
            Entry::Vacant(v) => {
                v.insert(order.clone());
                Ok(())
            }
        }
    }

    async fn get_order(&self, id: &str) -> StoreResult<Option<Order>> {
        Ok(self.orders.get(id).map(|o| o.clone()))
    }

    async fn update_order(&self, order: &Order, expected_version: i64) -> StoreResult<()> {
        let mut stored = self.orders.get_mut(&order.id).ok_or(StoreError::NotFound)?;
        if stored.version != expected_version {
            return Err(StoreError::Conflict(order.id.clone()));
        }
        stored.status = order.status;
        stored.payment = order.payment.clone();
        stored.version = order.version;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn list_stale_pending(
        &self,
        created_before: i64,
        limit: i64,
    ) -> StoreResult<Vec<String>> {
        let mut stale: Vec<(i64, String)> = self
            .orders
            .iter()
            .filter(|o| o.status == OrderStatus::Pending && o.created_at < created_before)
            .map(|o| (o.created_at, o.id.clone()))
            .collect();
        stale.sort();
        Ok(stale
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, id)| id)
            .collect())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredAccount<User>>> {
        let email = email.to_ascii_lowercase();
        Ok(self
            .users
            .iter()
            .find(|u| u.account.email == email)
            .map(|u| u.clone()))
    }

    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> StoreResult<Option<StoredAccount<Admin>>> {
        Ok(self
            .admins
            .iter()
            .find(|a| a.account.username == username)
            .map(|a| a.clone()))
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.account.clone()))
    }

    async fn get_admin(&self, id: i64) -> StoreResult<Option<Admin>> {
        Ok(self.admins.get(&id).map(|a| a.account.clone()))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        match self.refresh_tokens.entry(record.token_id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate("refresh token".into())),
            Entry::Vacant(v) => {
                v.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn consume(&self, token_id: &str) -> StoreResult<ConsumeOutcome> {
        let Some(mut record) = self.refresh_tokens.get_mut(token_id) else {
            return Ok(ConsumeOutcome::Unknown);
        };
        if record.revoked {
            return Ok(ConsumeOutcome::Reused(record.clone()));
        }
        record.revoked = true;
        Ok(ConsumeOutcome::Consumed(record.clone()))
    }

    async fn revoke_all(&self, principal_id: i64, role: Role) -> StoreResult<u64> {
        let mut revoked = 0;
        for mut record in self.refresh_tokens.iter_mut() {
            if record.principal_id == principal_id && record.role == role && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn purge_expired(&self, now: i64) -> StoreResult<u64> {
        let before = self.refresh_tokens.len();
        self.refresh_tokens.retain(|_, record| record.expires_at >= now);
        Ok((before - self.refresh_tokens.len()) as u64)
    }
}
