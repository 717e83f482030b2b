use async_trait::async_trait;
use shared::models::{Admin, Permission, User};

use super::PgStore;
use crate::store::{AccountStore, StoreResult, StoredAccount};

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    name: String,
    password_hash: String,
    is_active: bool,
}

#[derive(sqlx::FromRow)]
struct AdminRow {
    id: i64,
    username: String,
    password_hash: String,
    permissions: Vec<String>,
    is_active: bool,
}

impl UserRow {
    fn into_stored(self) -> StoredAccount<User> {
        StoredAccount {
            account: User {
                id: self.id,
                email: self.email,
                name: self.name,
                is_active: self.is_active,
            },
            password_hash: self.password_hash,
        }
    }
}

impl AdminRow {
    fn into_stored(self) -> StoredAccount<Admin> {
        // Unknown permission strings grant nothing
        let permissions = self
            .permissions
            .iter()
            .filter_map(|p| Permission::from_db(p))
            .collect();
        StoredAccount {
            account: Admin {
                id: self.id,
                username: self.username,
                permissions,
                is_active: self.is_active,
            },
            password_hash: self.password_hash,
        }
    }
}

const USER_COLUMNS: &str = "id, email, name, password_hash, is_active";
const ADMIN_COLUMNS: &str = "id, username, password_hash, permissions, is_active";

#[async_trait]
impl AccountStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredAccount<User>>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserRow::into_stored))
    }

    async fn find_admin_by_username(
        &self,
        username: &str,
    ) -> StoreResult<Option<StoredAccount<Admin>>> {
        let row: Option<AdminRow> = sqlx::query_as(&format!(
            "SELECT {ADMIN_COLUMNS} FROM admins WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(AdminRow::into_stored))
    }

    async fn get_user(&self, id: i64) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.into_stored().account))
    }

    async fn get_admin(&self, id: i64) -> StoreResult<Option<Admin>> {
        let row: Option<AdminRow> =
            sqlx::query_as(&format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| r.into_stored().account))
    }
}
