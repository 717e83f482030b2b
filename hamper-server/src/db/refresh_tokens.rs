//! Refresh token (`jti`) storage

use async_trait::async_trait;
use shared::models::Role;
use shared::util::now_millis;

use super::{PgStore, corrupt};
use crate::store::{ConsumeOutcome, RefreshTokenRecord, RefreshTokenStore, StoreResult};

#[derive(sqlx::FromRow)]
struct RefreshTokenRow {
    id: String,
    principal_id: i64,
    role: String,
    expires_at: i64,
    revoked: bool,
}

impl RefreshTokenRow {
    fn into_record(self) -> StoreResult<RefreshTokenRecord> {
        Ok(RefreshTokenRecord {
            role: Role::parse(&self.role).ok_or_else(|| corrupt("role", &self.role))?,
            token_id: self.id,
            principal_id: self.principal_id,
            expires_at: self.expires_at,
            revoked: self.revoked,
        })
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO refresh_tokens (id, principal_id, role, expires_at, revoked, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&record.token_id)
        .bind(record.principal_id)
        .bind(record.role.as_str())
        .bind(record.expires_at)
        .bind(record.revoked)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn consume(&self, token_id: &str) -> StoreResult<ConsumeOutcome> {
        // Only one caller can flip `revoked`; everyone else sees it set
        let consumed: Option<RefreshTokenRow> = sqlx::query_as(
            "UPDATE refresh_tokens SET revoked = TRUE WHERE id = $1 AND NOT revoked
             RETURNING id, principal_id, role, expires_at, revoked",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(row) = consumed {
            return Ok(ConsumeOutcome::Consumed(row.into_record()?));
        }

        let existing: Option<RefreshTokenRow> = sqlx::query_as(
            "SELECT id, principal_id, role, expires_at, revoked FROM refresh_tokens WHERE id = $1",
        )
        .bind(token_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(match existing {
            Some(row) => ConsumeOutcome::Reused(row.into_record()?),
            None => ConsumeOutcome::Unknown,
        })
    }

    async fn revoke_all(&self, principal_id: i64, role: Role) -> StoreResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = TRUE
             WHERE principal_id = $1 AND role = $2 AND NOT revoked",
        )
        .bind(principal_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
