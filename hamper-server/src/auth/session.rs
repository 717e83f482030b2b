//! Login, refresh-token rotation and logout

use std::sync::Arc;

use shared::models::{Role, TokenPair};
use shared::util::now_millis;

use super::token::{AuthError, TokenClass, TokenService};
use crate::security_log;
use crate::store::{AccountStore, ConsumeOutcome, RefreshTokenRecord, RefreshTokenStore};
use crate::util::{dummy_verify, verify_password};

#[derive(Clone)]
pub struct SessionService {
    tokens: TokenService,
    accounts: Arc<dyn AccountStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl SessionService {
    pub fn new(
        tokens: TokenService,
        accounts: Arc<dyn AccountStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
    ) -> Self {
        Self {
            tokens,
            accounts,
            refresh_tokens,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Issue a pair and record the refresh token id
    async fn open(&self, principal_id: i64, role: Role) -> Result<TokenPair, AuthError> {
        let issued = self.tokens.issue_tokens(principal_id, role)?;
        self.refresh_tokens
            .insert(&RefreshTokenRecord {
                token_id: issued.refresh_id,
                principal_id,
                role,
                expires_at: issued.refresh_expires_at,
                revoked: false,
            })
            .await?;
        Ok(issued.pair)
    }

    pub async fn login_user(&self, email: &str, password: &str) -> Result<TokenPair, AuthError> {
        let Some(stored) = self.accounts.find_user_by_email(email.trim()).await? else {
            dummy_verify(password);
            security_log!(WARN, "login_failed", kind = "user", reason = "unknown_account");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &stored.password_hash) {
            security_log!(WARN, "login_failed", kind = "user", principal_id = stored.account.id, reason = "bad_password");
            return Err(AuthError::InvalidCredentials);
        }
        if !stored.account.is_active {
            security_log!(WARN, "login_failed", kind = "user", principal_id = stored.account.id, reason = "disabled");
            return Err(AuthError::AccountDisabled);
        }
        tracing::info!(principal_id = stored.account.id, "User logged in");
        self.open(stored.account.id, Role::User).await
    }

    pub async fn login_admin(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let Some(stored) = self.accounts.find_admin_by_username(username.trim()).await? else {
            dummy_verify(password);
            security_log!(WARN, "login_failed", kind = "admin", reason = "unknown_account");
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &stored.password_hash) {
            security_log!(WARN, "login_failed", kind = "admin", principal_id = stored.account.id, reason = "bad_password");
            return Err(AuthError::InvalidCredentials);
        }
        if !stored.account.is_active {
            security_log!(WARN, "login_failed", kind = "admin", principal_id = stored.account.id, reason = "disabled");
            return Err(AuthError::AccountDisabled);
        }
        security_log!(INFO, "admin_login", principal_id = stored.account.id);
        self.open(stored.account.id, Role::Admin).await
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// consumed; presenting an already consumed token revokes every refresh
    /// token of that principal.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let payload = self.tokens.verify(refresh_token, TokenClass::Refresh)?;

        let record = match self.refresh_tokens.consume(&payload.token_id).await? {
            ConsumeOutcome::Consumed(record) => record,
            ConsumeOutcome::Reused(record) => {
                let revoked = self
                    .refresh_tokens
                    .revoke_all(record.principal_id, record.role)
                    .await?;
                security_log!(
                    ERROR,
                    "refresh_token_reuse",
                    principal_id = record.principal_id,
                    role = record.role.as_str(),
                    revoked
                );
                return Err(AuthError::Malformed("refresh token already used".into()));
            }
            ConsumeOutcome::Unknown => {
                security_log!(WARN, "refresh_token_unknown", principal_id = payload.principal_id);
                return Err(AuthError::Malformed("unknown refresh token".into()));
            }
        };

        if record.expires_at < now_millis() {
            return Err(AuthError::Expired);
        }

        // Account may have been disabled since the token was issued
        let active = match record.role {
            Role::User => self
                .accounts
                .get_user(record.principal_id)
                .await?
                .is_some_and(|u| u.is_active),
            Role::Admin => self
                .accounts
                .get_admin(record.principal_id)
                .await?
                .is_some_and(|a| a.is_active),
        };
        if !active {
            return Err(AuthError::AccountDisabled);
        }

        self.open(record.principal_id, record.role).await
    }

    /// Drop refresh token records past their expiry. An expired token fails
    /// verification before its record is consulted.
    pub async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        Ok(self.refresh_tokens.purge_expired(now_millis()).await?)
    }

    /// Revoke the presented refresh token. Unknown or already revoked tokens
    /// are accepted silently.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let payload = self.tokens.verify(refresh_token, TokenClass::Refresh)?;
        self.refresh_tokens.consume(&payload.token_id).await?;
        tracing::info!(principal_id = payload.principal_id, "Logged out");
        Ok(())
    }
}
