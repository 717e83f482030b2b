//! Access / refresh token service
//!
//! Both token classes are HS256 JWTs carrying the same principal claims,
//! but each class is signed with its own secret: a leaked access key cannot
//! mint refresh tokens and vice versa. Refresh tokens only ever mint new
//! pairs; they never authorize an action.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{Role, TokenPair, TokenPayload};
use thiserror::Error;

use crate::config::Config;

/// Which secret family a token belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenClass {
    Access,
    Refresh,
}

/// Claims stored in both token classes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal id
    pub sub: String,
    pub role: Role,
    pub token_type: TokenClass,
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
    pub iss: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("token expired")]
    Expired,
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("invalid token signature")]
    SignatureInvalid,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account disabled")]
    AccountDisabled,
    #[error("token generation failed: {0}")]
    Generation(String),
    #[error("auth backend error: {0}")]
    Backend(String),
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Missing => AppError::not_authenticated(),
            AuthError::Expired => AppError::token_expired(),
            AuthError::Malformed(_) => AppError::invalid_token("Malformed token"),
            AuthError::SignatureInvalid => AppError::new(ErrorCode::TokenSignatureInvalid),
            AuthError::Forbidden(msg) => AppError::forbidden(msg),
            AuthError::InvalidCredentials => AppError::invalid_credentials(),
            AuthError::AccountDisabled => AppError::new(ErrorCode::AccountDisabled),
            AuthError::Generation(msg) | AuthError::Backend(msg) => {
                tracing::error!(error = %msg, "Auth infrastructure error");
                AppError::new(ErrorCode::InternalError)
            }
        }
    }
}

impl From<crate::store::StoreError> for AuthError {
    fn from(e: crate::store::StoreError) -> Self {
        AuthError::Backend(e.to_string())
    }
}

/// Freshly minted pair plus what the refresh store must record
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub pair: TokenPair,
    pub refresh_id: String,
    /// Unix milliseconds
    pub refresh_expires_at: i64,
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

#[derive(Clone)]
pub struct TokenService {
    access: KeyPair,
    refresh: KeyPair,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("issuer", &self.issuer)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(
        access_secret: &str,
        refresh_secret: &str,
        issuer: impl Into<String>,
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access: KeyPair::from_secret(access_secret),
            refresh: KeyPair::from_secret(refresh_secret),
            issuer: issuer.into(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.jwt_access_secret,
            &config.jwt_refresh_secret,
            config.jwt_issuer.clone(),
            Duration::minutes(config.access_token_ttl_minutes),
            Duration::days(config.refresh_token_ttl_days),
        )
    }

    fn keys(&self, class: TokenClass) -> &KeyPair {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    fn ttl(&self, class: TokenClass) -> Duration {
        match class {
            TokenClass::Access => self.access_ttl,
            TokenClass::Refresh => self.refresh_ttl,
        }
    }

    fn sign(&self, principal_id: i64, role: Role, class: TokenClass) -> Result<(String, Claims), AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: principal_id.to_string(),
            role,
            token_type: class,
            jti: uuid::Uuid::new_v4().to_string(),
            exp: (now + self.ttl(class)).timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys(class).encoding)
            .map_err(|e| AuthError::Generation(e.to_string()))?;
        Ok((token, claims))
    }

    /// Mint an access token and a refresh token for a principal
    pub fn issue_tokens(&self, principal_id: i64, role: Role) -> Result<IssuedTokens, AuthError> {
        let (access_token, _) = self.sign(principal_id, role, TokenClass::Access)?;
        let (refresh_token, refresh) = self.sign(principal_id, role, TokenClass::Refresh)?;
        Ok(IssuedTokens {
            pair: TokenPair {
                access_token,
                refresh_token,
                token_type: "Bearer".to_string(),
                expires_in: self.access_ttl.num_seconds(),
            },
            refresh_id: refresh.jti,
            refresh_expires_at: refresh.exp * 1000,
        })
    }

    /// Verify a token against the secret of `class`
    pub fn verify(&self, token: &str, class: TokenClass) -> Result<TokenPayload, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss"]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.keys(class).decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                ErrorKind::InvalidSignature => AuthError::SignatureInvalid,
                _ => AuthError::Malformed(e.to_string()),
            },
        )?;
        let claims = data.claims;

        if claims.token_type != class {
            return Err(AuthError::Malformed("wrong token class".into()));
        }
        let principal_id = claims
            .sub
            .parse::<i64>()
            .map_err(|_| AuthError::Malformed("non-numeric subject".into()))?;

        Ok(TokenPayload {
            principal_id,
            role: claims.role,
            expires_at: claims.exp,
            token_id: claims.jti,
        })
    }

    /// Extract the token from an `Authorization: Bearer <token>` header value
    pub fn extract_from_header(header: &str) -> Option<&str> {
        header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
