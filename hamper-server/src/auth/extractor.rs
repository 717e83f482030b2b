//! Principal extractors
//!
//! The auth middleware verifies the token once and stores the principal in
//! request extensions; handlers pick it up through these extractors.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use shared::error::AppError;
use shared::models::{Admin, TokenPayload};

/// Verified end user (inserted by [`super::require_user`])
#[derive(Debug, Clone)]
pub struct AuthUser(pub TokenPayload);

/// Verified admin with loaded permissions (inserted by [`super::require_admin`])
#[derive(Debug, Clone)]
pub struct AuthAdmin(pub Admin);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(AppError::not_authenticated)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AuthAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthAdmin>()
            .cloned()
            .ok_or_else(AppError::not_authenticated)
    }
}
