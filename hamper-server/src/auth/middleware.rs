//! Authentication middleware
//!
//! Reads `Authorization: Bearer <token>`, verifies it as an access token and
//! stores the principal in request extensions.
//!
//! | Failure | Response |
//! |---------|----------|
//! | no / unparsable header | 401 NotAuthenticated |
//! | expired | 401 TokenExpired |
//! | malformed | 401 TokenInvalid |
//! | bad signature | 401 TokenSignatureInvalid |
//! | wrong role or missing permission | 403 |

use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use shared::error::AppError;
use shared::models::{Permission, Role};

use super::extractor::{AuthAdmin, AuthUser};
use super::rbac::authorize_admin;
use super::token::{AuthError, TokenClass, TokenService};
use crate::security_log;
use crate::state::AppState;

fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(TokenService::extract_from_header)
        .ok_or(AuthError::Missing)
}

fn log_rejection(err: &AuthError, req: &Request) {
    security_log!(
        WARN,
        "auth_failed",
        error = %err,
        method = %req.method(),
        path = %req.uri().path()
    );
}

/// Require an end-user access token
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let verified = bearer_token(req.headers())
        .and_then(|token| state.sessions.tokens().verify(token, TokenClass::Access));

    let payload = match verified {
        Ok(p) => p,
        Err(e) => {
            log_rejection(&e, &req);
            return Err(e.into());
        }
    };

    if payload.role != Role::User {
        security_log!(
            WARN,
            "user_role_required",
            principal_id = payload.principal_id,
            role = payload.role.as_str(),
            path = %req.uri().path()
        );
        return Err(AuthError::Forbidden("user role required".into()).into());
    }

    req.extensions_mut().insert(AuthUser(payload));
    Ok(next.run(req).await)
}

/// Require an admin access token holding any of `required`
///
/// # Usage
///
/// ```ignore
/// Router::new()
///     .route("/api/admin/orders/{id}/refund", post(refund))
///     .layer(middleware::from_fn_with_state(
///         state.clone(),
///         require_admin(&[Permission::OrderManager]),
///     ));
/// ```
pub fn require_admin(
    required: &'static [Permission],
) -> impl Fn(
    State<AppState>,
    Request,
    Next,
) -> Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>
+ Clone {
    move |State(state): State<AppState>, mut req: Request, next: Next| {
        Box::pin(async move {
            let authorized = match bearer_token(req.headers()) {
                Ok(token) => {
                    authorize_admin(state.sessions.tokens(), state.accounts.as_ref(), token, required)
                        .await
                }
                Err(e) => Err(e),
            };
            let admin = match authorized {
                Ok((_, admin)) => admin,
                // permission failures are logged by the gate itself
                Err(e @ AuthError::Forbidden(_)) => return Err(e.into()),
                Err(e) => {
                    log_rejection(&e, &req);
                    return Err(e.into());
                }
            };

            req.extensions_mut().insert(AuthAdmin(admin));
            Ok(next.run(req).await)
        })
    }
}
