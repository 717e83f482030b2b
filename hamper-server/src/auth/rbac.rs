//! Admin authorization gate
//!
//! Pure check: verifies the access token, loads the admin record and tests
//! the permission intersection. Never mutates state.

use shared::models::{Admin, Permission, Role, TokenPayload};

use super::token::{AuthError, TokenClass, TokenService};
use crate::security_log;
use crate::store::AccountStore;

/// Verify `token` and require an active admin holding any of `required`
/// (`SUPER_ADMIN` satisfies everything).
pub async fn authorize_admin(
    tokens: &TokenService,
    accounts: &dyn AccountStore,
    token: &str,
    required: &[Permission],
) -> Result<(TokenPayload, Admin), AuthError> {
    let payload = tokens.verify(token, TokenClass::Access)?;
    let admin = check_admin(accounts, &payload, required).await?;
    Ok((payload, admin))
}

/// Permission check for an already verified principal
pub async fn check_admin(
    accounts: &dyn AccountStore,
    payload: &TokenPayload,
    required: &[Permission],
) -> Result<Admin, AuthError> {
    if payload.role != Role::Admin {
        security_log!(
            WARN,
            "admin_required",
            principal_id = payload.principal_id,
            role = payload.role.as_str()
        );
        return Err(AuthError::Forbidden("admin role required".into()));
    }

    let admin = match accounts.get_admin(payload.principal_id).await? {
        Some(a) if a.is_active => a,
        _ => {
            security_log!(
                WARN,
                "admin_unknown_or_disabled",
                principal_id = payload.principal_id
            );
            return Err(AuthError::Forbidden("admin account unavailable".into()));
        }
    };

    if !admin.satisfies(required) {
        let required: Vec<&str> = required.iter().map(Permission::as_db).collect();
        security_log!(
            WARN,
            "permission_denied",
            principal_id = admin.id,
            username = %admin.username,
            required = ?required
        );
        return Err(AuthError::Forbidden(format!(
            "requires one of: {}",
            required.join(", ")
        )));
    }

    Ok(admin)
}
