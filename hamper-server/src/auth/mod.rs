//! Authentication and authorization
//!
//! - [`token`] access/refresh JWTs with separate secrets
//! - [`rbac`] admin permission gate
//! - [`session`] login, refresh rotation, logout
//! - [`middleware`] / [`extractor`] axum integration
//! - [`rate_limit`] per-IP limits for credential endpoints

pub mod extractor;
pub mod middleware;
pub mod rate_limit;
pub mod rbac;
pub mod session;
pub mod token;

pub use extractor::{AuthAdmin, AuthUser};
pub use middleware::{require_admin, require_user};
pub use rate_limit::RateLimiter;
pub use rbac::{authorize_admin, check_admin};
pub use session::SessionService;
pub use token::{AuthError, Claims, IssuedTokens, TokenClass, TokenService};
