//! Principal, token and admin models

use serde::{Deserialize, Serialize};

/// Principal role carried in every token
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Admin permission
///
/// `SuperAdmin` satisfies every requirement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    SuperAdmin,
    ProductManager,
    OrderManager,
}

impl Permission {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "SUPER_ADMIN" => Some(Self::SuperAdmin),
            "PRODUCT_MANAGER" => Some(Self::ProductManager),
            "ORDER_MANAGER" => Some(Self::OrderManager),
            _ => None,
        }
    }

    pub fn as_db(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "SUPER_ADMIN",
            Self::ProductManager => "PRODUCT_MANAGER",
            Self::OrderManager => "ORDER_MANAGER",
        }
    }
}

/// Verified token contents
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPayload {
    pub principal_id: i64,
    pub role: Role,
    /// Unix seconds
    pub expires_at: i64,
    /// Unique token id (`jti`)
    pub token_id: String,
}

/// End-user account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub is_active: bool,
}

/// Back-office account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub permissions: Vec<Permission>,
    pub is_active: bool,
}

impl Admin {
    /// True when the admin holds any of `required` (or is a super admin).
    /// An empty requirement list admits every admin.
    pub fn satisfies(&self, required: &[Permission]) -> bool {
        if required.is_empty() || self.permissions.contains(&Permission::SuperAdmin) {
            return true;
        }
        required.iter().any(|p| self.permissions.contains(p))
    }
}

/// `POST /api/auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserLoginRequest {
    pub email: String,
    pub password: String,
}

/// `POST /api/admin/auth/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

/// `POST /api/auth/refresh` and `/api/auth/logout`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Access + refresh token pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
}
