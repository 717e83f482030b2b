//! Shared types for the hamper storefront
//!
//! Common types used by the server and its clients: the unified error
//! system, domain models and request/response payloads, and id helpers.

pub mod error;
pub mod models;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCode};
