//! Domain models
//!
//! Shared between hamper-server and its clients (via API).
//! IDs are `i64` snowflakes except orders, which carry a human-traceable
//! string id. Timestamps are Unix milliseconds.

pub mod auth;
pub mod order;
pub mod payment;
pub mod product;

// Re-exports
pub use auth::*;
pub use order::*;
pub use payment::*;
pub use product::*;
