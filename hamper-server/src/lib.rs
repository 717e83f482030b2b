//! Hamper Server - order placement and payment settlement for the gift-hamper
//! storefront
//!
//! # Modules
//!
//! - [`auth`] access/refresh tokens, RBAC gate, middleware, rate limiting
//! - [`inventory`] race-free stock ledger
//! - [`payment`] gateway adapters (Razorpay, Stripe) and currency routing
//! - [`orders`] placement orchestrator, order state machine, expiry worker
//! - [`store`] storage traits with in-memory and PostgreSQL backends
//! - [`api`] HTTP routes

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod events;
pub mod inventory;
pub mod logger;
pub mod orders;
pub mod payment;
pub mod state;
pub mod store;
pub mod util;

pub use config::Config;
pub use shared::error::{AppError, AppResult, ErrorCode};
pub use state::AppState;

/// Boxed infrastructure error (config loading, startup)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
