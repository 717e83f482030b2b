//! Order placement and lifecycle

pub mod error;
pub mod expiry;
pub mod lifecycle;
pub mod locks;
pub mod orchestrator;

pub use error::{OrderError, OrderResult};
pub use expiry::ExpiryWorker;
pub use lifecycle::{CancelSource, OrderLifecycle};
pub use locks::OrderLocks;
pub use orchestrator::OrderService;
