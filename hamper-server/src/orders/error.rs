//! Order-level errors

use rust_decimal::Decimal;
use shared::error::{AppError, ErrorCode};
use shared::models::{OrderStatus, PaymentStatus};
use thiserror::Error;

use crate::inventory::InventoryError;
use crate::payment::PaymentError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("{0}")]
    Validation(String),
    #[error("order has no items")]
    Empty,
    #[error("unknown or inactive product {0}")]
    UnknownProduct(i64),
    #[error("cart mixes currencies")]
    CurrencyMismatch,
    #[error("total mismatch: client sent {expected}, prices add up to {computed}")]
    TotalMismatch { expected: Decimal, computed: Decimal },
    #[error("order {0} not found")]
    NotFound(String),
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("payment is {0:?}, not PAID")]
    PaymentNotPaid(PaymentStatus),
    #[error("payment signature rejected")]
    SignatureInvalid,
    #[error("refund for order {0} is still being settled")]
    RefundInFlight(String),
    #[error("refund of {requested} exceeds paid amount {paid}")]
    RefundExceedsAmount { requested: Decimal, paid: Decimal },
    #[error(transparent)]
    Inventory(#[from] InventoryError),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type OrderResult<T> = Result<T, OrderError>;

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Validation(msg) => AppError::validation(msg),
            OrderError::Empty => AppError::new(ErrorCode::OrderEmpty),
            OrderError::UnknownProduct(id) => {
                AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", id)
            }
            OrderError::CurrencyMismatch => AppError::new(ErrorCode::CurrencyMismatch),
            OrderError::TotalMismatch { expected, computed } => {
                AppError::new(ErrorCode::TotalMismatch)
                    .with_detail("expected", expected.to_string())
                    .with_detail("computed", computed.to_string())
            }
            OrderError::NotFound(id) => {
                AppError::new(ErrorCode::OrderNotFound).with_detail("order_id", id)
            }
            OrderError::InvalidTransition { from, to } => {
                AppError::invalid_transition(format!("Cannot move order from {from} to {to}"))
                    .with_detail("from", from.to_string())
                    .with_detail("to", to.to_string())
            }
            OrderError::PaymentNotPaid(status) => AppError::new(ErrorCode::PaymentNotPaid)
                .with_detail("payment_status", status.as_db()),
            OrderError::SignatureInvalid => AppError::new(ErrorCode::SignatureInvalid),
            OrderError::RefundExceedsAmount { requested, paid } => {
                AppError::new(ErrorCode::RefundExceedsAmount)
                    .with_detail("requested", requested.to_string())
                    .with_detail("paid", paid.to_string())
            }
            OrderError::RefundInFlight(id) => AppError::with_message(
                ErrorCode::ConcurrentModification,
                "A refund for this order is still being settled",
            )
            .with_detail("order_id", id),
            OrderError::Inventory(e) => e.into(),
            OrderError::Payment(e) => e.into(),
            OrderError::Store(StoreError::NotFound) => AppError::new(ErrorCode::OrderNotFound),
            OrderError::Store(e) => e.into(),
        }
    }
}
