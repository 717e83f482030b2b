//! Unified error codes for the hamper storefront
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Payment / gateway errors
//! - 6xxx: Product / inventory errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 1xxx: Auth ====================
    /// Caller is not authenticated
    NotAuthenticated = 1001,
    /// Invalid credentials (email/username + password)
    InvalidCredentials = 1002,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is malformed or of the wrong class
    TokenInvalid = 1004,
    /// Token signature does not verify
    TokenSignatureInvalid = 1005,
    /// Account is disabled
    AccountDisabled = 1007,
    /// Too many requests from this client
    TooManyRequests = 1008,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Admin role required
    AdminRequired = 2003,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order status transition is not allowed
    InvalidTransition = 4002,
    /// Order is empty
    OrderEmpty = 4007,
    /// Client-supplied total does not match the computed total
    TotalMismatch = 4008,
    /// Order was modified concurrently
    ConcurrentModification = 4009,
    /// Items are priced in different currencies
    CurrencyMismatch = 4010,

    // ==================== 5xxx: Payment ====================
    /// Payment confirmation signature did not verify
    SignatureInvalid = 5001,
    /// Payment has never been paid
    PaymentNotPaid = 5002,
    /// Gateway rejected the refund
    RefundFailed = 5003,
    /// Gateway temporarily unavailable
    GatewayUnavailable = 5004,
    /// Gateway disabled or not configured
    GatewayDisabled = 5005,
    /// Refund amount exceeds the paid amount
    RefundExceedsAmount = 5006,
    /// Gateway rejected the payment request
    PaymentFailed = 5007,

    // ==================== 6xxx: Product ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Not enough stock to reserve
    InsufficientStock = 6003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Operation timed out
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Auth
            ErrorCode::NotAuthenticated => "Caller is not authenticated",
            ErrorCode::InvalidCredentials => "Invalid credentials",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::TokenInvalid => "Authentication token is malformed",
            ErrorCode::TokenSignatureInvalid => "Authentication token signature is invalid",
            ErrorCode::AccountDisabled => "Account is disabled",
            ErrorCode::TooManyRequests => "Too many requests, try again later",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::AdminRequired => "Administrator role is required",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::InvalidTransition => "Order status transition is not allowed",
            ErrorCode::OrderEmpty => "Order is empty",
            ErrorCode::TotalMismatch => "Order total does not match current prices",
            ErrorCode::ConcurrentModification => "Order was modified concurrently, reload and retry",
            ErrorCode::CurrencyMismatch => "All items must be priced in the same currency",

            // Payment
            ErrorCode::SignatureInvalid => "Payment signature is invalid",
            ErrorCode::PaymentNotPaid => "Payment has not been paid",
            ErrorCode::RefundFailed => "Payment gateway rejected the refund",
            ErrorCode::GatewayUnavailable => "Payment gateway is temporarily unavailable",
            ErrorCode::GatewayDisabled => "Payment gateway is disabled or not configured",
            ErrorCode::RefundExceedsAmount => "Refund amount exceeds original payment",
            ErrorCode::PaymentFailed => "Payment gateway rejected the request",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::InsufficientStock => "Insufficient stock",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
        }
    }

    /// Machine-readable snake_case identifier, stable across releases
    pub const fn kind(&self) -> &'static str {
        match self {
            ErrorCode::Success => "success",
            ErrorCode::Unknown => "unknown",
            ErrorCode::ValidationFailed => "validation_error",
            ErrorCode::NotFound => "not_found",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::RequiredField => "required_field",
            ErrorCode::ValueOutOfRange => "value_out_of_range",

            ErrorCode::NotAuthenticated => "not_authenticated",
            ErrorCode::InvalidCredentials => "invalid_credentials",
            ErrorCode::TokenExpired => "token_expired",
            ErrorCode::TokenInvalid => "token_malformed",
            ErrorCode::TokenSignatureInvalid => "token_signature_invalid",
            ErrorCode::AccountDisabled => "account_disabled",
            ErrorCode::TooManyRequests => "too_many_requests",

            ErrorCode::PermissionDenied => "forbidden",
            ErrorCode::AdminRequired => "admin_required",

            ErrorCode::OrderNotFound => "order_not_found",
            ErrorCode::InvalidTransition => "invalid_transition",
            ErrorCode::OrderEmpty => "order_empty",
            ErrorCode::TotalMismatch => "total_mismatch",
            ErrorCode::ConcurrentModification => "concurrent_modification",
            ErrorCode::CurrencyMismatch => "currency_mismatch",

            ErrorCode::SignatureInvalid => "signature_invalid",
            ErrorCode::PaymentNotPaid => "payment_not_paid",
            ErrorCode::RefundFailed => "refund_failed",
            ErrorCode::GatewayUnavailable => "gateway_unavailable",
            ErrorCode::GatewayDisabled => "gateway_disabled",
            ErrorCode::RefundExceedsAmount => "refund_exceeds_amount",
            ErrorCode::PaymentFailed => "payment_failed",

            ErrorCode::ProductNotFound => "product_not_found",
            ErrorCode::InsufficientStock => "insufficient_stock",

            ErrorCode::InternalError => "internal_error",
            ErrorCode::DatabaseError => "database_error",
            ErrorCode::TimeoutError => "timeout",
            ErrorCode::ConfigError => "config_error",
        }
    }

    /// Whether a client may retry the same request later without changing it
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::GatewayUnavailable
                | ErrorCode::TimeoutError
                | ErrorCode::ConcurrentModification
                | ErrorCode::TooManyRequests
        )
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            5 => Ok(ErrorCode::InvalidRequest),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),
            1005 => Ok(ErrorCode::TokenSignatureInvalid),
            1007 => Ok(ErrorCode::AccountDisabled),
            1008 => Ok(ErrorCode::TooManyRequests),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2003 => Ok(ErrorCode::AdminRequired),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::InvalidTransition),
            4007 => Ok(ErrorCode::OrderEmpty),
            4008 => Ok(ErrorCode::TotalMismatch),
            4009 => Ok(ErrorCode::ConcurrentModification),
            4010 => Ok(ErrorCode::CurrencyMismatch),

            // Payment
            5001 => Ok(ErrorCode::SignatureInvalid),
            5002 => Ok(ErrorCode::PaymentNotPaid),
            5003 => Ok(ErrorCode::RefundFailed),
            5004 => Ok(ErrorCode::GatewayUnavailable),
            5005 => Ok(ErrorCode::GatewayDisabled),
            5006 => Ok(ErrorCode::RefundExceedsAmount),
            5007 => Ok(ErrorCode::PaymentFailed),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6003 => Ok(ErrorCode::InsufficientStock),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
