//! # Error Types
//!
//! Domain error types for caixa-core.
//!
//! ## Error Flow
//! ```text
//! ValidationError → CoreError → FinalizeError (caixa-checkout) → UI
//! ```
//!
//! Everything here blocks a checkout **before any side effect** and is
//! recoverable by correcting the input; persistence/verification/fiscal
//! failures are modeled in the orchestration crate where they occur.
//!
//! ## Design Principles
//! 1. `thiserror` derives, never manual impls
//! 2. Context in the message (sku, amounts), never bare strings
//! 3. Each variant maps to one user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure checkout logic.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Finalize was requested with nothing in the cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Finalize was requested without any payment method selected.
    #[error("No payment method selected")]
    NoPaymentMethod,

    /// Payments do not cover the payable total yet.
    #[error("Payments do not cover the total: {remaining_cents} centavos remaining")]
    BalanceNotCovered { remaining_cents: i64 },

    /// An electronic entry tried to exceed the remaining balance.
    /// Only cash may overpay (producing change).
    #[error(
        "Electronic payment '{method_id}' of {amount_cents} exceeds remaining balance of {remaining_cents}"
    )]
    ElectronicOverpayment {
        method_id: String,
        amount_cents: i64,
        remaining_cents: i64,
    },

    /// The operator-entered discount on total is out of bounds.
    ///
    /// Rejected before any discount layer is applied: a percent above
    /// 100% or a fixed value reaching the subtotal would drive the
    /// total to or below zero.
    #[error("Invalid discount on total: {reason}")]
    InvalidGlobalDiscount { reason: String },

    /// Insufficient stock to complete the sale.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    /// The referenced line is not in the cart.
    #[error("Product not in cart: {0}")]
    ProductNotInCart(String),

    /// Cart has exceeded the maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// A finalize-session reducer was applied in the wrong phase.
    ///
    /// Indicates a sequencing bug in the orchestrator, not operator
    /// input; the flow must move strictly forward.
    #[error("Illegal finalize transition: {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
