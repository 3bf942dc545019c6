//! # Fiscal Error Types
//!
//! The orchestrator treats every emit failure the same way (the sale
//! stays durable, fiscal status drops to pending), but the error text
//! it attaches to the sale must distinguish a business rejection from a
//! transport problem, because the operator's next step differs: fix the
//! document vs. just retry.

use thiserror::Error;

/// Fiscal gateway and document errors.
#[derive(Debug, Error)]
pub enum FiscalError {
    /// The authority processed the document and refused it
    /// (e.g. "rejeição 539: duplicidade de NF-e").
    #[error("Authority rejected the document: {message}")]
    Rejected { message: String },

    /// The gateway could not be reached or did not answer.
    #[error("Fiscal gateway unreachable: {0}")]
    Transport(String),

    /// The document is structurally unfit to send (missing company
    /// registration, empty item list).
    #[error("Invalid fiscal document: {0}")]
    InvalidDocument(String),

    /// Cancellation was requested outside the authority-imposed
    /// window.
    #[error(
        "Cancellation window expired: {elapsed_minutes} minutes since emission, window is {window_minutes}"
    )]
    WindowExpired {
        elapsed_minutes: i64,
        window_minutes: i64,
    },
}

/// Result type for fiscal operations.
pub type FiscalResult<T> = Result<T, FiscalError>;
