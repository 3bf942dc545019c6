//! # Finalize Error Taxonomy
//!
//! Every way the finalize flow can end other than `Completed`, each
//! carrying exactly one human-readable message (the Display impl). No
//! error is ever swallowed without a terminal status.
//!
//! ## The Two Families
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Aborted (nothing confirmed - safe to retry from scratch)           │
//! │    Busy, Validation, Persistence, StockAdjustment*, Verification    │
//! │                                                                     │
//! │  Not errors at all (sale is durable; only the fiscal leg failed)    │
//! │    → finalize returns Completed with FiscalResolution::Pending      │
//! │                                                                     │
//! │  * StockAdjustment aborts the flow but leaves Sale/SaleItem rows    │
//! │    durable: a persisted-but-stock-untouched sale with no automated  │
//! │    repair path. The distinct variant exists so operators can tell   │
//! │    it apart and inspect manually.                                   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use caixa_core::error::CoreError;
use caixa_db::DbError;
use caixa_fiscal::FiscalError;

/// Terminal failures of the finalize flow and the manual fiscal
/// actions.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// A finalize is already in flight; the attempt was rejected
    /// immediately, not queued.
    #[error("A sale is already being finalized")]
    Busy,

    /// Input validation failed before any side effect. Recoverable by
    /// correcting the input.
    #[error("Validation failed: {0}")]
    Validation(#[from] CoreError),

    /// A write before verification failed. Nothing is confirmed; retry
    /// restarts from scratch with a fresh reservation.
    #[error("Failed to persist sale ({step}): {source}")]
    Persistence {
        step: &'static str,
        #[source]
        source: DbError,
    },

    /// The stock-ledger adjustment failed. Fatal for the flow even
    /// though the sale/item rows are already durable.
    #[error("Stock adjustment failed: {source}")]
    StockAdjustment {
        #[source]
        source: DbError,
    },

    /// The store accepted the writes but the read-back does not match
    /// what was submitted. The orphaned rows are left for manual
    /// inspection.
    #[error("Inconsistent write detected: {detail}")]
    Verification { detail: String },

    /// The referenced sale does not exist (retransmit/cancel paths).
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// The sale's fiscal status does not admit the requested action
    /// (e.g. retransmitting an authorized sale).
    #[error("Invalid fiscal state: {detail}")]
    FiscalState { detail: String },

    /// A manual fiscal action (retransmit, cancel) failed at the
    /// gateway. Only these paths surface gateway errors directly;
    /// finalize itself degrades to pending instead.
    #[error("Fiscal operation failed: {0}")]
    Fiscal(#[from] FiscalError),
}

impl FinalizeError {
    /// Whether a retry may simply re-run the whole flow (nothing
    /// durable was confirmed).
    pub fn is_retryable_from_scratch(&self) -> bool {
        matches!(
            self,
            FinalizeError::Busy
                | FinalizeError::Validation(_)
                | FinalizeError::Persistence { .. }
        )
    }
}
