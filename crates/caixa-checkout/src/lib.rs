//! # caixa-checkout: Sale Finalization for Caixa POS
//!
//! The orchestration layer that turns a cart into a persisted,
//! optionally fiscally-authorized sale, with precise failure semantics
//! when any step fails partway.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  POS screen (external)                                              │
//! │       │ FinalizeRequest                                             │
//! │       ▼                                                             │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │                caixa-checkout (THIS CRATE)                    │  │
//! │  │                                                               │  │
//! │  │  SaleFinalizer ─ state machine driver, busy flag,             │  │
//! │  │                  retransmit & cancel paths                    │  │
//! │  │  store    ─ CheckoutStore/SaleProbe seams + SQLite impl       │  │
//! │  │  receipt  ─ flattened structure for the printing service      │  │
//! │  │  events   ─ SaleFinalized / FiscalStatusChanged bus           │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! │       │                │                    │                       │
//! │       ▼                ▼                    ▼                       │
//! │  caixa-core       caixa-db            caixa-fiscal                  │
//! │  (pure logic)     (SQLite rows)       (NFC-e, gateway)              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Semantics (the short version)
//!
//! - Anything before verification fails ⇒ **Aborted**, retry restarts
//!   from scratch with a fresh number reservation
//! - Verification mismatch ⇒ **Aborted** with a distinct
//!   inconsistent-write error, rows left for inspection
//! - Fiscal emission fails ⇒ the sale still **Completes**; its fiscal
//!   status drops to pending and the error text rides on the sale for
//!   the retransmit path
//!
//! ## Usage
//!
//! ```rust,ignore
//! use caixa_checkout::{CartHandle, FinalizeRequest, SaleFinalizer, SqliteStore};
//!
//! let store = SqliteStore::new(db.clone());
//! let finalizer = SaleFinalizer::new(config, store.clone(), store, Some(gateway));
//!
//! let completed = finalizer.finalize(&cart, request).await?;
//! printing.print(&completed.receipt);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod receipt;
pub mod state;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::FinalizeError;
pub use events::{CheckoutEvent, EventBus};
pub use orchestrator::{CompletedSale, FinalizeRequest, FiscalResolution, SaleFinalizer};
pub use receipt::{build_receipt, Receipt};
pub use state::CartHandle;
pub use store::{CheckoutStore, SaleProbe, SqliteStore};
