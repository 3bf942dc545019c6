//! # caixa-fiscal: NFC-e Documents and Gateway Seam
//!
//! The fiscal leg of the checkout: builds the NFC-e (model 65) document
//! from a persisted sale and defines the gateway trait through which
//! the orchestrator emits and cancels.
//!
//! The authority round trip itself is an external collaborator; this
//! crate deliberately stops at the trait boundary, plus the
//! cancellation-window policy the emitting side must enforce before
//! calling out.
//!
//! ## Modules
//!
//! - [`document`] - NFC-e document model (NCM/CFOP/CSOSN item codes)
//! - [`gateway`] - `FiscalGateway` trait, `Authorization`, `CancelPolicy`
//! - [`error`] - rejection vs. transport vs. window taxonomy

pub mod document;
pub mod error;
pub mod gateway;

pub use document::{CompanyRegistration, NfceDocument, NfceItem};
pub use error::{FiscalError, FiscalResult};
pub use gateway::{Authorization, CancelPolicy, FiscalGateway};
