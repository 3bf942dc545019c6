//! # caixa-core: Pure Business Logic for Caixa POS
//!
//! The heart of the checkout: every pricing, discounting, tender and
//! finalize-phase decision lives here as pure functions with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Caixa POS Architecture                         │
//! │                                                                     │
//! │   POS screen (external)                                             │
//! │        │ FinalizeRequest                                            │
//! │        ▼                                                            │
//! │   caixa-checkout ── orchestration, busy flag, failure semantics     │
//! │        │                                                            │
//! │        ├──► ★ caixa-core (THIS CRATE) ★                             │
//! │        │      money · cart · pricing · discount · payment ·         │
//! │        │      session · config                                      │
//! │        │      NO I/O • NO DATABASE • NO NETWORK                     │
//! │        │                                                            │
//! │        ├──► caixa-db      (SQLite: sales, stock, reservations)      │
//! │        └──► caixa-fiscal  (NFC-e documents, gateway seam)           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Money in integer centavos (no floating point!)
//! - [`types`] - Domain types (Product, Sale, FiscalStatus, ...)
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//! - [`cart`] - Cart model and line items
//! - [`pricing`] - Effective unit price (promotion vs. quantity rule)
//! - [`discount`] - Ordered discount stacking on the cart total
//! - [`payment`] - Payment ledger (split tender, change)
//! - [`session`] - Finalize-sale aggregate and phase reducers
//! - [`config`] - Typed checkout configuration
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input, same output; re-running pricing
//!    or the discount stack twice never changes the answer
//! 2. **No I/O**: database, network and clock access are forbidden here
//!    (timestamps enter through the types, not from lookups)
//! 3. **Integer Money**: every amount is centavos in an i64
//! 4. **Explicit Errors**: typed errors, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod config;
pub mod discount;
pub mod error;
pub mod money;
pub mod payment;
pub mod pricing;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartItem, ItemOption};
pub use config::CheckoutConfig;
pub use discount::{payable_total, TotalBreakdown};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use payment::PaymentLedger;
pub use pricing::{effective_unit_price, ProductPricing};
pub use session::{FinalizePhase, InputQueue, PendingInput, SaleSession};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
///
/// Prevents runaway carts; can become configurable per store later.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// Guards against typo quantities (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;
