//! # Domain Types
//!
//! Core domain types for the Caixa POS checkout.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  Reference data            Checkout                Persisted sale   │
//! │  ──────────────            ────────                ──────────────   │
//! │  Product                   DiscountValue           Sale             │
//! │   ├ promotion              TermTier / ValueTier    SaleItem         │
//! │   └ quantity_discount      PaymentEntry            SaleItemOption   │
//! │  Customer                  ReservationToken        StockEntry       │
//! │                                                    FiscalStatus     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! `SaleItem` freezes every product fact it needs (price, name, tax
//! codes) at persistence time, so later catalog edits never retroactively
//! alter a historical sale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

/// Document model code for NFC-e (consumer electronic fiscal receipt).
pub const NFCE_MODEL: i64 = 65;

// =============================================================================
// Discount Values
// =============================================================================

/// A discount magnitude: percentage (basis points) or fixed centavos.
///
/// Used by product promotions, quantity-discount rules and the
/// operator-entered discount on the cart total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum DiscountValue {
    /// Percentage in basis points (1000 = 10%).
    Percent(u32),
    /// Fixed amount in centavos.
    Fixed(i64),
}

/// A per-product discount unlocked at a minimum purchased quantity.
///
/// Applied to the **base** price, never on top of a promotion; the
/// pricing engine picks whichever single source is cheaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuantityDiscount {
    /// Minimum quantity that unlocks the discount.
    pub min_qty: i64,
    /// Discount applied once unlocked.
    pub value: DiscountValue,
}

/// Whether a cart-total layer subtracts or adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum LayerSign {
    Discount,
    Surcharge,
}

/// A customer-specific discount/surcharge tied to a payment term length.
///
/// The operator selects one of the customer's eligible tiers ("prazo");
/// it is never auto-applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TermTier {
    /// Payment term length in days.
    pub days: u32,
    /// Percentage in basis points.
    pub bps: u32,
    pub sign: LayerSign,
}

/// An automatic discount/surcharge matched against the running total.
///
/// Among tiers whose minimum the total reaches, the highest minimum
/// wins. Comes from customer master data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ValueTier {
    /// Total (in centavos) the sale must reach for this tier to match.
    pub minimum_cents: i64,
    /// Percentage in basis points.
    pub bps: u32,
    pub sign: LayerSign,
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale. Immutable reference data at checkout
/// time: the cart snapshots what it needs and never writes back.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Barcode (EAN-13, UPC-A, etc.).
    pub barcode: Option<String>,

    /// Display name shown to the operator and on the receipt.
    pub name: String,

    /// Base price in centavos.
    pub price_cents: i64,

    /// Active promotion, if any.
    pub promotion: Option<DiscountValue>,

    /// Quantity-discount rule, if any.
    pub quantity_discount: Option<QuantityDiscount>,

    /// Mercosur product classification code.
    pub ncm: String,

    /// Fiscal operation code for the sale.
    pub cfop: String,

    /// Simples Nacional tax situation code.
    pub csosn: String,

    /// Commercial unit ("UN", "KG", ...).
    pub unit: String,

    /// Whether to track inventory for this product.
    pub track_stock: bool,

    /// Allow selling when stock is zero or negative.
    pub allow_negative_stock: bool,

    /// Current stock level.
    pub current_stock: Option<i64>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the base price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks if the product can be sold at the given quantity.
    pub fn can_sell(&self, quantity: i64) -> bool {
        if !self.track_stock {
            return true;
        }

        let stock = self.current_stock.unwrap_or(0);
        if stock >= quantity {
            return true;
        }

        self.allow_negative_stock
    }
}

// =============================================================================
// Customer
// =============================================================================

/// Customer master data, carrying the tier tables the discount stack
/// reads. Loaded once per checkout; not mutated by the core.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,

    pub name: String,

    /// Buyer document (CPF/CNPJ), printed on the fiscal receipt when
    /// the customer asks for it.
    pub document: Option<String>,

    /// Payment-term tiers the operator may pick from.
    pub term_tiers: Vec<TermTier>,

    /// Value tiers matched automatically against the running total.
    pub value_tiers: Vec<ValueTier>,
}

// =============================================================================
// Payments
// =============================================================================

/// Whether a payment method settles physically or through a processor.
///
/// Cash may exceed the remaining balance (producing change); electronic
/// entries must not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentClass {
    Cash,
    Electronic,
}

/// One payment towards the sale total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaymentEntry {
    /// Configured payment-method id ("dinheiro", "pix", "credito", ...).
    pub method_id: String,

    pub class: PaymentClass,

    /// Amount tendered in centavos.
    pub amount_cents: i64,
}

impl PaymentEntry {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Fiscal Status
// =============================================================================

/// Fiscal lifecycle of a sale, mutated only by the finalize
/// orchestrator and the manual retry/cancel actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FiscalStatus {
    /// No fiscal emission was requested for this sale.
    None,
    /// Emission was requested but has not been authorized; the error
    /// text on the sale says why the last attempt failed.
    Pending,
    /// Authorized by the fiscal authority.
    Authorized,
    /// Definitively rejected by the authority.
    Rejected,
    /// Authorized and later cancelled within the authority window.
    Cancelled,
}

impl Default for FiscalStatus {
    fn default() -> Self {
        FiscalStatus::None
    }
}

// =============================================================================
// Reservation Token
// =============================================================================

/// The fiscal document number/series fixed before any persistence.
///
/// Immutable once created, 1:1 with the Sale it seeds. The allocator is
/// best-effort (max + 1 over all statuses), not a guarded sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReservationToken {
    pub company_id: String,
    /// Document model code (65 = NFC-e).
    pub model: i64,
    pub series: i64,
    pub number: i64,
}

// =============================================================================
// Sale
// =============================================================================

/// A finalized sale. Created at finalize time; never deleted, only
/// cancelled.
///
/// The per-layer discount columns store **signed deductions**: positive
/// reduces the total (discount), negative increases it (surcharge), so
/// `total == subtotal - (global + term + value_tier)` always holds and
/// the receipt breakdown is reproducible from the stored row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub company_id: String,

    /// Reserved fiscal document identification.
    pub document_model: i64,
    pub series: i64,
    pub number: i64,

    pub subtotal_cents: i64,
    pub global_discount_cents: i64,
    pub term_discount_cents: i64,
    pub value_tier_discount_cents: i64,
    pub total_cents: i64,

    /// Payment summary.
    pub paid_cents: i64,
    pub change_cents: i64,

    pub customer_id: Option<String>,
    /// Buyer document (CPF/CNPJ) captured for the fiscal receipt,
    /// kept on the row so a retransmit can rebuild the document.
    pub buyer_document: Option<String>,

    pub fiscal_status: FiscalStatus,
    /// Last gateway error text, kept for operator review and retry.
    pub fiscal_error: Option<String>,
    /// NFC-e access key, set only after gateway success.
    pub fiscal_key: Option<String>,
    /// Authorization protocol, set only after gateway success.
    pub fiscal_protocol: Option<String>,
    #[ts(as = "Option<String>")]
    pub authorized_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Sale {
    /// The reservation this sale was seeded from.
    pub fn reservation(&self) -> ReservationToken {
        ReservationToken {
            company_id: self.company_id.clone(),
            model: self.document_model,
            series: self.series,
            number: self.number,
        }
    }

    /// Sum of the signed layer deductions.
    pub fn layer_deduction_cents(&self) -> i64 {
        self.global_discount_cents + self.term_discount_cents + self.value_tier_discount_cents
    }

    /// Audit invariant: the stored total must be reproducible from the
    /// stored subtotal and layer amounts.
    pub fn total_reproducible(&self) -> bool {
        self.total_cents == self.subtotal_cents - self.layer_deduction_cents()
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A denormalized snapshot of one cart line at persistence time.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,

    /// SKU at time of sale (frozen).
    pub sku_snapshot: String,
    /// Product name at time of sale (frozen).
    pub name_snapshot: String,

    /// Effective unit price actually charged, in centavos.
    pub unit_price_cents: i64,
    /// Unit price before any manual discount, kept for display/audit.
    pub original_price_cents: i64,
    pub quantity: i64,
    /// Line total including additional selections.
    pub line_total_cents: i64,

    /// Tax codes frozen from the product for fiscal document building.
    pub ncm: String,
    pub cfop: String,
    pub csosn: String,
    pub unit: String,

    /// Staff member assigned to the line, if any.
    pub staff_id: Option<String>,
    /// Free-text note entered by the operator.
    pub note: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    /// Whether the operator replaced the computed price on this line.
    #[inline]
    pub fn has_manual_discount(&self) -> bool {
        self.unit_price_cents != self.original_price_cents
    }
}

/// A persisted additional selection attached to a sale item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItemOption {
    pub id: String,
    pub sale_item_id: String,
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// One stock-ledger movement, keyed by product and tagged with an
/// observation (the sale number) used later for reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockEntry {
    pub id: String,
    pub product_id: String,
    /// Signed quantity delta: negative for a sale.
    pub quantity_delta: i64,
    /// Reconciliation tag, e.g. "NFC-e 65/1-000042".
    pub observation: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
