//! # Cart Model
//!
//! The ordered list of line items being sold, and the naive subtotal
//! sum the discount stack starts from.
//!
//! ## Ownership
//! Cart items are owned exclusively by the `Cart` and mutated only
//! through its operations; they are destroyed on sale completion or an
//! explicit clear. Every mutation that can change a line's quantity
//! re-resolves the effective unit price through the pricing engine, so
//! a quantity-discount threshold crossing reprices the line
//! automatically.
//!
//! ## Invariants
//! - Lines are unique by `product_id` (adding the same product again
//!   increases its quantity)
//! - Quantity is always > 0
//! - A manual operator price survives quantity changes untouched

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::{resolve_unit_price, ProductPricing};
use crate::types::Product;
use crate::validation::{validate_cart_size, validate_note, validate_quantity};
use crate::MAX_ITEM_QUANTITY;

// =============================================================================
// Item Option
// =============================================================================

/// An additional selection attached to a line (e.g. an extra, a
/// side, a service). Priced independently and added to the line total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ItemOption {
    pub name: String,
    pub price_cents: i64,
    pub quantity: i64,
}

impl ItemOption {
    pub fn total_cents(&self) -> i64 {
        self.price_cents * self.quantity
    }
}

// =============================================================================
// Cart Item
// =============================================================================

/// One line in the cart.
///
/// Snapshots everything it needs from the product (name, price, pricing
/// rules, tax codes) at add time, so a catalog edit mid-sale never
/// changes what the operator sees.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Product ID (UUID).
    pub product_id: String,

    /// SKU at time of adding (frozen).
    pub sku: String,

    /// Product name at time of adding (frozen).
    pub name: String,

    /// Pricing rules at time of adding (frozen); quantity changes
    /// re-resolve against these.
    pub pricing: ProductPricing,

    /// Quantity in cart.
    pub quantity: i64,

    /// Effective unit price currently charged.
    pub unit_price_cents: i64,

    /// Engine-computed unit price, retained when a manual discount
    /// replaced it.
    pub computed_price_cents: i64,

    /// Operator-entered replacement price, if any.
    pub manual_price_cents: Option<i64>,

    /// Additional selections.
    pub options: Vec<ItemOption>,

    /// Free-text operator note.
    pub note: Option<String>,

    /// Staff member assigned to this line.
    pub staff_id: Option<String>,

    /// Tax codes frozen from the product.
    pub ncm: String,
    pub cfop: String,
    pub csosn: String,
    pub unit: String,

    /// When this item was added to cart.
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Creates a cart line from a product and quantity, resolving the
    /// effective unit price.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        let pricing = ProductPricing::from_product(product);
        let resolved = resolve_unit_price(&pricing, quantity, None);

        CartItem {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            pricing,
            quantity,
            unit_price_cents: resolved.unit_price.cents(),
            computed_price_cents: resolved.computed_price.cents(),
            manual_price_cents: None,
            options: Vec::new(),
            note: None,
            staff_id: None,
            ncm: product.ncm.clone(),
            cfop: product.cfop.clone(),
            csosn: product.csosn.clone(),
            unit: product.unit.clone(),
            added_at: Utc::now(),
        }
    }

    /// Re-resolves the unit price after a quantity or discount change.
    fn reprice(&mut self) {
        let manual = self.manual_price_cents.map(Money::from_cents);
        let resolved = resolve_unit_price(&self.pricing, self.quantity, manual);
        self.unit_price_cents = resolved.unit_price.cents();
        self.computed_price_cents = resolved.computed_price.cents();
    }

    /// Line total: unit price × quantity plus all options.
    pub fn line_total_cents(&self) -> i64 {
        let options: i64 = self.options.iter().map(ItemOption::total_cents).sum();
        self.unit_price_cents * self.quantity + options
    }

    /// Whether the operator replaced the computed price on this line.
    #[inline]
    pub fn has_manual_discount(&self) -> bool {
        self.manual_price_cents.is_some()
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The shopping cart.
#[derive(Debug, Clone, Serialize, Deserialize, Default, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Lines in the cart, in add order.
    pub items: Vec<CartItem>,

    /// When the cart was created/last cleared.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Cart {
    /// Creates a new empty cart.
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a product or increases its quantity if already present.
    ///
    /// Either way the line is repriced, so crossing a
    /// quantity-discount threshold takes effect immediately.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            let new_qty = item.quantity + quantity;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            item.quantity = new_qty;
            item.reprice();
            return Ok(());
        }

        validate_cart_size(self.items.len())?;
        self.items.push(CartItem::from_product(product, quantity));
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }
        validate_quantity(quantity)?;

        let item = self.item_mut(product_id)?;
        item.quantity = quantity;
        item.reprice();
        Ok(())
    }

    /// Removes a line by product ID.
    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|i| i.product_id != product_id);

        if self.items.len() == initial_len {
            Err(CoreError::ProductNotInCart(product_id.to_string()))
        } else {
            Ok(())
        }
    }

    /// Sets or clears the manual (operator) price on a line.
    ///
    /// The manual price replaces the computed price outright; the
    /// computed price stays on the line for display and audit.
    pub fn set_manual_price(
        &mut self,
        product_id: &str,
        price: Option<Money>,
    ) -> CoreResult<()> {
        let item = self.item_mut(product_id)?;
        item.manual_price_cents = price.map(|p| p.clamp_non_negative().cents());
        item.reprice();
        Ok(())
    }

    /// Attaches an additional selection to a line.
    pub fn add_option(&mut self, product_id: &str, option: ItemOption) -> CoreResult<()> {
        validate_quantity(option.quantity)?;
        let item = self.item_mut(product_id)?;
        item.options.push(option);
        Ok(())
    }

    /// Sets or clears the operator note on a line.
    pub fn set_note(&mut self, product_id: &str, note: Option<String>) -> CoreResult<()> {
        if let Some(ref n) = note {
            validate_note(n)?;
        }
        let item = self.item_mut(product_id)?;
        item.note = note;
        Ok(())
    }

    /// Assigns a staff member to a line.
    pub fn assign_staff(&mut self, product_id: &str, staff_id: Option<String>) -> CoreResult<()> {
        let item = self.item_mut(product_id)?;
        item.staff_id = staff_id;
        Ok(())
    }

    /// Clears all lines.
    pub fn clear(&mut self) {
        self.items.clear();
        self.created_at = Utc::now();
    }

    /// Number of lines in the cart.
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Total quantity across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Naive subtotal: the sum of line totals. Item-level discounts are
    /// already folded in; the discount stack takes it from here.
    pub fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(|i| i.line_total_cents()).sum()
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn item_mut(&mut self, product_id: &str) -> CoreResult<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| CoreError::ProductNotInCart(product_id.to_string()))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
