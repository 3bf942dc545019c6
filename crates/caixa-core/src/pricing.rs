//! # Pricing Engine
//!
//! Per-item effective-price computation.
//!
//! ## The One Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  promo_price = promotion applied to BASE price (if present)         │
//! │  qty_price   = quantity rule applied to BASE price (if unlocked)    │
//! │                                                                     │
//! │  effective   = min(promo_price, qty_price)                          │
//! │                                                                     │
//! │  The two sources NEVER combine; the cheaper single layer wins.      │
//! │  A manual operator discount replaces the result outright and is     │
//! │  tracked separately (original price retained for the receipt).      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Pricing never fails: a negative or malformed discount configuration
//! is treated as a discount of zero. The silent clamp keeps checkout
//! flowing on bad catalog data at the cost of hiding it, which is a
//! known trade-off of this design.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{DiscountValue, Product, QuantityDiscount};

// =============================================================================
// Pricing Snapshot
// =============================================================================

/// The pricing facts a cart line snapshots from its product.
///
/// Kept on the line (not looked up live) so quantity changes re-resolve
/// against the rules as they stood when the item was added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductPricing {
    pub base_price_cents: i64,
    pub promotion: Option<DiscountValue>,
    pub quantity_discount: Option<QuantityDiscount>,
}

impl ProductPricing {
    pub fn from_product(product: &Product) -> Self {
        ProductPricing {
            base_price_cents: product.price_cents,
            promotion: product.promotion,
            quantity_discount: product.quantity_discount,
        }
    }

    #[inline]
    pub fn base_price(&self) -> Money {
        Money::from_cents(self.base_price_cents)
    }
}

// =============================================================================
// Price Computation
// =============================================================================

/// Applies a discount value to a price.
///
/// Malformed configurations degrade to a discount of zero:
/// - percent above 100% (10000 bps)
/// - negative fixed amount
///
/// A fixed discount larger than the price is *not* malformed; the
/// result is clamped to zero instead (free item).
fn apply_discount(price: Money, value: DiscountValue) -> Money {
    let discounted = match value {
        DiscountValue::Percent(bps) if bps > 10_000 => price,
        DiscountValue::Percent(bps) => price.apply_percent_discount(bps),
        DiscountValue::Fixed(cents) if cents < 0 => price,
        DiscountValue::Fixed(cents) => price - Money::from_cents(cents),
    };
    discounted.clamp_non_negative()
}

/// Whether a quantity rule is unlocked at the given quantity.
///
/// A non-positive `min_qty` is malformed configuration; the rule stays
/// inert rather than applying to every sale.
fn quantity_rule_unlocked(rule: &QuantityDiscount, quantity: i64) -> bool {
    rule.min_qty > 0 && quantity >= rule.min_qty
}

/// Computes one item's effective unit price.
///
/// Pure and total: identical inputs always yield identical outputs, and
/// there is no error path.
///
/// ## Example
/// ```rust
/// use caixa_core::money::Money;
/// use caixa_core::pricing::{effective_unit_price, ProductPricing};
/// use caixa_core::types::{DiscountValue, QuantityDiscount};
///
/// let pricing = ProductPricing {
///     base_price_cents: 2000,
///     promotion: Some(DiscountValue::Percent(1000)),      // -10% => 18.00
///     quantity_discount: Some(QuantityDiscount {
///         min_qty: 5,
///         value: DiscountValue::Fixed(300),               // -3.00 => 17.00
///     }),
/// };
///
/// // At qty 5 both sources apply to the BASE price; the cheaper wins.
/// assert_eq!(effective_unit_price(&pricing, 5), Money::from_cents(1700));
/// // Below the threshold only the promotion is in play.
/// assert_eq!(effective_unit_price(&pricing, 4), Money::from_cents(1800));
/// ```
pub fn effective_unit_price(pricing: &ProductPricing, quantity: i64) -> Money {
    let base = pricing.base_price();

    let promo_price = match pricing.promotion {
        Some(value) => apply_discount(base, value),
        None => base,
    };

    let qty_price = match pricing.quantity_discount {
        Some(rule) if quantity_rule_unlocked(&rule, quantity) => apply_discount(base, rule.value),
        _ => base,
    };

    promo_price.min(qty_price).clamp_non_negative()
}

// =============================================================================
// Manual Discount Resolution
// =============================================================================

/// The price pair a cart line carries: what is charged and what the
/// engine computed before any operator override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ResolvedPrice {
    /// Unit price actually charged.
    pub unit_price: Money,
    /// Engine-computed price, retained for display/audit when a manual
    /// discount replaced it.
    pub computed_price: Money,
}

/// Resolves the unit price for a line, honoring a manual override.
///
/// A manual discount replaces the computed price outright; it is never
/// combined with the promotion or quantity rule.
pub fn resolve_unit_price(
    pricing: &ProductPricing,
    quantity: i64,
    manual_price: Option<Money>,
) -> ResolvedPrice {
    let computed = effective_unit_price(pricing, quantity);
    let unit_price = match manual_price {
        Some(price) => price.clamp_non_negative(),
        None => computed,
    };

    ResolvedPrice {
        unit_price,
        computed_price: computed,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn pricing(
        base: i64,
        promotion: Option<DiscountValue>,
        quantity_discount: Option<QuantityDiscount>,
    ) -> ProductPricing {
        ProductPricing {
            base_price_cents: base,
            promotion,
            quantity_discount,
        }
    }

    #[test]
    fn test_base_price_when_no_rules() {
        let p = pricing(2000, None, None);
        assert_eq!(effective_unit_price(&p, 1).cents(), 2000);
    }

    #[test]
    fn test_promo_and_qty_never_combine() {
        // Base 20.00, promotion -10% => 18.00, qty>=5 -3.00 flat => 17.00.
        // At qty 5 the answer is 17.00 (the lower of the two), NOT 15.00.
        let p = pricing(
            2000,
            Some(DiscountValue::Percent(1000)),
            Some(QuantityDiscount {
                min_qty: 5,
                value: DiscountValue::Fixed(300),
            }),
        );

        assert_eq!(effective_unit_price(&p, 5).cents(), 1700);
        assert_eq!(effective_unit_price(&p, 4).cents(), 1800);
    }

    #[test]
    fn test_promotion_wins_when_cheaper() {
        let p = pricing(
            2000,
            Some(DiscountValue::Percent(2500)), // => 15.00
            Some(QuantityDiscount {
                min_qty: 2,
                value: DiscountValue::Fixed(300), // => 17.00
            }),
        );
        assert_eq!(effective_unit_price(&p, 2).cents(), 1500);
    }

    #[test]
    fn test_result_clamped_to_zero() {
        // Fixed discount larger than the price is a free item, not a
        // negative price.
        let p = pricing(500, Some(DiscountValue::Fixed(900)), None);
        assert_eq!(effective_unit_price(&p, 1).cents(), 0);
    }

    #[test]
    fn test_malformed_percent_degrades_to_zero_discount() {
        let p = pricing(2000, Some(DiscountValue::Percent(10_001)), None);
        assert_eq!(effective_unit_price(&p, 1).cents(), 2000);
    }

    #[test]
    fn test_malformed_fixed_degrades_to_zero_discount() {
        let p = pricing(2000, Some(DiscountValue::Fixed(-500)), None);
        assert_eq!(effective_unit_price(&p, 1).cents(), 2000);
    }

    #[test]
    fn test_malformed_min_qty_keeps_rule_inert() {
        let p = pricing(
            2000,
            None,
            Some(QuantityDiscount {
                min_qty: 0,
                value: DiscountValue::Fixed(300),
            }),
        );
        assert_eq!(effective_unit_price(&p, 10).cents(), 2000);
    }

    #[test]
    fn test_idempotent_for_identical_inputs() {
        let p = pricing(
            2000,
            Some(DiscountValue::Percent(1000)),
            Some(QuantityDiscount {
                min_qty: 5,
                value: DiscountValue::Fixed(300),
            }),
        );
        let first = effective_unit_price(&p, 5);
        let second = effective_unit_price(&p, 5);
        assert_eq!(first, second);
    }

    #[test]
    fn test_manual_discount_replaces_outright() {
        let p = pricing(2000, Some(DiscountValue::Percent(1000)), None);
        let resolved = resolve_unit_price(&p, 1, Some(Money::from_cents(1500)));

        assert_eq!(resolved.unit_price.cents(), 1500);
        // Computed price retained for the receipt.
        assert_eq!(resolved.computed_price.cents(), 1800);
    }

    #[test]
    fn test_manual_discount_clamped() {
        let p = pricing(2000, None, None);
        let resolved = resolve_unit_price(&p, 1, Some(Money::from_cents(-100)));
        assert_eq!(resolved.unit_price.cents(), 0);
    }
}
