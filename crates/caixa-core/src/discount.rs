//! # Discount Stack
//!
//! Ordered multi-layer discounting on the cart total.
//!
//! ## Layer Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  1. item-level effects          (already folded into the subtotal)  │
//! │          │                                                          │
//! │          ▼                                                          │
//! │  2. global discount on total    (operator-entered, flat or %)       │
//! │          │                                                          │
//! │          ▼                                                          │
//! │  3. term discount ("prazo")     (operator-selected customer tier)   │
//! │          │                                                          │
//! │          ▼                                                          │
//! │  4. value-tier discount         (automatic, highest matching min)   │
//! │          │                                                          │
//! │          ▼                                                          │
//! │  payable total + per-layer breakdown                                │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each layer acts on the **output of the previous layer**, never on the
//! original subtotal: 100.00 with a 10% global discount and a 5% term
//! discount is 85.50, not 85.00.
//!
//! The computation is a pure function of its inputs. Re-running with
//! identical inputs yields identical outputs; no layer reads a counter
//! or clock.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{DiscountValue, LayerSign, TermTier, ValueTier};

// =============================================================================
// Breakdown
// =============================================================================

/// The payable total plus the amount each layer contributed.
///
/// Layer amounts are **signed deductions** (positive reduces the total,
/// negative is a surcharge), matching the columns stored on the Sale so
/// the receipt and any later audit can reproduce the total:
/// `total == subtotal - global - term - value_tier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TotalBreakdown {
    pub subtotal_cents: i64,
    pub global_cents: i64,
    pub term_cents: i64,
    pub value_tier_cents: i64,
    pub total_cents: i64,
    /// The value tier that matched, for receipt display.
    pub selected_value_tier: Option<ValueTier>,
}

impl TotalBreakdown {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Audit invariant check, mirroring `Sale::total_reproducible`.
    pub fn reproducible(&self) -> bool {
        self.total_cents
            == self.subtotal_cents - self.global_cents - self.term_cents - self.value_tier_cents
    }
}

// =============================================================================
// Layer Application
// =============================================================================

/// Validates the operator-entered discount on total.
///
/// Rejected before any layer runs: a percent above 100% or a fixed
/// value reaching the subtotal would zero out or invert the sale.
fn validate_global(global: DiscountValue, subtotal: Money) -> CoreResult<()> {
    match global {
        DiscountValue::Percent(bps) if bps > 10_000 => Err(CoreError::InvalidGlobalDiscount {
            reason: "percent must be at most 100%".to_string(),
        }),
        DiscountValue::Fixed(cents) if cents < 0 => Err(CoreError::InvalidGlobalDiscount {
            reason: "fixed amount must not be negative".to_string(),
        }),
        DiscountValue::Fixed(cents) if cents >= subtotal.cents() => {
            Err(CoreError::InvalidGlobalDiscount {
                reason: format!(
                    "fixed amount {} must be below the subtotal {}",
                    cents,
                    subtotal.cents()
                ),
            })
        }
        _ => Ok(()),
    }
}

/// Signed deduction for a percent layer: positive subtracts
/// (discount), negative adds (surcharge).
fn signed_percent_deduction(basis: Money, bps: u32, sign: LayerSign) -> i64 {
    let amount = basis.percent_of(bps).cents();
    match sign {
        LayerSign::Discount => amount,
        LayerSign::Surcharge => -amount,
    }
}

/// Picks the value tier for a running total: among tiers whose minimum
/// the total reaches, the one with the **highest** minimum wins (best
/// matching threshold, not first match).
pub fn select_value_tier(tiers: &[ValueTier], running_total: Money) -> Option<ValueTier> {
    tiers
        .iter()
        .filter(|tier| tier.minimum_cents <= running_total.cents())
        .max_by_key(|tier| tier.minimum_cents)
        .copied()
}

// =============================================================================
// Payable Total
// =============================================================================

/// Applies the ordered discount layers to a cart subtotal.
///
/// ## Arguments
/// * `subtotal` - sum of item subtotals (item-level discounts already in)
/// * `global` - operator-entered discount on total, if any
/// * `term` - the customer term tier the operator selected, if any
/// * `value_tiers` - the customer's value tiers (automatic selection)
///
/// ## Example
/// ```rust
/// use caixa_core::discount::payable_total;
/// use caixa_core::money::Money;
/// use caixa_core::types::{DiscountValue, LayerSign, TermTier};
///
/// let term = TermTier { days: 30, bps: 500, sign: LayerSign::Discount };
/// let breakdown = payable_total(
///     Money::from_cents(10_000),
///     Some(DiscountValue::Percent(1000)),
///     Some(&term),
///     &[],
/// )
/// .unwrap();
///
/// // 100.00 -> 90.00 (global 10%) -> 85.50 (term 5% of 90.00)
/// assert_eq!(breakdown.total_cents, 8550);
/// ```
pub fn payable_total(
    subtotal: Money,
    global: Option<DiscountValue>,
    term: Option<&TermTier>,
    value_tiers: &[ValueTier],
) -> CoreResult<TotalBreakdown> {
    // Validate the operator input before touching any layer.
    if let Some(value) = global {
        validate_global(value, subtotal)?;
    }

    // Layer 2: global discount on the subtotal.
    let global_cents = match global {
        Some(DiscountValue::Percent(bps)) => subtotal.percent_of(bps).cents(),
        Some(DiscountValue::Fixed(cents)) => cents,
        None => 0,
    };
    let after_global = (subtotal - Money::from_cents(global_cents)).clamp_non_negative();

    // Layer 3: term tier, on the layer-2 output.
    let term_cents = match term {
        Some(tier) => signed_percent_deduction(after_global, tier.bps, tier.sign),
        None => 0,
    };
    let after_term = (after_global - Money::from_cents(term_cents)).clamp_non_negative();

    // Layer 4: value tier, matched against and applied to the layer-3
    // output.
    let selected_value_tier = select_value_tier(value_tiers, after_term);
    let value_tier_cents = match selected_value_tier {
        Some(tier) => signed_percent_deduction(after_term, tier.bps, tier.sign),
        None => 0,
    };
    let total = (after_term - Money::from_cents(value_tier_cents)).clamp_non_negative();

    Ok(TotalBreakdown {
        subtotal_cents: subtotal.cents(),
        global_cents,
        term_cents,
        value_tier_cents,
        total_cents: total.cents(),
        selected_value_tier,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn term(bps: u32, sign: LayerSign) -> TermTier {
        TermTier {
            days: 30,
            bps,
            sign,
        }
    }

    #[test]
    fn test_no_layers_passes_subtotal_through() {
        let b = payable_total(Money::from_cents(10_000), None, None, &[]).unwrap();
        assert_eq!(b.total_cents, 10_000);
        assert!(b.reproducible());
    }

    #[test]
    fn test_layer_ordering_compounds() {
        // 100.00 -> global 10% -> 90.00 -> term 5% of 90.00 -> 85.50.
        // Applying both to the subtotal would give 85.00; the stack
        // must yield 85.50.
        let t = term(500, LayerSign::Discount);
        let b = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Percent(1000)),
            Some(&t),
            &[],
        )
        .unwrap();

        assert_eq!(b.global_cents, 1000);
        assert_eq!(b.term_cents, 450);
        assert_eq!(b.total_cents, 8550);
        assert!(b.reproducible());
    }

    #[test]
    fn test_global_fixed_discount() {
        let b = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Fixed(1000)),
            None,
            &[],
        )
        .unwrap();
        assert_eq!(b.total_cents, 9000);
    }

    #[test]
    fn test_global_percent_over_100_rejected() {
        let err = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Percent(10_001)),
            None,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidGlobalDiscount { .. }));
    }

    #[test]
    fn test_global_fixed_at_or_above_subtotal_rejected() {
        for cents in [10_000, 10_001] {
            let err = payable_total(
                Money::from_cents(10_000),
                Some(DiscountValue::Fixed(cents)),
                None,
                &[],
            )
            .unwrap_err();
            assert!(matches!(err, CoreError::InvalidGlobalDiscount { .. }));
        }
    }

    #[test]
    fn test_global_negative_fixed_rejected() {
        let err = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Fixed(-1)),
            None,
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidGlobalDiscount { .. }));
    }

    #[test]
    fn test_term_surcharge_adds() {
        let t = term(500, LayerSign::Surcharge);
        let b = payable_total(Money::from_cents(10_000), None, Some(&t), &[]).unwrap();

        assert_eq!(b.term_cents, -500);
        assert_eq!(b.total_cents, 10_500);
        assert!(b.reproducible());
    }

    #[test]
    fn test_value_tier_highest_minimum_wins() {
        // Tiers {min 50.00 -> 2%} and {min 80.00 -> 5%}; with a running
        // total of 90.00 the 80-tier is selected, not the 50-tier.
        let tiers = [
            ValueTier {
                minimum_cents: 5000,
                bps: 200,
                sign: LayerSign::Discount,
            },
            ValueTier {
                minimum_cents: 8000,
                bps: 500,
                sign: LayerSign::Discount,
            },
        ];
        let b = payable_total(Money::from_cents(9000), None, None, &tiers).unwrap();

        assert_eq!(b.selected_value_tier.unwrap().minimum_cents, 8000);
        assert_eq!(b.value_tier_cents, 450);
        assert_eq!(b.total_cents, 8550);
    }

    #[test]
    fn test_value_tier_matched_against_layer3_output() {
        // Subtotal 100.00 with a 30.00 global discount leaves 70.00;
        // the 80-tier no longer matches, only the 50-tier does.
        let tiers = [
            ValueTier {
                minimum_cents: 5000,
                bps: 200,
                sign: LayerSign::Discount,
            },
            ValueTier {
                minimum_cents: 8000,
                bps: 500,
                sign: LayerSign::Discount,
            },
        ];
        let b = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Fixed(3000)),
            None,
            &tiers,
        )
        .unwrap();

        assert_eq!(b.selected_value_tier.unwrap().minimum_cents, 5000);
        assert_eq!(b.value_tier_cents, 140);
        assert_eq!(b.total_cents, 6860);
        assert!(b.reproducible());
    }

    #[test]
    fn test_no_value_tier_matches() {
        let tiers = [ValueTier {
            minimum_cents: 50_000,
            bps: 500,
            sign: LayerSign::Discount,
        }];
        let b = payable_total(Money::from_cents(9000), None, None, &tiers).unwrap();
        assert!(b.selected_value_tier.is_none());
        assert_eq!(b.total_cents, 9000);
    }

    #[test]
    fn test_idempotent_for_identical_inputs() {
        let t = term(500, LayerSign::Discount);
        let tiers = [ValueTier {
            minimum_cents: 5000,
            bps: 200,
            sign: LayerSign::Discount,
        }];

        let first = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Percent(1000)),
            Some(&t),
            &tiers,
        )
        .unwrap();
        let second = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Percent(1000)),
            Some(&t),
            &tiers,
        )
        .unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_all_layer_outputs_non_negative() {
        // 100% global discount is allowed for percent; every stage must
        // still clamp at zero.
        let t = term(10_000, LayerSign::Discount);
        let b = payable_total(
            Money::from_cents(10_000),
            Some(DiscountValue::Percent(10_000)),
            Some(&t),
            &[],
        )
        .unwrap();
        assert_eq!(b.total_cents, 0);
    }
}
