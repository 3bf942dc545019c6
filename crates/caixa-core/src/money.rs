//! # Money Module
//!
//! Monetary values in integer centavos.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  In floating point:   0.1 + 0.2 = 0.30000000000000004   ❌          │
//! │                                                                     │
//! │  In integer centavos: 10 + 20 = 30                      ✓           │
//! │                                                                     │
//! │  Every price, discount amount, layer output and payment in the      │
//! │  system is an i64 centavo count. Percentages are basis points       │
//! │  (1000 bps = 10%). Only the UI formats reais for display.           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in centavos (smallest currency unit).
///
/// ## Design Decisions
/// - **i64 (signed)**: surcharge layers and change math need negatives
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Ord derive**: the pricing engine picks `min(promo, qty)` directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos.
    ///
    /// ## Example
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // R$ 10,99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in centavos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-real portion.
    #[inline]
    pub const fn reais(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the centavo portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps negative values to zero.
    ///
    /// Discount math must never drive a price or a layer output below
    /// zero; every stage of the pricing engine and discount stack ends
    /// with this clamp.
    #[inline]
    pub const fn clamp_non_negative(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(299);
    /// assert_eq!(unit_price.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Computes a percentage of this amount, in basis points.
    ///
    /// 1 bps = 0.01%, so 1000 bps = 10%. Uses integer math with
    /// round-half-up: `(amount * bps + 5000) / 10000`, widened to i128
    /// to avoid overflow on large amounts.
    ///
    /// ## Example
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(9000); // R$ 90,00
    /// let five_pct = subtotal.percent_of(500);
    /// assert_eq!(five_pct.cents(), 450);      // R$ 4,50
    /// ```
    pub fn percent_of(&self, bps: u32) -> Money {
        let amount = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money::from_cents(amount as i64)
    }

    /// Subtracts a percentage discount and returns the reduced amount.
    ///
    /// ## Example
    /// ```rust
    /// use caixa_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(10000); // R$ 100,00
    /// assert_eq!(subtotal.apply_percent_discount(1000).cents(), 9000);
    /// ```
    pub fn apply_percent_discount(&self, bps: u32) -> Money {
        *self - self.percent_of(bps)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-friendly display. Receipt formatting belongs to the UI layer,
/// which handles locale (thousands separator, decimal comma).
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}R${}.{:02}", sign, self.reais().abs(), self.cents_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.reais(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "R$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "R$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-R$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "R$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
    }

    #[test]
    fn test_percent_of_basic() {
        // R$ 100,00 at 10% = R$ 10,00
        let amount = Money::from_cents(10000);
        assert_eq!(amount.percent_of(1000).cents(), 1000);
    }

    #[test]
    fn test_percent_of_rounds_half_up() {
        // R$ 10,00 at 8.25% = 82.5 centavos, rounds to 83
        let amount = Money::from_cents(1000);
        assert_eq!(amount.percent_of(825).cents(), 83);
    }

    #[test]
    fn test_apply_percent_discount() {
        let subtotal = Money::from_cents(10000);
        assert_eq!(subtotal.apply_percent_discount(1000).cents(), 9000);
    }

    #[test]
    fn test_clamp_non_negative() {
        assert_eq!(Money::from_cents(-1).clamp_non_negative().cents(), 0);
        assert_eq!(Money::from_cents(0).clamp_non_negative().cents(), 0);
        assert_eq!(Money::from_cents(1).clamp_non_negative().cents(), 1);
    }

    #[test]
    fn test_min_picks_cheaper_price() {
        // The pricing engine relies on Ord to pick the winning layer.
        let promo = Money::from_cents(1800);
        let qty = Money::from_cents(1700);
        assert_eq!(promo.min(qty).cents(), 1700);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        let negative = Money::from_cents(-100);
        assert!(negative.is_negative());
        assert_eq!(negative.abs().cents(), 100);
    }
}
