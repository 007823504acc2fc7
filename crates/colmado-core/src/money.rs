//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A ledger that drifts by a centavo per transaction fails the            │
//! │  debit == credit invariant within a day of trading.                     │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Centavos                                         │
//! │    RD$100.00 is 10000 centavos. Every sum is exact. Rounding            │
//! │    happens exactly once, at tax computation, and is specified.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rounding
//! ITBIS amounts are rounded **half-up** to the centavo, matching the DGII
//! reporting convention. This differs from bankers rounding: RD$0.005 of
//! tax always becomes RD$0.01.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use crate::types::TaxRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in centavos (the smallest DOP unit).
///
/// ## Design Decisions
/// - **i64 (signed)**: allows negative values for refunds and credit balances
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Derives**: full serde support for JSON serialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos.
    ///
    /// ## Example
    /// ```rust
    /// use colmado_core::money::Money;
    ///
    /// let price = Money::from_cents(10_099); // RD$100.99
    /// assert_eq!(price.cents(), 10_099);
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

    /// Returns the major unit (pesos) portion.
    #[inline]
    pub const fn pesos(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Computes the ITBIS on this amount at the given rate, rounded
    /// **half-up** to the centavo.
    ///
    /// ## Fiscal Rounding
    /// ```text
    /// ┌─────────────────────────────────────────────────────────────────────┐
    /// │  ROUND HALF-UP (DGII convention)                                    │
    /// │                                                                     │
    /// │  RD$0.305 → RD$0.31     RD$0.304 → RD$0.30                          │
    /// │                                                                     │
    /// │  The half-centavo always rounds away from zero. Form 606/607        │
    /// │  totals must match line-level rounding, so this is applied per      │
    /// │  line, never on aggregates.                                         │
    /// └─────────────────────────────────────────────────────────────────────┘
    /// ```
    ///
    /// For negative amounts (refund lines) the magnitude is rounded and the
    /// sign reapplied, so a sale and its exact reversal carry equal and
    /// opposite tax.
    ///
    /// ## Example
    /// ```rust
    /// use colmado_core::money::Money;
    /// use colmado_core::types::TaxRate;
    ///
    /// let amount = Money::from_cents(10_000); // RD$100.00
    /// let rate = TaxRate::from_bps(1800);     // 18%
    /// assert_eq!(amount.itbis(rate).cents(), 1_800);
    ///
    /// // RD$0.25 at 18% = 4.5 centavos → rounds up to 5
    /// assert_eq!(Money::from_cents(25).itbis(rate).cents(), 5);
    /// ```
    pub fn itbis(&self, rate: TaxRate) -> Money {
        // i128 intermediate prevents overflow on large amounts
        let magnitude =
            (self.0.unsigned_abs() as i128 * rate.bps() as i128 + 5_000) / 10_000;
        let cents = magnitude as i64;
        if self.0 < 0 {
            Money(-cents)
        } else {
            Money(cents)
        }
    }

    /// Returns this amount plus its ITBIS (tax-inclusive variant).
    ///
    /// Used for the `unit_cost_with_tax` stored on inventory lots.
    #[inline]
    pub fn with_itbis(&self, rate: TaxRate) -> Money {
        *self + self.itbis(rate)
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use colmado_core::money::Money;
    ///
    /// let unit_cost = Money::from_cents(299); // RD$2.99
    /// assert_eq!(unit_cost.multiply_quantity(3).cents(), 897);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable format.
///
/// ## Note
/// This is for logs and debugging. Receipt formatting is the caller's
/// concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}RD${}.{:02}", sign, self.pesos().abs(), self.cents_part())
    }
}

/// Default money is zero.
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Sums an iterator of Money values (for totalling journal lines).
impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
