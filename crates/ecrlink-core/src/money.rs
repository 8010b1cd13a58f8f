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
//! │  The terminal protocol is explicit: every amount on the wire is an     │
//! │  integer in minor currency units (tetri for GEL, cents for EUR).       │
//! │                                                                         │
//! │  OUR SOLUTION: convert a decimal amount exactly once, at the command   │
//! │  boundary, rounding half-up. After that, amounts stay integers.        │
//! │    9.99  -> 999                                                         │
//! │    61.00 -> 6100                                                        │
//! │    0.005 -> 1    (half-up, away from zero - deterministic)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ecrlink_core::money::Money;
//! use rust_decimal::Decimal;
//!
//! // From the wire (preferred - already minor units)
//! let authorized = Money::from_minor_units(6100);
//!
//! // From a decimal amount at the command boundary
//! let amount = Money::from_decimal(Decimal::new(999, 2)).unwrap();
//! assert_eq!(amount, Money::from_minor_units(999));
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Money Type
// =============================================================================

/// Represents a monetary value in the smallest currency unit.
///
/// ## Design Decisions
/// - **i64 (signed)**: Allows negative values for refunds and discount lines
///   (the terminal reports discount adjustments as negative amounts)
/// - **Single field tuple struct**: Zero-cost abstraction over i64
/// - **Transparent serde**: serializes as a bare JSON number, exactly what the
///   terminal sends and expects
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units (the smallest currency unit).
    ///
    /// ## Example
    /// ```rust
    /// use ecrlink_core::money::Money;
    ///
    /// let price = Money::from_minor_units(999); // 9.99
    /// assert_eq!(price.minor_units(), 999);
    /// ```
    #[inline]
    pub const fn from_minor_units(units: i64) -> Self {
        Money(units)
    }

    /// Converts a decimal amount into minor units, rounding half-up.
    ///
    /// This is the ONLY place a decimal amount becomes an integer. It happens
    /// once, at the command-dispatch boundary; every later calculation and
    /// every wire payload uses the integer.
    ///
    /// ## Rounding
    /// Midpoints round away from zero: `0.005 -> 1`, `-0.005 -> -1`. No
    /// sub-minor-unit amounts are expected from callers, but when one shows up
    /// the result is still deterministic.
    ///
    /// ## Errors
    /// Returns [`CoreError::AmountOutOfRange`] when the scaled amount does not
    /// fit in `i64`.
    ///
    /// ## Example
    /// ```rust
    /// use ecrlink_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// assert_eq!(Money::from_decimal(Decimal::new(999, 2)).unwrap().minor_units(), 999);
    /// assert_eq!(Money::from_decimal(Decimal::new(6100, 2)).unwrap().minor_units(), 6100);
    /// assert_eq!(Money::from_decimal(Decimal::new(5, 3)).unwrap().minor_units(), 1);
    /// ```
    pub fn from_decimal(amount: Decimal) -> CoreResult<Self> {
        let out_of_range = || CoreError::AmountOutOfRange {
            amount: amount.to_string(),
        };
        let scaled = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .ok_or_else(out_of_range)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
        scaled.to_i64().map(Money).ok_or_else(out_of_range)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (e.g. lari, euros).
    #[inline]
    pub const fn major_part(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99, absolute value).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
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
    ///
    /// Negative amounts are legal: the terminal reports discount and
    /// adjustment lines as negative `amountAdditional` entries.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display implementation shows money in a human-readable decimal format.
///
/// ## Note
/// This is for logs and debugging. The currency symbol is deliberately
/// omitted; the currency code travels separately on the wire.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major_part().abs(), self.minor_part())
    }
}

/// Addition of two Money values.
impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

/// Addition assignment (+=).
impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

/// Subtraction of two Money values.
impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

/// Subtraction assignment (-=).
impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

/// Negation (refund perspective of an authorized amount).
impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor_units() {
        let money = Money::from_minor_units(999);
        assert_eq!(money.minor_units(), 999);
        assert_eq!(money.major_part(), 9);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_from_decimal_exact() {
        // 9.99 -> 999
        let money = Money::from_decimal(Decimal::new(999, 2)).unwrap();
        assert_eq!(money.minor_units(), 999);

        // 61.00 -> 6100
        let money = Money::from_decimal(Decimal::new(6100, 2)).unwrap();
        assert_eq!(money.minor_units(), 6100);

        // Whole number without decimals
        let money = Money::from_decimal(Decimal::new(7, 0)).unwrap();
        assert_eq!(money.minor_units(), 700);
    }

    #[test]
    fn test_from_decimal_half_up() {
        // 0.005 -> 1 (midpoint rounds away from zero)
        let money = Money::from_decimal(Decimal::new(5, 3)).unwrap();
        assert_eq!(money.minor_units(), 1);

        // 0.004 -> 0
        let money = Money::from_decimal(Decimal::new(4, 3)).unwrap();
        assert_eq!(money.minor_units(), 0);

        // -0.005 -> -1 (symmetric)
        let money = Money::from_decimal(Decimal::new(-5, 3)).unwrap();
        assert_eq!(money.minor_units(), -1);
    }

    #[test]
    fn test_from_decimal_out_of_range() {
        let huge = Decimal::MAX;
        assert!(Money::from_decimal(huge).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_minor_units(999)), "9.99");
        assert_eq!(format!("{}", Money::from_minor_units(500)), "5.00");
        assert_eq!(format!("{}", Money::from_minor_units(-550)), "-5.50");
        assert_eq!(format!("{}", Money::from_minor_units(0)), "0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_minor_units(1000);
        let b = Money::from_minor_units(500);

        assert_eq!((a + b).minor_units(), 1500);
        assert_eq!((a - b).minor_units(), 500);
        assert_eq!((-a).minor_units(), -1000);
    }

    #[test]
    fn test_zero_and_sign_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        // Discount lines arrive negative and must stay negative
        let discount = Money::from_minor_units(-100);
        assert!(discount.is_negative());
        assert_eq!(discount.abs().minor_units(), 100);
    }

    #[test]
    fn test_serde_transparent() {
        // The wire carries bare integers for amounts
        let money = Money::from_minor_units(6100);
        assert_eq!(serde_json::to_string(&money).unwrap(), "6100");

        let parsed: Money = serde_json::from_str("-100").unwrap();
        assert_eq!(parsed.minor_units(), -100);
    }
}
