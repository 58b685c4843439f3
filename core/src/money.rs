//! Money as fixed-point integer minor units (cents).
//!
//! RULE: No floating point in limit accounting or discrepancy comparison.
//! Dollars exist only at the API boundary, where client JSON carries decimal
//! amounts; conversion happens once, with validation, on the way in.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// A cash amount in cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Parse a client-supplied dollar amount. Rejects non-finite and negative
    /// values, and anything finer than one cent (beyond float representation
    /// slack of half a hundredth of a cent).
    pub fn from_dollars(dollars: f64) -> Option<Self> {
        if !dollars.is_finite() || dollars < 0.0 || dollars > 1.0e12 {
            return None;
        }
        let scaled = dollars * 100.0;
        let cents = scaled.round();
        if (scaled - cents).abs() > 0.005 {
            return None;
        }
        Some(Self(cents as i64))
    }

    /// Dollars for client-facing JSON payloads.
    pub fn to_dollars(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0).max(0))
    }

    /// Absolute difference, used for discrepancy comparison.
    pub fn abs_diff(self, other: Self) -> Self {
        Self((self.0 - other.0).abs())
    }

    /// Basis-points fraction of this amount, rounded half-up.
    /// Used for platform-fee finalization.
    pub fn fee_bps(self, bps: i64) -> Self {
        Self((self.0 * bps + 5_000) / 10_000)
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dollars_round_trip_to_cents() {
        assert_eq!(Amount::from_dollars(25.50), Some(Amount::from_cents(2550)));
        assert_eq!(Amount::from_dollars(0.0), Some(Amount::ZERO));
        assert_eq!(Amount::from_dollars(100.0), Some(Amount::from_cents(10_000)));
    }

    #[test]
    fn rejects_sub_cent_and_invalid_dollars() {
        assert_eq!(Amount::from_dollars(10.001), None);
        assert_eq!(Amount::from_dollars(-5.0), None);
        assert_eq!(Amount::from_dollars(f64::NAN), None);
        assert_eq!(Amount::from_dollars(f64::INFINITY), None);
    }

    #[test]
    fn display_formats_as_dollars() {
        assert_eq!(Amount::from_cents(500).to_string(), "$5.00");
        assert_eq!(Amount::from_cents(2610).to_string(), "$26.10");
        assert_eq!(Amount::from_cents(7).to_string(), "$0.07");
    }

    #[test]
    fn fee_rounds_half_up() {
        // 2.5% of $10.00 = $0.25
        assert_eq!(Amount::from_cents(1000).fee_bps(250), Amount::from_cents(25));
        // 2.5% of $0.19 = 0.475 cents -> rounds to 0 cents? 19 * 250 = 4750, +5000 = 9750 / 10000 = 0
        assert_eq!(Amount::from_cents(19).fee_bps(250), Amount::ZERO);
        // 2.5% of $0.21 = 0.525 cents -> 1 cent
        assert_eq!(Amount::from_cents(21).fee_bps(250), Amount::from_cents(1));
    }
}
