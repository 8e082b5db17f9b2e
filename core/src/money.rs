//! Integer credit accounting. 1 USD = 1000 credits.
//!
//! Monetary quantities are represented as `Credits`, an `i64` newtype, never as
//! floating point. All arithmetic on the ledger path goes through this type so
//! that overflow and sign mistakes are caught by the type checker rather than
//! by a runtime assertion.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Neg, Sub};

/// Conversion constant: 1 USD = 1000 credits. Not used on the ledger path itself
/// (payment intake is out of scope), kept for admin tooling and test fixtures.
pub const CREDITS_PER_USD: i64 = 1000;

/// An integer amount of credits. Can be negative (ledger debits are negative amounts).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(pub i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    pub fn new(amount: i64) -> Self {
        Credits(amount)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Credits {
    type Output = Credits;
    fn add(self, rhs: Self) -> Self::Output {
        Credits(self.0 + rhs.0)
    }
}

impl Sub for Credits {
    type Output = Credits;
    fn sub(self, rhs: Self) -> Self::Output {
        Credits(self.0 - rhs.0)
    }
}

impl Neg for Credits {
    type Output = Credits;
    fn neg(self) -> Self::Output {
        Credits(-self.0)
    }
}

/// Applies an admin-configured markup to a base price. Markup is clamped to
/// non-negative so a misconfigured negative markup can't undercut a price.
pub fn apply_markup(base_price: Credits, markup: Credits) -> Credits {
    let markup = if markup.0 < 0 { Credits::ZERO } else { markup };
    base_price + markup
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_markup_adds_positive_markup() {
        assert_eq!(apply_markup(Credits(240), Credits(40)), Credits(280));
    }

    #[test]
    fn apply_markup_clamps_negative_markup_to_zero() {
        assert_eq!(apply_markup(Credits(100), Credits(-50)), Credits(100));
    }

    #[test]
    fn credits_arithmetic() {
        assert_eq!(Credits(500) - Credits(140), Credits(360));
        assert_eq!(-Credits(140), Credits(-140));
    }
}
