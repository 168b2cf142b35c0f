//! Fixed-markup pricing.
//!
//! Amounts are whole cents and the markup is held in basis points, so every
//! conversion is exact integer arithmetic with half-up rounding to the cent.

use store::Money;

const BASIS_POINTS: i128 = 10_000;

/// A price multiplier such as `1.15`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Markup {
    basis_points: i64,
}

impl Markup {
    /// Creates a markup from basis points, where 10 000 is a multiplier of 1.
    ///
    /// Returns `None` unless the multiplier is positive.
    pub fn from_basis_points(basis_points: i64) -> Option<Self> {
        (basis_points > 0).then_some(Self { basis_points })
    }

    pub fn basis_points(&self) -> i64 {
        self.basis_points
    }

    /// Returns `base × markup`, rounded half-up to the cent.
    ///
    /// Returns `None` if the result does not fit in [`Money`].
    pub fn apply(&self, base: Money) -> Option<Money> {
        let numerator = i128::from(base.cents()) * i128::from(self.basis_points);
        div_half_up(numerator, BASIS_POINTS).map(Money::from_cents)
    }

    /// Returns `marked_up ÷ markup`, rounded half-up to the cent.
    ///
    /// Returns `None` if the result does not fit in [`Money`].
    pub fn remove(&self, marked_up: Money) -> Option<Money> {
        let numerator = i128::from(marked_up.cents()) * BASIS_POINTS;
        div_half_up(numerator, i128::from(self.basis_points)).map(Money::from_cents)
    }
}

impl Default for Markup {
    fn default() -> Self {
        Self {
            basis_points: 11_500,
        }
    }
}

impl std::fmt::Display for Markup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:04}",
            self.basis_points / 10_000,
            self.basis_points % 10_000
        )
    }
}

/// Error returned when a markup multiplier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid markup '{0}': expected a positive decimal with at most four fractional digits")]
pub struct ParseMarkupError(String);

impl std::str::FromStr for Markup {
    type Err = ParseMarkupError;

    /// Parses `"1.15"` or `"2"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseMarkupError(s.to_string());
        let trimmed = s.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty()
            || fraction.len() > 4
            || !whole.bytes().all(|b| b.is_ascii_digit())
            || !fraction.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(err());
        }
        let whole: i64 = whole.parse().map_err(|_| err())?;
        let fraction: i64 = if fraction.is_empty() {
            0
        } else {
            format!("{fraction:0<4}").parse().map_err(|_| err())?
        };
        let basis_points = whole
            .checked_mul(10_000)
            .and_then(|bp| bp.checked_add(fraction))
            .ok_or_else(err)?;
        Self::from_basis_points(basis_points).ok_or_else(err)
    }
}

/// Integer division rounding halves away from zero.
fn div_half_up(numerator: i128, denominator: i128) -> Option<i64> {
    let magnitude = (numerator.abs() * 2 + denominator) / (denominator * 2);
    let signed = if numerator < 0 { -magnitude } else { magnitude };
    i64::try_from(signed).ok()
}
