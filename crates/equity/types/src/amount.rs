//! Fixed-point equity arithmetic
//!
//! Amounts are unsigned integers counting base units at 1e-4 resolution.
//! Ledger arithmetic is exact; percentage figures are derived at read
//! time and never persisted, so repeated dilution cannot compound
//! rounding error into stored state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base units per whole equity point (1e-4 resolution)
pub const SCALE: u64 = 10_000;

/// An exact, non-negative equity quantity
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EquityAmount(pub u64);

impl EquityAmount {
    pub const ZERO: EquityAmount = EquityAmount(0);

    /// One minimum unit (0.0001 points)
    pub const MIN_UNIT: EquityAmount = EquityAmount(1);

    pub fn zero() -> Self {
        Self(0)
    }

    /// Whole equity points. Saturates at `u64::MAX` base units.
    pub fn from_points(points: u64) -> Self {
        Self(points.saturating_mul(SCALE))
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// This quantity's share of `total`, as a percentage.
    ///
    /// Display projection only — the returned float is never written back
    /// into ledger state.
    pub fn percent_of(&self, total: EquityAmount) -> f64 {
        if total.is_zero() {
            return 0.0;
        }
        self.0 as f64 / total.0 as f64 * 100.0
    }
}

impl fmt::Display for EquityAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / SCALE;
        let frac = self.0 % SCALE;
        if frac == 0 {
            write!(f, "{}", whole)
        } else {
            let digits = format!("{:04}", frac);
            write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
        }
    }
}

impl FromStr for EquityAmount {
    type Err = crate::EquityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || crate::EquityError::Validation(format!("malformed amount: {:?}", s));

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(bad());
        }
        // Deeper precision than the minimum unit cannot be represented.
        if frac.len() > 4 {
            return Err(bad());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| bad())?
        };
        let mut units = whole.checked_mul(SCALE).ok_or_else(bad)?;
        if !frac.is_empty() {
            let digits: u64 = frac.parse().map_err(|_| bad())?;
            units = units
                .checked_add(digits * 10u64.pow(4 - frac.len() as u32))
                .ok_or_else(bad)?;
        }
        Ok(Self(units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_arithmetic() {
        let a = EquityAmount::from_points(60);
        let b = EquityAmount::from_points(40);
        assert_eq!(a.checked_add(b), Some(EquityAmount::from_points(100)));
        assert_eq!(a.checked_sub(b), Some(EquityAmount::from_points(20)));
        assert_eq!(b.checked_sub(a), None);
    }

    #[test]
    fn test_from_points_saturates() {
        assert_eq!(
            EquityAmount::from_points(u64::MAX),
            EquityAmount::from_base_units(u64::MAX)
        );
        assert_eq!(
            EquityAmount::from_points(u64::MAX / SCALE),
            EquityAmount::from_base_units(u64::MAX / SCALE * SCALE)
        );
    }

    #[test]
    fn test_display_trims_fraction() {
        assert_eq!(EquityAmount::from_points(20).to_string(), "20");
        assert_eq!(EquityAmount::from_base_units(333_333).to_string(), "33.3333");
        assert_eq!(EquityAmount::from_base_units(5_000).to_string(), "0.5");
        assert_eq!(EquityAmount::ZERO.to_string(), "0");
    }

    #[test]
    fn test_parse() {
        assert_eq!(
            "20".parse::<EquityAmount>().unwrap(),
            EquityAmount::from_points(20)
        );
        assert_eq!(
            "0.5".parse::<EquityAmount>().unwrap(),
            EquityAmount::from_base_units(5_000)
        );
        assert_eq!(
            "33.3333".parse::<EquityAmount>().unwrap(),
            EquityAmount::from_base_units(333_333)
        );
        assert!("33.33333".parse::<EquityAmount>().is_err());
        assert!("-1".parse::<EquityAmount>().is_err());
        assert!("abc".parse::<EquityAmount>().is_err());
        assert!(".".parse::<EquityAmount>().is_err());
    }

    #[test]
    fn test_percent_of() {
        let half = EquityAmount::from_points(50);
        let total = EquityAmount::from_points(100);
        assert!((half.percent_of(total) - 50.0).abs() < 1e-9);
        assert_eq!(half.percent_of(EquityAmount::ZERO), 0.0);

        // Dilution shrinks the displayed share without touching the amount.
        let diluted_total = EquityAmount::from_points(150);
        assert!((half.percent_of(diluted_total) - 33.3333).abs() < 1e-3);
    }

    #[test]
    fn test_percentage_round_trip() {
        let total = EquityAmount::from_points(300);
        let amount = EquityAmount::from_base_units(123_456);
        let pct = amount.percent_of(total);
        let recovered = pct / 100.0 * total.base_units() as f64;
        assert!((recovered - amount.base_units() as f64).abs() < 0.5);
    }

    #[test]
    fn test_serde_transparent() {
        let json = serde_json::to_string(&EquityAmount::from_points(5)).unwrap();
        assert_eq!(json, "50000");
    }
}
