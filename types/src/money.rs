//! Fixed-point currency.
//!
//! All balances, bets and wins are integer counts of minor units (cents). Pay values in the
//! paytable are expressed in hundredths of the bet, so every win computation stays exact and
//! only the final division by [`PAY_SCALE`] rounds (toward zero).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Minor units per major unit.
pub const MINOR_UNITS: u64 = 100;

/// Scale of paytable values (a pay of `150` means 1.5x the bet).
pub const PAY_SCALE: u128 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    #[error("money overflow")]
    Overflow,
    #[error("invalid amount: {0}")]
    Invalid(String),
}

/// An amount of money in minor units.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    pub fn from_major(major: u64) -> Option<Self> {
        major.checked_mul(MINOR_UNITS).map(Self)
    }

    pub const fn minor(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Multiply by an integer factor (used for bonus-buy costs).
    pub fn checked_mul(self, factor: u64) -> Option<Money> {
        self.0.checked_mul(factor).map(Self)
    }

    /// `floor(self × pay × ways × multiplier / PAY_SCALE)`.
    ///
    /// Intermediate math is done in `u128`; `None` only if the result does not fit in `u64`.
    pub fn scaled_win(self, pay_hundredths: u32, ways: u32, multiplier: u32) -> Option<Money> {
        let raw = (self.0 as u128)
            .checked_mul(pay_hundredths as u128)?
            .checked_mul(ways as u128)?
            .checked_mul(multiplier as u128)?
            / PAY_SCALE;
        u64::try_from(raw).ok().map(Self)
    }

    /// Sum a sequence of amounts, failing on overflow.
    pub fn sum<I: IntoIterator<Item = Money>>(iter: I) -> Result<Money, MoneyError> {
        iter.into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
            .ok_or(MoneyError::Overflow)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / MINOR_UNITS, self.0 % MINOR_UNITS)
    }
}

impl FromStr for Money {
    type Err = MoneyError;

    /// Parses `"12"`, `"12.3"` or `"12.34"`. More than two decimals is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MoneyError::Invalid(s.to_string());
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, ""),
        };
        if major.is_empty() || minor.len() > 2 {
            return Err(invalid());
        }
        let major: u64 = major.parse().map_err(|_| invalid())?;
        let minor: u64 = match minor.len() {
            0 => 0,
            1 => minor.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => minor.parse().map_err(|_| invalid())?,
        };
        major
            .checked_mul(MINOR_UNITS)
            .and_then(|m| m.checked_add(minor))
            .map(Self)
            .ok_or(MoneyError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_parse() {
        let m: Money = "12.34".parse().unwrap();
        assert_eq!(m.minor(), 1234);
        assert_eq!(m.to_string(), "12.34");
        assert_eq!("7".parse::<Money>().unwrap(), Money::from_minor(700));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_minor(50));
        assert!("1.234".parse::<Money>().is_err());
        assert!(".5".parse::<Money>().is_err());
    }

    #[test]
    fn test_scaled_win_is_exact() {
        // 1.00 bet, pay 0.5x, 6 ways, 3x multiplier = 9.00
        let win = Money::from_minor(100).scaled_win(50, 6, 3).unwrap();
        assert_eq!(win, Money::from_minor(900));
    }

    #[test]
    fn test_scaled_win_rounds_toward_zero() {
        // 0.01 bet × 0.5x = 0.005 -> 0
        let win = Money::from_minor(1).scaled_win(50, 1, 1).unwrap();
        assert_eq!(win, Money::ZERO);
    }

    #[test]
    fn test_repeated_cascade_sums_do_not_drift() {
        // A float accumulation of 0.1 a thousand times drifts; integer cents do not.
        let step = Money::from_minor(10);
        let total = Money::sum(std::iter::repeat(step).take(1000)).unwrap();
        assert_eq!(total, Money::from_minor(10_000));
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(Money::from_minor(u64::MAX).checked_add(Money::from_minor(1)).is_none());
        assert_eq!(
            Money::sum([Money::from_minor(u64::MAX), Money::from_minor(1)]),
            Err(MoneyError::Overflow)
        );
    }

    proptest::proptest! {
        #[test]
        fn scaled_win_never_exceeds_exact_product(
            bet in 0u64..10_000_000,
            pay in 0u32..100_000,
            ways in 1u32..8_000,
            multiplier in 1u32..20,
        ) {
            let win = Money::from_minor(bet).scaled_win(pay, ways, multiplier).unwrap();
            let exact = bet as u128 * pay as u128 * ways as u128 * multiplier as u128;
            proptest::prop_assert!(win.minor() as u128 * PAY_SCALE <= exact);
            proptest::prop_assert!(exact - win.minor() as u128 * PAY_SCALE < PAY_SCALE);
        }
    }
}
