//! Monetary amounts in integer cents.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// A non-negative amount held in cents and rendered with two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(u64);

/// Raised when a decimal string is not a valid amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid amount {0:?}: expected digits with at most two decimals")]
pub struct AmountError(String);

impl Amount {
    /// Wrap a number of cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self { Self(cents) }

    /// Return the amount in cents.
    #[must_use]
    pub const fn cents(self) -> u64 { self.0 }
}

impl fmt::Display for Amount {
    #[expect(
        clippy::integer_division,
        clippy::integer_division_remainder_used,
        reason = "splitting cents into whole units and remainder"
    )]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || AmountError(raw.to_owned());
        let text = raw.trim();
        let (units, hundredths) = text.split_once('.').unwrap_or((text, ""));
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (units.is_empty() && hundredths.is_empty())
            || hundredths.len() > 2
            || !digits(units)
            || !digits(hundredths)
        {
            return Err(invalid());
        }
        let whole: u64 = if units.is_empty() { 0 } else { units.parse().map_err(|_| invalid())? };
        let frac: u64 = match hundredths.len() {
            0 => 0,
            1 => hundredths.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => hundredths.parse().map_err(|_| invalid())?,
        };
        whole
            .checked_mul(100)
            .and_then(|cents| cents.checked_add(frac))
            .map(Self)
            .ok_or_else(invalid)
    }
}
