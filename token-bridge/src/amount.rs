//! # Token Amounts
//!
//! Token quantities are carried as 18-decimal fixed-point integers ("wei"), the same unit the
//! token contract uses on chain. Nothing in the bridge converts to floating point except
//! [`TokenAmount::to_f64`], which exists for display and reporting only.

use std::fmt;
use std::iter::Sum;

use alloy::primitives::utils::format_units;
use alloy::primitives::U256;

/// Number of decimals used by the on-chain token.
pub const TOKEN_DECIMALS: u8 = 18;

/// One whole token expressed in base units.
pub const WEI_PER_TOKEN: u64 = 1_000_000_000_000_000_000;

/// A non-negative token quantity in 18-decimal base units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(U256);

impl TokenAmount {
    /// The zero amount.
    pub const ZERO: TokenAmount = TokenAmount(U256::ZERO);

    /// Wraps a raw base-unit value as read from the chain.
    pub const fn from_wei(wei: U256) -> Self {
        Self(wei)
    }

    /// Builds an amount from a whole number of tokens.
    pub fn from_tokens(tokens: u64) -> Self {
        Self(U256::from(tokens) * U256::from(WEI_PER_TOKEN))
    }

    /// The raw base-unit value, suitable for contract calls.
    pub const fn as_wei(&self) -> U256 {
        self.0
    }

    /// Returns `true` if this amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction; `None` if `other` is larger than `self`.
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Subtraction clamped at zero.
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Lossy conversion for display. Never feed the result back into ledger arithmetic.
    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::MAX)
    }
}

impl From<U256> for TokenAmount {
    fn from(wei: U256) -> Self {
        Self::from_wei(wei)
    }
}

impl Sum for TokenAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.fold(U256::ZERO, |acc, amount| acc.saturating_add(amount.0)))
    }
}

impl<'a> Sum<&'a TokenAmount> for TokenAmount {
    fn sum<I: Iterator<Item = &'a TokenAmount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl fmt::Display for TokenAmount {
    /// Renders the amount in whole tokens with trailing zeros trimmed, e.g. `9000.0` or `0.25`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = format_units(self.0, TOKEN_DECIMALS).map_err(|_| fmt::Error)?;
        let rendered = match rendered.split_once('.') {
            Some((whole, fraction)) => {
                let fraction = fraction.trim_end_matches('0');
                if fraction.is_empty() {
                    format!("{whole}.0")
                } else {
                    format!("{whole}.{fraction}")
                }
            }
            None => format!("{rendered}.0"),
        };
        f.write_str(&rendered)
    }
}
