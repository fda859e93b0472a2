// src/amount.rs
//
// USDC uses 6 decimals on every supported chain. Amounts headed for the chain
// are integers scaled by 10^6; amounts headed for Stripe are integer cents.

use std::fmt;

use alloy::primitives::U256;
use thiserror::Error;

pub const USDC_DECIMALS: u32 = 6;
const UNIT: u128 = 10u128.pow(USDC_DECIMALS);
const UNITS_PER_CENT: u128 = UNIT / 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,
    #[error("amount must not be negative: {0}")]
    Negative(String),
    #[error("amount is not a decimal number: {0}")]
    NotNumeric(String),
    #[error("amount has more than {USDC_DECIMALS} fractional digits: {0}")]
    TooPrecise(String),
    #[error("amount is too large: {0}")]
    Overflow(String),
}

/// An amount of USDC in base units (1 USDC = 1_000_000).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UsdcAmount(u128);

impl UsdcAmount {
    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn base_units(self) -> u128 {
        self.0
    }

    pub fn to_u256(self) -> U256 {
        U256::from(self.0)
    }

    /// Saturates at `u128::MAX`; allowances are routinely set to `U256::MAX`.
    pub fn from_u256(value: U256) -> Self {
        Self(u128::try_from(value).unwrap_or(u128::MAX))
    }

    pub fn from_cents(cents: u64) -> Self {
        Self(u128::from(cents) * UNITS_PER_CENT)
    }

    /// Rounds half up to the nearest cent; this is the single rounding step
    /// allowed between the chain and fiat representations.
    pub fn to_cents_rounded(self) -> u128 {
        (self.0 + UNITS_PER_CENT / 2) / UNITS_PER_CENT
    }
}

impl fmt::Display for UsdcAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_units(self.0))
    }
}

impl std::str::FromStr for UsdcAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_units(s).map(Self)
    }
}

/// Parses a decimal string such as `"9.99"` into 6-decimal base units.
pub fn parse_units(input: &str) -> Result<u128, AmountError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(AmountError::Empty);
    }
    if s.starts_with('-') {
        return Err(AmountError::Negative(s.to_string()));
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
    if int_part.is_empty() || !all_digits(int_part) || !all_digits(frac_part) {
        return Err(AmountError::NotNumeric(s.to_string()));
    }
    if s.contains('.') && frac_part.is_empty() {
        return Err(AmountError::NotNumeric(s.to_string()));
    }
    if frac_part.len() > USDC_DECIMALS as usize {
        return Err(AmountError::TooPrecise(s.to_string()));
    }

    let overflow = || AmountError::Overflow(s.to_string());
    let whole: u128 = int_part.parse().map_err(|_| overflow())?;

    let mut frac: u128 = 0;
    if !frac_part.is_empty() {
        let padded = format!("{frac_part:0<width$}", width = USDC_DECIMALS as usize);
        frac = padded.parse().map_err(|_| overflow())?;
    }

    whole
        .checked_mul(UNIT)
        .and_then(|w| w.checked_add(frac))
        .ok_or_else(overflow)
}

/// Inverse of [`parse_units`]; trailing fractional zeros are dropped.
pub fn format_units(units: u128) -> String {
    let whole = units / UNIT;
    let frac = units % UNIT;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{frac:0width$}", width = USDC_DECIMALS as usize);
    format!("{whole}.{}", frac.trim_end_matches('0'))
}

/// Whole days to seconds, as plan durations are stored on-chain.
pub fn days_to_seconds(days: u32) -> u64 {
    u64::from(days) * 24 * 60 * 60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_usdc_prices() {
        assert_eq!(parse_units("9.99"), Ok(9_990_000));
        assert_eq!(parse_units("0.000001"), Ok(1));
        assert_eq!(parse_units("12"), Ok(12_000_000));
        assert_eq!(parse_units(" 1.5 "), Ok(1_500_000));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_units(""), Err(AmountError::Empty));
        assert!(matches!(parse_units("-1"), Err(AmountError::Negative(_))));
        assert!(matches!(parse_units("abc"), Err(AmountError::NotNumeric(_))));
        assert!(matches!(parse_units("1.2.3"), Err(AmountError::NotNumeric(_))));
        assert!(matches!(parse_units("1."), Err(AmountError::NotNumeric(_))));
        assert!(matches!(parse_units(".5"), Err(AmountError::NotNumeric(_))));
        assert!(matches!(parse_units("1e6"), Err(AmountError::NotNumeric(_))));
        assert!(matches!(parse_units("0.0000001"), Err(AmountError::TooPrecise(_))));
    }

    #[test]
    fn formatting_recovers_canonical_input() {
        for p in ["9.99", "0.000001", "123456.5", "1", "0.1", "42.123456"] {
            let units = parse_units(p).unwrap();
            assert_eq!(format_units(units), p);
        }
    }

    #[test]
    fn cents_conversion_is_exact() {
        let a = UsdcAmount::from_cents(999);
        assert_eq!(a.base_units(), 9_990_000);
        assert_eq!(a.to_cents_rounded(), 999);
        assert_eq!(a.to_string(), "9.99");

        // 9.994999 rounds down, 9.995 rounds up
        assert_eq!(UsdcAmount::from_base_units(9_994_999).to_cents_rounded(), 999);
        assert_eq!(UsdcAmount::from_base_units(9_995_000).to_cents_rounded(), 1000);
    }

    #[test]
    fn huge_allowance_saturates() {
        assert_eq!(UsdcAmount::from_u256(U256::MAX).base_units(), u128::MAX);
        assert_eq!(days_to_seconds(30), 2_592_000);
    }
}
