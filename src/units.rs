//! Fixed-point conversion between base units and decimal strings.
//!
//! On-chain amounts are integers in the token's smallest unit. Displaying
//! them divides by `10^decimals`; parsing user input multiplies back.

use std::fmt;

/// Decimals of ether and of most ERC-20 tokens.
pub const ETHER_DECIMALS: u32 = 18;

/// Error type for amount parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    Empty,
    InvalidDigit(char),
    /// More fractional digits than the unit allows.
    TooPrecise { decimals: u32 },
    Overflow,
}

impl fmt::Display for UnitsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitsError::Empty => write!(f, "amount is empty"),
            UnitsError::InvalidDigit(c) => write!(f, "amount contains invalid character {:?}", c),
            UnitsError::TooPrecise { decimals } => {
                write!(f, "amount has more than {} decimal places", decimals)
            }
            UnitsError::Overflow => write!(f, "amount is too large"),
        }
    }
}

impl std::error::Error for UnitsError {}

fn scale(decimals: u32) -> Result<u128, UnitsError> {
    10u128.checked_pow(decimals).ok_or(UnitsError::Overflow)
}

/// Format base units as a decimal string with trailing zeros trimmed.
///
/// `format_units(1_500_000_000_000_000_000, 18) == "1.5"`, `format_units(0, 18) == "0"`.
pub fn format_units(amount: u128, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let Ok(scale) = scale(decimals) else {
        // Beyond u128 range every amount is below one whole unit.
        let digits = amount.to_string();
        let padded = format!("{:0>width$}", digits, width = decimals as usize);
        let fraction = padded.trim_end_matches('0');
        return if fraction.is_empty() {
            "0".to_string()
        } else {
            format!("0.{}", fraction)
        };
    };

    let whole = amount / scale;
    let fraction = amount % scale;
    if fraction == 0 {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", fraction, width = decimals as usize);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Parse a decimal string into base units.
pub fn parse_units(input: &str, decimals: u32) -> Result<u128, UnitsError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UnitsError::Empty);
    }

    let (whole, fraction) = match input.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (input, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(UnitsError::Empty);
    }
    if let Some(bad) = whole
        .chars()
        .chain(fraction.chars())
        .find(|c| !c.is_ascii_digit())
    {
        return Err(UnitsError::InvalidDigit(bad));
    }

    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(UnitsError::TooPrecise { decimals });
    }

    let scale = scale(decimals)?;
    let whole: u128 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| UnitsError::Overflow)?
    };
    let fraction_units: u128 = if fraction.is_empty() {
        0
    } else {
        let padded = format!("{:0<width$}", fraction, width = decimals as usize);
        padded.parse().map_err(|_| UnitsError::Overflow)?
    };

    whole
        .checked_mul(scale)
        .and_then(|v| v.checked_add(fraction_units))
        .ok_or(UnitsError::Overflow)
}

/// Format wei as ether.
pub fn format_ether(wei: u128) -> String {
    format_units(wei, ETHER_DECIMALS)
}

/// Parse an ether amount into wei.
pub fn parse_ether(input: &str) -> Result<u128, UnitsError> {
    parse_units(input, ETHER_DECIMALS)
}
