//! Exact conversion between human decimal strings and fixed-point integers.
//!
//! Token amounts travel over the wire as decimal strings (`"100.5"`) but are
//! passed to contracts as integers scaled by the token's decimals
//! (`100_500_000` for a 6-decimal token). All arithmetic here is done on
//! [`U256`] digit by digit; floating point is never involved.
//!
//! [`parse_units`] is lenient and maps any malformed input to zero.
//! [`try_parse_units`] reports why the input was rejected, and is what request
//! validation uses so that a typo never silently becomes a zero-value deposit.

use alloy_primitives::U256;

/// Decimals of the escrowed stable token.
pub const TOKEN_DECIMALS: u8 = 6;

/// Decimals of the chain's native gas currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Reasons a decimal string cannot be converted to a fixed-point integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// The input was empty or only whitespace.
    #[error("amount is empty")]
    Empty,
    /// The input is not a non-negative decimal number.
    #[error("amount must be a non-negative decimal number")]
    Malformed,
    /// The input has more fractional digits than the target precision.
    #[error("amount has more than {0} fractional digits")]
    TooPrecise(u8),
    /// The scaled value does not fit in 256 bits.
    #[error("amount does not fit in 256 bits")]
    Overflow,
}

/// Parses a decimal string into an integer scaled by `10^decimals`.
///
/// Accepts plain integers (`"12"`), decimals (`"12.5"`, `".5"`, `"12."`) and
/// surrounding whitespace. Signs, exponents and separators are rejected.
///
/// # Errors
///
/// Returns [`AmountError`] if the input is empty, malformed, more precise than
/// `decimals`, or overflows [`U256`].
pub fn try_parse_units(input: &str, decimals: u8) -> Result<U256, AmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(AmountError::Empty);
    }
    let (whole, fraction) = input.split_once('.').unwrap_or((input, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::Malformed);
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(fraction) {
        return Err(AmountError::Malformed);
    }
    if fraction.len() > usize::from(decimals) {
        return Err(AmountError::TooPrecise(decimals));
    }
    let padded = format!("{fraction:0<width$}", width = usize::from(decimals));
    let value = accumulate(U256::ZERO, whole)?;
    accumulate(value, &padded)
}

/// Parses a decimal string, returning zero for any input [`try_parse_units`] rejects.
#[must_use]
pub fn parse_units(input: &str, decimals: u8) -> U256 {
    try_parse_units(input, decimals).unwrap_or(U256::ZERO)
}

/// Formats a fixed-point integer as a decimal string.
///
/// Trailing fractional zeros are dropped, and a value with no fractional part
/// is printed without a decimal point.
#[must_use]
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = usize::from(decimals);
    if decimals == 0 {
        return digits;
    }
    let digits = if digits.len() <= decimals {
        format!("{digits:0>width$}", width = decimals + 1)
    } else {
        digits
    };
    let (whole, fraction) = digits.split_at(digits.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_owned()
    } else {
        format!("{whole}.{fraction}")
    }
}

fn accumulate(start: U256, digits: &str) -> Result<U256, AmountError> {
    let ten = U256::from(10u8);
    digits.bytes().try_fold(start, |acc, b| {
        acc.checked_mul(ten)
            .and_then(|v| v.checked_add(U256::from(b - b'0')))
            .ok_or(AmountError::Overflow)
    })
}
