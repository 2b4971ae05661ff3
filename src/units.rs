//! Decimal amount conversion into chain base units.
use crate::error::WatchError;
use primitive_types::U256;

/// Decimals of the native EVM unit (ether -> wei).
pub const ETHER_DECIMALS: u32 = 18;

/// Convert a decimal string such as `"0.25"` into base units with `decimals`
/// fractional digits.
///
/// Conversion is exact: fractional digits beyond `decimals` are rejected
/// rather than rounded, so a match can never be broadened silently.
pub fn parse_units(amount: &str, decimals: u32) -> Result<U256, WatchError> {
    let invalid = |why: &str| WatchError::InvalidAmount(format!("`{amount}`: {why}"));
    let s = amount.trim();
    if s.is_empty() {
        return Err(invalid("empty"));
    }

    let (whole, frac) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid("not a non-negative decimal"));
    }

    let frac = frac.trim_end_matches('0');
    if frac.len() > decimals as usize {
        return Err(invalid("more fractional digits than the unit allows"));
    }

    let digits = format!(
        "{}{}{}",
        if whole.is_empty() { "0" } else { whole },
        frac,
        "0".repeat(decimals as usize - frac.len())
    );
    U256::from_dec_str(&digits).map_err(|_| invalid("overflows 256 bits"))
}
