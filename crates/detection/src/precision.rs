//! Amount precision signal.
//!
//! Scripted traders tend to submit amounts with many significant decimals
//! (1.547329); people type round numbers (1.0, 5).

use rust_decimal::Decimal;

/// Digit count at which the precision signal saturates at 1.0.
pub const SATURATION_DIGITS: u32 = 6;

/// Digits after the decimal point, ignoring trailing zeros.
#[inline]
pub fn significant_fractional_digits(amount: Decimal) -> u32 {
    amount.normalize().scale()
}

/// Map digit count linearly onto [0, 1]: 0 digits -> 0.0, >= 6 digits -> 1.0.
#[inline]
pub fn score_digits(digits: u32) -> f64 {
    digits.min(SATURATION_DIGITS) as f64 / SATURATION_DIGITS as f64
}

/// Precision sub-score for an amount.
pub fn precision_score(amount: Decimal) -> f64 {
    score_digits(significant_fractional_digits(amount))
}
