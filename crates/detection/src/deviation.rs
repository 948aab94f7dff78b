//! Price deviation signal.
//!
//! Measures how far a trade's execution price sits from the live quote, in
//! units of the quote's confidence interval. Fills far outside the band look
//! like automated arbitrage.

use botwatch_core::PriceQuote;

/// Distance of `price` from the quote, in confidence bands.
///
/// A zero-confidence quote treats any nonzero deviation as infinitely far.
pub fn deviation_bands(quote: &PriceQuote, price: f64) -> f64 {
    let diff = (price - quote.price).abs();
    if quote.confidence > 0.0 {
        diff / quote.confidence
    } else if diff > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// Map a band distance onto [0, 1].
///
/// Inside the band scores 0; `saturation_bands` or more scores 1; linear in
/// between.
pub fn score_bands(bands: f64, saturation_bands: f64) -> f64 {
    if bands.is_nan() || bands <= 1.0 {
        return 0.0;
    }
    if bands.is_infinite() || saturation_bands <= 1.0 {
        return 1.0;
    }
    ((bands - 1.0) / (saturation_bands - 1.0)).min(1.0)
}

/// Price-deviation sub-score for a fill against a quote.
pub fn deviation_score(quote: &PriceQuote, price: f64, saturation_bands: f64) -> f64 {
    score_bands(deviation_bands(quote, price), saturation_bands)
}
