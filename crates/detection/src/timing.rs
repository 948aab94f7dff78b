//! Inter-trade timing regularity.
//!
//! Computes the coefficient of variation of the gaps between a trader's most
//! recent trades. Near-constant spacing (a loop with a fixed sleep) gives a
//! CV near zero.

use chrono::{DateTime, Utc};
use statrs::statistics::Statistics;

/// Minimum number of intervals (so three trades) before timing is scored.
pub const MIN_INTERVALS: usize = 2;

/// Summary of the examined intervals.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalStats {
    /// Number of intervals examined.
    pub count: usize,
    /// Mean interval in seconds.
    pub mean_secs: f64,
    /// Population standard deviation in seconds.
    pub std_secs: f64,
    /// Coefficient of variation (std / mean). Zero when every gap is zero.
    pub cv: f64,
}

/// Interval statistics over the last `window` gaps.
///
/// `timestamps` is in recording order. The trailing `window + 1` entries are
/// sorted before differencing, so late arrivals do not produce negative gaps.
/// Returns `None` with fewer than [`MIN_INTERVALS`] gaps.
pub fn interval_stats(timestamps: &[DateTime<Utc>], window: usize) -> Option<IntervalStats> {
    let window = window.max(MIN_INTERVALS);
    let take = timestamps.len().min(window + 1);
    if take < MIN_INTERVALS + 1 {
        return None;
    }

    let mut recent: Vec<DateTime<Utc>> = timestamps[timestamps.len() - take..].to_vec();
    recent.sort();

    let intervals: Vec<f64> = recent
        .windows(2)
        .map(|w| (w[1] - w[0]).num_milliseconds() as f64 / 1000.0)
        .collect();

    let mean = intervals.iter().mean();
    let std = intervals.iter().population_std_dev();
    let cv = if mean > 0.0 { std / mean } else { 0.0 };

    Some(IntervalStats {
        count: intervals.len(),
        mean_secs: mean,
        std_secs: std,
        cv,
    })
}

/// Map a CV onto [0, 1]: 0 -> 1.0 (clockwork), `cv_ceiling` and above -> 0.0.
pub fn regularity_score(cv: f64, cv_ceiling: f64) -> f64 {
    if !cv.is_finite() || cv_ceiling <= 0.0 {
        return 0.0;
    }
    (1.0 - cv / cv_ceiling).clamp(0.0, 1.0)
}
