//! Human-readable status reports.
//!
//! Formats the detector's read-only surfaces: the feed snapshot and the
//! recent-classification log. Cadence is up to the caller.

use botwatch_core::{ClassificationResult, FeedSnapshot, SignalStatus};
use botwatch_detection::DetectionStats;
use std::fmt;

/// Point-in-time status of a running detector.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub feed: FeedSnapshot,
    pub feed_connected: bool,
    /// Newest first.
    pub recent: Vec<ClassificationResult>,
    pub stats: DetectionStats,
}

/// One-line summary of a classification.
pub fn summarize(result: &ClassificationResult) -> String {
    let signals: Vec<String> = result
        .signals
        .iter()
        .map(|(kind, reading)| {
            let marker = match reading.status {
                SignalStatus::Measured => "",
                SignalStatus::InsufficientData => " (insufficient data)",
                SignalStatus::Informational => " (info)",
            };
            format!("{}={:.2}{}", kind.name(), reading.score, marker)
        })
        .collect();

    format!(
        "{} tx {}: score {:.2} {:?} [{}]",
        result.trader,
        result.tx_ref,
        result.bot_score,
        result.verdict,
        signals.join(", ")
    )
}

impl fmt::Display for MonitorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.feed.is_empty() {
            writeln!(f, "Waiting for price data...")?;
        } else {
            writeln!(
                f,
                "Live prices ({}):",
                if self.feed_connected { "connected" } else { "disconnected" }
            )?;
            for (asset, quote) in self.feed.iter() {
                writeln!(
                    f,
                    "   {}: ${:.2} (±${:.2})",
                    asset, quote.price, quote.confidence
                )?;
            }
        }

        writeln!(
            f,
            "Classified {} trades: {} human, {} suspicious, {} bot",
            self.stats.classified, self.stats.human, self.stats.suspicious, self.stats.bot
        )?;
        for result in &self.recent {
            writeln!(f, "   {}", summarize(result))?;
        }
        Ok(())
    }
}
