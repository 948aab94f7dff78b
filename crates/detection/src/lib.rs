//! Trade behavior classification for the botwatch system.
//!
//! This crate handles:
//! - Amount precision scoring
//! - Inter-trade timing regularity (coefficient of variation)
//! - Price deviation against the live quote's confidence band
//! - Weighted combination into a bot score
//! - The detection engine and its recent-classification log

pub mod precision;
pub mod timing;
pub mod deviation;
pub mod classifier;
pub mod engine;

pub use classifier::BehaviorClassifier;
pub use engine::{BotDetector, DetectionStats};
pub use timing::IntervalStats;
