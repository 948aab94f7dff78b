//! Deterministic scenario replay through the detection engine.

use botwatch_core::{ClassificationResult, Config, FeedSnapshot, PriceQuote, Result, Verdict};
use botwatch_detection::{BotDetector, DetectionStats};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::scenario::Scenario;

/// Outcome of replaying one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub scenario: Scenario,
    pub trader: String,
    /// One result per trade, in replay order.
    pub results: Vec<ClassificationResult>,
    pub stats: DetectionStats,
}

impl ReplayReport {
    /// Verdict of the last trade, which has seen the whole pattern.
    pub fn final_verdict(&self) -> Option<Verdict> {
        self.results.last().map(|r| r.verdict)
    }

    pub fn max_score(&self) -> f64 {
        self.results
            .iter()
            .map(|r| r.bot_score)
            .fold(0.0, f64::max)
    }
}

/// Replays scenarios against a fresh detector each run.
pub struct ScenarioRunner {
    config: Config,
    quote: Option<PriceQuote>,
    start: DateTime<Utc>,
}

impl ScenarioRunner {
    pub fn new(config: Config, start: DateTime<Utc>) -> Self {
        Self {
            config,
            quote: None,
            start,
        }
    }

    /// Replay with a fixed quote so fills are scored for price deviation.
    pub fn with_quote(mut self, quote: PriceQuote) -> Self {
        self.quote = Some(quote);
        self
    }

    /// Run one scenario. Decision times equal trade times, so reports are
    /// reproducible.
    pub fn run(&self, scenario: Scenario, trader: &str) -> Result<ReplayReport> {
        let feed = match &self.quote {
            Some(q) => FeedSnapshot::from_quotes(vec![PriceQuote {
                observed_at: self.start,
                ..q.clone()
            }]),
            None => FeedSnapshot::empty(),
        };
        let detector = BotDetector::new(&self.config, feed);

        let mut results = Vec::new();
        for observation in scenario.observations(trader, self.start, self.quote.as_ref()) {
            let decided_at = observation.timestamp;
            results.push(detector.observe_at(observation, decided_at)?);
        }

        Ok(ReplayReport {
            scenario,
            trader: trader.to_string(),
            results,
            stats: detector.stats(),
        })
    }
}
