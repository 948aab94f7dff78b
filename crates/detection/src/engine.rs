//! Detection engine.
//!
//! Wires the trade recorder, the classifier and a quote source together and
//! keeps a bounded log of recent classifications for status reporting.

use botwatch_core::{
    ClassificationResult, Config, FeedSnapshot, QuoteSource, Result, TradeObservation, Verdict,
};
use botwatch_ingestion::TradeEventRecorder;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::classifier::BehaviorClassifier;

/// Counters over everything the engine has classified.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionStats {
    pub classified: u64,
    pub human: u64,
    pub suspicious: u64,
    pub bot: u64,
    /// Observations rejected by the recorder.
    pub rejected: u64,
    /// Observations recorded with out-of-order timestamps.
    pub timing_anomalies: u64,
}

impl DetectionStats {
    /// Fraction of classified trades that were banded as bots.
    pub fn bot_frac(&self) -> f64 {
        if self.classified > 0 {
            self.bot as f64 / self.classified as f64
        } else {
            0.0
        }
    }
}

struct Log {
    recent: VecDeque<ClassificationResult>,
    stats: DetectionStats,
}

/// Bot detection engine over an injected quote source.
pub struct BotDetector<S> {
    recorder: TradeEventRecorder,
    classifier: BehaviorClassifier,
    quotes: S,
    log: Mutex<Log>,
    log_capacity: usize,
}

impl<S: QuoteSource> BotDetector<S> {
    /// Create an engine. The classification log is bounded like trader history.
    pub fn new(config: &Config, quotes: S) -> Self {
        let capacity = config.recorder.history_capacity.max(1);
        Self {
            recorder: TradeEventRecorder::new(capacity),
            classifier: BehaviorClassifier::new(config.classifier.clone()),
            quotes,
            log: Mutex::new(Log {
                recent: VecDeque::with_capacity(capacity),
                stats: DetectionStats::default(),
            }),
            log_capacity: capacity,
        }
    }

    /// Record a confirmed trade and classify it.
    pub fn observe(&self, observation: TradeObservation) -> Result<ClassificationResult> {
        self.observe_at(observation, Utc::now())
    }

    /// Same as [`observe`](Self::observe) with an explicit decision time.
    pub fn observe_at(
        &self,
        observation: TradeObservation,
        decided_at: DateTime<Utc>,
    ) -> Result<ClassificationResult> {
        let receipt = match self.recorder.record(observation.clone()) {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(trader = %observation.trader, tx = %observation.tx_ref, "Rejected trade: {}", e);
                self.lock_log().stats.rejected += 1;
                return Err(e);
            }
        };

        let result = self.classify_at(&observation, decided_at);

        match result.verdict {
            Verdict::Bot => info!(
                trader = %result.trader,
                tx = %result.tx_ref,
                score = result.bot_score,
                "Bot-like trade detected"
            ),
            _ => debug!(
                trader = %result.trader,
                tx = %result.tx_ref,
                score = result.bot_score,
                verdict = ?result.verdict,
                "Trade classified"
            ),
        }

        let mut log = self.lock_log();
        if receipt.timing_anomaly {
            log.stats.timing_anomalies += 1;
        }
        log.stats.classified += 1;
        match result.verdict {
            Verdict::Human => log.stats.human += 1,
            Verdict::Suspicious => log.stats.suspicious += 1,
            Verdict::Bot => log.stats.bot += 1,
        }
        while log.recent.len() >= self.log_capacity {
            log.recent.pop_front();
        }
        log.recent.push_back(result.clone());

        Ok(result)
    }

    /// Classify an observation against current state without recording it.
    pub fn classify(&self, observation: &TradeObservation) -> ClassificationResult {
        self.classify_at(observation, Utc::now())
    }

    fn classify_at(
        &self,
        observation: &TradeObservation,
        decided_at: DateTime<Utc>,
    ) -> ClassificationResult {
        let history = self.recorder.history(&observation.trader);
        let feed = self.quotes.snapshot();
        self.classifier
            .classify(&history, observation, &feed, decided_at)
    }

    /// Most recent classifications, newest first.
    pub fn recent_classifications(&self, limit: usize) -> Vec<ClassificationResult> {
        self.lock_log()
            .recent
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Most recent classifications for one trader, newest first.
    pub fn recent_for_trader(&self, trader: &str, limit: usize) -> Vec<ClassificationResult> {
        self.lock_log()
            .recent
            .iter()
            .rev()
            .filter(|r| r.trader == trader)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> DetectionStats {
        self.lock_log().stats.clone()
    }

    /// Current quote snapshot from the injected source.
    pub fn feed_snapshot(&self) -> FeedSnapshot {
        self.quotes.snapshot()
    }

    pub fn history(&self, trader: &str) -> Vec<TradeObservation> {
        self.recorder.history(trader)
    }

    pub fn recorder(&self) -> &TradeEventRecorder {
        &self.recorder
    }

    pub fn quotes(&self) -> &S {
        &self.quotes
    }

    fn lock_log(&self) -> MutexGuard<'_, Log> {
        match self.log.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use botwatch_core::{Error, PriceQuote, SignalKind};
    use botwatch_ingestion::{ChannelTransport, PriceFeedIngestor};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn trade(trader: &str, amount: Decimal, secs: i64, tx: &str) -> TradeObservation {
        TradeObservation::new(trader, amount, t0() + Duration::seconds(secs), tx)
    }

    fn small_config(capacity: usize) -> Config {
        let mut config = Config::default();
        config.recorder.history_capacity = capacity;
        config
    }

    #[test]
    fn test_observe_records_and_logs() {
        let detector = BotDetector::new(&Config::default(), FeedSnapshot::empty());
        let result = detector.observe(trade("a", dec!(1.547329), 0, "tx1")).unwrap();

        assert_eq!(result.tx_ref, "tx1");
        assert_eq!(detector.history("a").len(), 1);
        assert_eq!(detector.recent_classifications(10).len(), 1);
        assert_eq!(detector.stats().classified, 1);
    }

    #[test]
    fn test_rejected_observation_not_logged() {
        let detector = BotDetector::new(&Config::default(), FeedSnapshot::empty());
        let err = detector.observe(trade("a", dec!(0), 0, "tx1")).unwrap_err();
        assert!(matches!(err, Error::InvalidObservation(_)));
        assert!(detector.recent_classifications(10).is_empty());
        assert_eq!(detector.stats().rejected, 1);
    }

    #[test]
    fn test_recent_log_bounded_newest_first() {
        let detector = BotDetector::new(&small_config(3), FeedSnapshot::empty());
        for i in 0..5 {
            detector
                .observe_at(trade("a", dec!(1.0), i * 10, &format!("tx{i}")), t0())
                .unwrap();
        }

        let recent = detector.recent_classifications(10);
        let ids: Vec<_> = recent.iter().map(|r| r.tx_ref.as_str()).collect();
        assert_eq!(ids, vec!["tx4", "tx3", "tx2"]);
        assert_eq!(detector.recent_classifications(1).len(), 1);
        assert_eq!(detector.history("a").len(), 3);
    }

    #[test]
    fn test_recent_for_trader() {
        let detector = BotDetector::new(&Config::default(), FeedSnapshot::empty());
        detector.observe(trade("a", dec!(1.0), 0, "a1")).unwrap();
        detector.observe(trade("b", dec!(1.0), 0, "b1")).unwrap();
        detector.observe(trade("a", dec!(1.0), 5, "a2")).unwrap();

        let for_a = detector.recent_for_trader("a", 10);
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].tx_ref, "a2");
    }

    #[test]
    fn test_consistent_bot_pattern_escalates() {
        let detector = BotDetector::new(&Config::default(), FeedSnapshot::empty());
        let mut verdicts = Vec::new();
        for i in 1..=5i64 {
            let amount = Decimal::new(i * 1_000_000 + 547_329 + i, 6);
            let result = detector
                .observe(trade("bot", amount, (i - 1) * 10, &format!("tx{i}")))
                .unwrap();
            verdicts.push(result.verdict);
        }
        assert_eq!(verdicts[0], Verdict::Suspicious);
        assert_eq!(verdicts[4], Verdict::Bot);
        assert_eq!(detector.stats().bot, 3);
    }

    #[test]
    fn test_out_of_order_counted() {
        let detector = BotDetector::new(&Config::default(), FeedSnapshot::empty());
        detector.observe(trade("a", dec!(1.0), 100, "tx1")).unwrap();
        let result = detector.observe(trade("a", dec!(1.0), 50, "tx2")).unwrap();
        assert!(result.signal(SignalKind::TimingAnomaly).is_some());
        assert_eq!(detector.stats().timing_anomalies, 1);
        assert_eq!(detector.recorder().timing_anomalies("a"), 1);
    }

    #[test]
    fn test_classify_without_recording_is_pure() {
        let feed = FeedSnapshot::from_quotes(vec![PriceQuote {
            asset: "ETH/USD".to_string(),
            price: 2000.0,
            confidence: 0.5,
            observed_at: t0(),
        }]);
        let detector = BotDetector::new(&Config::default(), feed);
        detector.observe(trade("a", dec!(1.0), 0, "tx1")).unwrap();

        let probe = trade("a", dec!(2.5), 3, "probe").with_execution("ETH/USD", 2000.2);
        let a = detector.classify(&probe);
        let b = detector.classify(&probe);
        assert!(a.same_outcome(&b));
        assert_eq!(detector.history("a").len(), 1);
        assert_eq!(detector.stats().classified, 1);
        assert_relative_eq!(a.signal(SignalKind::PriceDeviation).unwrap().score, 0.0);
    }

    #[tokio::test]
    async fn test_live_ingestor_as_quote_source() {
        let (publisher, transport) = ChannelTransport::new(8);
        let ingestor = Arc::new(PriceFeedIngestor::new(
            Arc::new(transport),
            std::time::Duration::from_secs(1),
        ));
        let detector = BotDetector::new(&Config::default(), ingestor.clone());

        publisher
            .send(botwatch_ingestion::FeedUpdate {
                asset: "ETH/USD".to_string(),
                price: 2000.0,
                confidence: 0.5,
                observed_at: Some(t0()),
            })
            .await
            .unwrap();
        ingestor.start().await.unwrap();

        let result = detector
            .observe(trade("a", dec!(1.0), 1, "tx1").with_execution("ETH/USD", 2010.0))
            .unwrap();
        assert_relative_eq!(result.signal(SignalKind::PriceDeviation).unwrap().score, 1.0);
        assert_eq!(detector.feed_snapshot().len(), 1);
        ingestor.stop();
    }
}
