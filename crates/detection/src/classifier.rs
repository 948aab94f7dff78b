//! Bot-likelihood classification of individual trades.
//!
//! Combines three sub-scores with fixed weights:
//! - precision of the traded amount
//! - regularity of the trader's recent inter-trade intervals
//! - distance of the fill from the live quote (only when a fresh quote exists)
//!
//! When the price signal is absent the remaining weights are renormalized.
//! Timing with too little history stays in the sum with a score of 0.

use botwatch_core::config::ClassifierConfig;
use botwatch_core::{
    ClassificationResult, FeedSnapshot, SignalKind, SignalReading, SignalStatus,
    TradeObservation, Verdict,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::{deviation, precision, timing};

/// Weight of the amount precision signal.
pub const PRECISION_WEIGHT: f64 = 0.4;
/// Weight of the timing regularity signal.
pub const TIMING_WEIGHT: f64 = 0.4;
/// Weight of the price deviation signal.
pub const PRICE_DEVIATION_WEIGHT: f64 = 0.2;

/// Stateless scorer; all inputs are passed to [`BehaviorClassifier::classify`].
#[derive(Debug, Clone)]
pub struct BehaviorClassifier {
    config: ClassifierConfig,
}

impl BehaviorClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Score `observation` against the trader's history and a feed snapshot.
    ///
    /// `history` is the trader's recorded trades, oldest first. If it contains
    /// the observation (matched by `tx_ref`), later entries are ignored; if not,
    /// the observation is treated as the newest trade.
    pub fn classify(
        &self,
        history: &[TradeObservation],
        observation: &TradeObservation,
        feed: &FeedSnapshot,
        decided_at: DateTime<Utc>,
    ) -> ClassificationResult {
        let trades = trades_through(history, observation);

        let mut present: Vec<(SignalKind, f64, f64, SignalStatus)> = Vec::with_capacity(3);

        present.push((
            SignalKind::Precision,
            precision::precision_score(observation.amount),
            PRECISION_WEIGHT,
            SignalStatus::Measured,
        ));

        let timestamps: Vec<DateTime<Utc>> = trades.iter().map(|t| t.timestamp).collect();
        match timing::interval_stats(&timestamps, self.config.timing_window) {
            Some(stats) => present.push((
                SignalKind::TimingRegularity,
                timing::regularity_score(stats.cv, self.config.cv_ceiling),
                TIMING_WEIGHT,
                SignalStatus::Measured,
            )),
            None => present.push((
                SignalKind::TimingRegularity,
                0.0,
                TIMING_WEIGHT,
                SignalStatus::InsufficientData,
            )),
        }

        if let Some(score) = self.price_deviation(observation, feed) {
            present.push((
                SignalKind::PriceDeviation,
                score,
                PRICE_DEVIATION_WEIGHT,
                SignalStatus::Measured,
            ));
        }

        let total_weight: f64 = present.iter().map(|(_, _, w, _)| w).sum();
        let mut signals = BTreeMap::new();
        let mut bot_score = 0.0;
        for (kind, score, weight, status) in present {
            let reading = SignalReading {
                score: score.clamp(0.0, 1.0),
                weight: weight / total_weight,
                status,
            };
            bot_score += reading.contribution();
            signals.insert(kind, reading);
        }
        let bot_score = bot_score.clamp(0.0, 1.0);

        let out_of_order = trades.len() >= 2
            && observation.timestamp < trades[trades.len() - 2].timestamp;
        if out_of_order {
            signals.insert(
                SignalKind::TimingAnomaly,
                SignalReading {
                    score: 1.0,
                    weight: 0.0,
                    status: SignalStatus::Informational,
                },
            );
        }

        ClassificationResult {
            trader: observation.trader.clone(),
            tx_ref: observation.tx_ref.clone(),
            bot_score,
            signals,
            verdict: self.verdict(bot_score),
            decided_at,
        }
    }

    /// Band a score using the configured thresholds.
    pub fn verdict(&self, bot_score: f64) -> Verdict {
        if bot_score >= self.config.bot_threshold {
            Verdict::Bot
        } else if bot_score >= self.config.suspicious_threshold {
            Verdict::Suspicious
        } else {
            Verdict::Human
        }
    }

    fn price_deviation(&self, observation: &TradeObservation, feed: &FeedSnapshot) -> Option<f64> {
        let asset = observation.asset.as_deref()?;
        let price = observation.execution_price?;
        let quote = feed.get(asset)?;

        let age_ms = (observation.timestamp - quote.observed_at)
            .num_milliseconds()
            .abs();
        if age_ms > self.config.max_quote_staleness_ms {
            return None;
        }

        Some(deviation::deviation_score(
            quote,
            price,
            self.config.deviation_saturation_bands,
        ))
    }
}

impl Default for BehaviorClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

/// History up to and including `observation`.
fn trades_through<'a>(
    history: &'a [TradeObservation],
    observation: &'a TradeObservation,
) -> Vec<&'a TradeObservation> {
    match history.iter().rposition(|t| t.tx_ref == observation.tx_ref) {
        Some(pos) => history[..=pos].iter().collect(),
        None => history.iter().chain(std::iter::once(observation)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use botwatch_core::PriceQuote;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn trade(amount: Decimal, secs: f64, tx: &str) -> TradeObservation {
        TradeObservation::new(
            "0xtrader",
            amount,
            t0() + Duration::milliseconds((secs * 1000.0) as i64),
            tx,
        )
    }

    fn eth_feed(price: f64, confidence: f64) -> FeedSnapshot {
        FeedSnapshot::from_quotes(vec![PriceQuote {
            asset: "ETH/USD".to_string(),
            price,
            confidence,
            observed_at: t0(),
        }])
    }

    fn classify_all(trades: &[TradeObservation], feed: &FeedSnapshot) -> ClassificationResult {
        let classifier = BehaviorClassifier::default();
        let last = trades.last().unwrap();
        classifier.classify(trades, last, feed, t0())
    }

    #[test]
    fn test_weights_sum_to_one() {
        assert_relative_eq!(PRECISION_WEIGHT + TIMING_WEIGHT + PRICE_DEVIATION_WEIGHT, 1.0);
    }

    #[test]
    fn test_first_trade_timing_insufficient() {
        let trades = vec![trade(dec!(1.547329), 0.0, "tx1")];
        let result = classify_all(&trades, &FeedSnapshot::empty());

        let timing = result.signal(SignalKind::TimingRegularity).unwrap();
        assert_eq!(timing.score, 0.0);
        assert_eq!(timing.status, SignalStatus::InsufficientData);
        assert!(result.signal(SignalKind::PriceDeviation).is_none());
        // Renormalized over precision + timing: 0.5 * 1.0 + 0.5 * 0.0
        assert_relative_eq!(result.bot_score, 0.5);
        assert_eq!(result.dominant_signal(), Some(SignalKind::Precision));
    }

    #[test]
    fn test_two_trades_still_insufficient() {
        let trades = vec![trade(dec!(1.0), 0.0, "tx1"), trade(dec!(2.0), 10.0, "tx2")];
        let result = classify_all(&trades, &FeedSnapshot::empty());
        let timing = result.signal(SignalKind::TimingRegularity).unwrap();
        assert_eq!(timing.score, 0.0);
        assert_eq!(timing.status, SignalStatus::InsufficientData);
        assert_eq!(result.bot_score, 0.0);
        assert_eq!(result.verdict, Verdict::Human);
    }

    #[test]
    fn test_round_amounts_regular_timing() {
        let trades = vec![
            trade(dec!(1.0), 0.0, "tx1"),
            trade(dec!(2.0), 10.0, "tx2"),
            trade(dec!(3.0), 20.0, "tx3"),
        ];
        let result = classify_all(&trades, &FeedSnapshot::empty());

        assert_relative_eq!(result.signal(SignalKind::TimingRegularity).unwrap().score, 1.0);
        assert_eq!(result.signal(SignalKind::Precision).unwrap().score, 0.0);
        assert_relative_eq!(result.bot_score, 0.5);
        assert_eq!(result.verdict, Verdict::Suspicious);
        assert_eq!(result.dominant_signal(), Some(SignalKind::TimingRegularity));
    }

    #[test]
    fn test_precise_amounts_irregular_pair() {
        let trades = vec![
            trade(dec!(1.547329), 0.0, "tx1"),
            trade(dec!(2.547331), 37.0, "tx2"),
        ];
        let result = classify_all(&trades, &FeedSnapshot::empty());

        assert_relative_eq!(result.signal(SignalKind::Precision).unwrap().score, 1.0);
        assert_eq!(
            result.signal(SignalKind::TimingRegularity).unwrap().status,
            SignalStatus::InsufficientData
        );
        assert_eq!(result.dominant_signal(), Some(SignalKind::Precision));
    }

    #[test]
    fn test_consistent_precise_pattern_is_bot() {
        let trades: Vec<_> = (1..=5)
            .map(|i| {
                let amount = Decimal::new(i * 1_000_000 + 547_329 + i, 6);
                trade(amount, (i - 1) as f64 * 10.0, &format!("tx{i}"))
            })
            .collect();
        let result = classify_all(&trades, &FeedSnapshot::empty());
        assert_relative_eq!(result.bot_score, 1.0);
        assert_eq!(result.verdict, Verdict::Bot);
    }

    #[test]
    fn test_price_deviation_included_with_fresh_quote() {
        let trades = vec![trade(dec!(1.0), 0.0, "tx1").with_execution("ETH/USD", 2002.0)];
        let result = classify_all(&trades, &eth_feed(2000.0, 0.5));

        let dev = result.signal(SignalKind::PriceDeviation).unwrap();
        assert_relative_eq!(dev.score, 1.0);
        assert_relative_eq!(dev.weight, 0.2);
        assert_relative_eq!(result.signal(SignalKind::Precision).unwrap().weight, 0.4);
        assert_relative_eq!(result.bot_score, 0.2);
    }

    #[test]
    fn test_price_deviation_omitted_without_matching_quote() {
        let feed = eth_feed(2000.0, 0.5);
        let other_asset = vec![trade(dec!(1.0), 0.0, "tx1").with_execution("BTC/USD", 60000.0)];
        assert!(classify_all(&other_asset, &feed)
            .signal(SignalKind::PriceDeviation)
            .is_none());

        let no_price = vec![trade(dec!(1.0), 0.0, "tx1")];
        assert!(classify_all(&no_price, &feed)
            .signal(SignalKind::PriceDeviation)
            .is_none());
    }

    #[test]
    fn test_stale_quote_ignored() {
        let trades = vec![trade(dec!(1.0), 120.0, "tx1").with_execution("ETH/USD", 2100.0)];
        let result = classify_all(&trades, &eth_feed(2000.0, 0.5));
        assert!(result.signal(SignalKind::PriceDeviation).is_none());
    }

    #[test]
    fn test_zero_confidence_any_deviation_scores_one() {
        let trades = vec![trade(dec!(1.0), 0.0, "tx1").with_execution("ETH/USD", 2000.01)];
        let result = classify_all(&trades, &eth_feed(2000.0, 0.0));
        assert_eq!(result.signal(SignalKind::PriceDeviation).unwrap().score, 1.0);
    }

    #[test]
    fn test_deterministic() {
        let trades = vec![
            trade(dec!(1.25), 0.0, "tx1"),
            trade(dec!(2.5), 7.0, "tx2"),
            trade(dec!(3.125), 19.0, "tx3").with_execution("ETH/USD", 2001.0),
        ];
        let feed = eth_feed(2000.0, 0.5);
        let classifier = BehaviorClassifier::default();
        let a = classifier.classify(&trades, &trades[2], &feed, t0());
        let b = classifier.classify(&trades, &trades[2], &feed, Utc::now());
        assert!(a.same_outcome(&b));
    }

    #[test]
    fn test_history_after_observation_ignored() {
        let trades = vec![
            trade(dec!(1.0), 0.0, "tx1"),
            trade(dec!(1.0), 10.0, "tx2"),
            trade(dec!(1.0), 20.0, "tx3"),
            trade(dec!(1.0), 21.0, "tx4"),
        ];
        let classifier = BehaviorClassifier::default();
        let through_tx3 = classifier.classify(&trades, &trades[2], &FeedSnapshot::empty(), t0());
        assert_relative_eq!(
            through_tx3.signal(SignalKind::TimingRegularity).unwrap().score,
            1.0
        );
    }

    #[test]
    fn test_unrecorded_observation_appended() {
        let history = vec![trade(dec!(1.0), 0.0, "tx1"), trade(dec!(1.0), 10.0, "tx2")];
        let next = trade(dec!(1.0), 20.0, "tx3");
        let result = BehaviorClassifier::default().classify(&history, &next, &FeedSnapshot::empty(), t0());
        assert_eq!(
            result.signal(SignalKind::TimingRegularity).unwrap().status,
            SignalStatus::Measured
        );
    }

    #[test]
    fn test_out_of_order_flagged() {
        let trades = vec![trade(dec!(1.0), 50.0, "tx1"), trade(dec!(1.0), 10.0, "tx2")];
        let result = classify_all(&trades, &FeedSnapshot::empty());
        let anomaly = result.signal(SignalKind::TimingAnomaly).unwrap();
        assert_eq!(anomaly.status, SignalStatus::Informational);
        assert_eq!(anomaly.weight, 0.0);
        assert_eq!(result.bot_score, 0.0);
    }

    #[test]
    fn test_score_always_in_unit_interval() {
        let feed = eth_feed(2000.0, 0.0);
        let trades: Vec<_> = (0..20)
            .map(|i| {
                trade(dec!(9.999999), i as f64, &format!("tx{i}"))
                    .with_execution("ETH/USD", 5000.0)
            })
            .collect();
        let result = classify_all(&trades, &feed);
        assert!((0.0..=1.0).contains(&result.bot_score));
        assert_relative_eq!(result.bot_score, 1.0);
    }
}
