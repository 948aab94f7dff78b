//! Core data types for the botwatch system.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Trader identity (wallet address or account id).
pub type TraderId = String;

/// Latest price for one asset as published by the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Asset identifier (e.g., "ETH/USD").
    pub asset: String,
    /// Aggregate price.
    pub price: f64,
    /// Confidence interval half-width, in price units. Never negative.
    pub confidence: f64,
    /// When the quote was observed (publish time when the feed provides it).
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Lower edge of the confidence band.
    #[inline]
    pub fn band_low(&self) -> f64 {
        self.price - self.confidence
    }

    /// Upper edge of the confidence band.
    #[inline]
    pub fn band_high(&self) -> f64 {
        self.price + self.confidence
    }

    /// Whether `price` falls inside the confidence band (inclusive).
    #[inline]
    pub fn contains(&self, price: f64) -> bool {
        price >= self.band_low() && price <= self.band_high()
    }
}

/// Immutable view of the latest quote per asset.
///
/// Cloning is cheap; the underlying table is shared and never mutated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    quotes: Arc<BTreeMap<String, PriceQuote>>,
}

impl FeedSnapshot {
    /// Snapshot with no quotes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap an already-built quote table.
    pub fn from_table(quotes: Arc<BTreeMap<String, PriceQuote>>) -> Self {
        Self { quotes }
    }

    /// Build a snapshot from individual quotes. Later quotes for the same asset win.
    pub fn from_quotes(quotes: impl IntoIterator<Item = PriceQuote>) -> Self {
        let table = quotes
            .into_iter()
            .map(|q| (q.asset.clone(), q))
            .collect::<BTreeMap<_, _>>();
        Self {
            quotes: Arc::new(table),
        }
    }

    pub fn get(&self, asset: &str) -> Option<&PriceQuote> {
        self.quotes.get(asset)
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Iterate quotes in asset order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PriceQuote)> {
        self.quotes.iter()
    }
}

/// Anything that can hand out a point-in-time quote snapshot.
///
/// The live ingestor implements this; a fixed [`FeedSnapshot`] does too,
/// which lets classification run without a feed.
pub trait QuoteSource: Send + Sync {
    fn snapshot(&self) -> FeedSnapshot;
}

impl QuoteSource for FeedSnapshot {
    fn snapshot(&self) -> FeedSnapshot {
        self.clone()
    }
}

impl<T: QuoteSource + ?Sized> QuoteSource for Arc<T> {
    fn snapshot(&self) -> FeedSnapshot {
        (**self).snapshot()
    }
}

/// A single confirmed trade as reported by the settlement layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeObservation {
    /// Trader identity.
    pub trader: TraderId,
    /// Traded amount, exact.
    pub amount: Decimal,
    /// When the trade was observed.
    pub timestamp: DateTime<Utc>,
    /// Opaque correlation id (transaction hash).
    pub tx_ref: String,
    /// Feed asset the trade settles against, if known.
    pub asset: Option<String>,
    /// Implied unit price of the trade, if known.
    pub execution_price: Option<f64>,
}

impl TradeObservation {
    /// Create an observation without price context.
    pub fn new(
        trader: impl Into<TraderId>,
        amount: Decimal,
        timestamp: DateTime<Utc>,
        tx_ref: impl Into<String>,
    ) -> Self {
        Self {
            trader: trader.into(),
            amount,
            timestamp,
            tx_ref: tx_ref.into(),
            asset: None,
            execution_price: None,
        }
    }

    /// Attach the asset and execution price used for price-deviation scoring.
    pub fn with_execution(mut self, asset: impl Into<String>, price: f64) -> Self {
        self.asset = Some(asset.into());
        self.execution_price = Some(price);
        self
    }

    /// Check the observation is acceptable for recording.
    pub fn validate(&self) -> Result<()> {
        if self.trader.trim().is_empty() {
            return Err(Error::invalid_observation("trader id is empty"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(Error::invalid_observation(format!(
                "amount must be positive, got {} (tx {})",
                self.amount, self.tx_ref
            )));
        }
        if let Some(price) = self.execution_price {
            if !price.is_finite() || price <= 0.0 {
                return Err(Error::invalid_observation(format!(
                    "execution price must be finite and positive, got {} (tx {})",
                    price, self.tx_ref
                )));
            }
        }
        Ok(())
    }
}

/// Parse a decimal amount exactly, keeping every fractional digit.
///
/// Inputs that would need rounding to fit a `Decimal` are rejected.
pub fn parse_amount(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s.trim())
        .map_err(|e| Error::invalid_observation(format!("bad amount {s:?}: {e}")))
}

/// Convert a float amount, rejecting NaN and infinities.
pub fn amount_from_f64(value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(Error::invalid_observation(format!(
            "amount must be finite, got {value}"
        )));
    }
    Decimal::from_f64(value)
        .ok_or_else(|| Error::invalid_observation(format!("amount out of range: {value}")))
}

/// Named classification signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Fractional precision of the traded amount.
    Precision,
    /// Regularity of inter-trade intervals.
    TimingRegularity,
    /// Distance of the execution price from the live quote.
    PriceDeviation,
    /// Observation arrived out of timestamp order (informational, zero weight).
    TimingAnomaly,
}

impl SignalKind {
    pub fn name(self) -> &'static str {
        match self {
            SignalKind::Precision => "precision",
            SignalKind::TimingRegularity => "timing_regularity",
            SignalKind::PriceDeviation => "price_deviation",
            SignalKind::TimingAnomaly => "timing_anomaly",
        }
    }
}

/// How a signal reading was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Computed from sufficient data.
    Measured,
    /// Not enough history; score is 0 but the weight still counts.
    InsufficientData,
    /// Reported for context only, carries no weight.
    Informational,
}

/// One signal's contribution to a classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    /// Sub-score in [0, 1].
    pub score: f64,
    /// Effective weight after renormalization over present signals.
    pub weight: f64,
    pub status: SignalStatus,
}

impl SignalReading {
    /// Weighted contribution to the bot score.
    #[inline]
    pub fn contribution(&self) -> f64 {
        self.score * self.weight
    }
}

/// Coarse band for a bot score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Human,
    Suspicious,
    Bot,
}

/// Outcome of classifying one trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub trader: TraderId,
    pub tx_ref: String,
    /// Bot likelihood in [0, 1].
    pub bot_score: f64,
    /// Per-signal readings.
    pub signals: BTreeMap<SignalKind, SignalReading>,
    pub verdict: Verdict,
    pub decided_at: DateTime<Utc>,
}

impl ClassificationResult {
    pub fn signal(&self, kind: SignalKind) -> Option<&SignalReading> {
        self.signals.get(&kind)
    }

    /// Signal with the largest weighted contribution, if any contributed.
    pub fn dominant_signal(&self) -> Option<SignalKind> {
        self.signals
            .iter()
            .filter(|(_, r)| r.contribution() > 0.0)
            .max_by_key(|(_, r)| OrderedFloat(r.contribution()))
            .map(|(k, _)| *k)
    }

    /// Compare everything except `decided_at`.
    pub fn same_outcome(&self, other: &ClassificationResult) -> bool {
        self.trader == other.trader
            && self.tx_ref == other.tx_ref
            && self.bot_score == other.bot_score
            && self.signals == other.signals
            && self.verdict == other.verdict
    }
}
