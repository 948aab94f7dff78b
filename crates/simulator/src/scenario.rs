//! Synthetic trading scenarios.
//!
//! Each scenario produces the trade observations a settlement layer would
//! report for a scripted or a manual trader.

use botwatch_core::{PriceQuote, TradeObservation};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Confidence bands a bot fill lands away from the quote.
const BOT_FILL_BANDS: f64 = 3.0;

/// Number of trades in the consistent pattern.
pub const CONSISTENT_TRADES: i64 = 5;
/// Spacing of the consistent pattern.
pub const CONSISTENT_INTERVAL_SECS: i64 = 10;

#[derive(Debug, Error)]
#[error("unknown scenario {0:?} (expected bot, human or consistent)")]
pub struct UnknownScenario(String);

/// Canned trading behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// One trade with a very precise amount (1.547329).
    SingleBot,
    /// One trade with a round amount (1.0).
    SingleHuman,
    /// Five precise trades exactly 10 seconds apart.
    ConsistentBot,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::SingleBot,
        Scenario::SingleHuman,
        Scenario::ConsistentBot,
    ];

    pub fn describe(self) -> &'static str {
        match self {
            Scenario::SingleBot => "Single bot-like trade (precise amount)",
            Scenario::SingleHuman => "Single human-like trade (rounded amount)",
            Scenario::ConsistentBot => "Consistent bot trading pattern (5 trades, 10s intervals)",
        }
    }

    fn is_bot(self) -> bool {
        !matches!(self, Scenario::SingleHuman)
    }

    /// Amounts and offsets (seconds from start) for this scenario.
    pub fn schedule(self) -> Vec<(Decimal, i64)> {
        match self {
            Scenario::SingleBot => vec![(Decimal::new(1_547_329, 6), 0)],
            Scenario::SingleHuman => vec![(Decimal::new(10, 1), 0)],
            // i.(547329 + i) for i in 1..=5
            Scenario::ConsistentBot => (1..=CONSISTENT_TRADES)
                .map(|i| {
                    (
                        Decimal::new(i * 1_000_000 + 547_329 + i, 6),
                        (i - 1) * CONSISTENT_INTERVAL_SECS,
                    )
                })
                .collect(),
        }
    }

    /// Build the observations for `trader` starting at `start`.
    ///
    /// With a quote, human trades fill at the quote and bot trades fill
    /// [`BOT_FILL_BANDS`] confidence bands above it.
    pub fn observations(
        self,
        trader: &str,
        start: DateTime<Utc>,
        quote: Option<&PriceQuote>,
    ) -> Vec<TradeObservation> {
        self.schedule()
            .into_iter()
            .enumerate()
            .map(|(n, (amount, offset))| {
                let timestamp = start + Duration::seconds(offset);
                let tx_ref = format!("sim-{}-{}-{}", self, timestamp.timestamp(), n + 1);
                let observation = TradeObservation::new(trader, amount, timestamp, tx_ref);
                match quote {
                    Some(q) => {
                        let price = if self.is_bot() {
                            q.price + BOT_FILL_BANDS * q.confidence
                        } else {
                            q.price
                        };
                        observation.with_execution(q.asset.clone(), price)
                    }
                    None => observation,
                }
            })
            .collect()
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scenario::SingleBot => "bot",
            Scenario::SingleHuman => "human",
            Scenario::ConsistentBot => "consistent",
        };
        f.write_str(name)
    }
}

impl FromStr for Scenario {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "bot" | "single-bot" => Ok(Scenario::SingleBot),
            "2" | "human" | "single-human" => Ok(Scenario::SingleHuman),
            "3" | "consistent" | "consistent-bot" => Ok(Scenario::ConsistentBot),
            other => Err(UnknownScenario(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn start() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_parse_menu_numbers_and_names() {
        assert_eq!("1".parse::<Scenario>().unwrap(), Scenario::SingleBot);
        assert_eq!("human".parse::<Scenario>().unwrap(), Scenario::SingleHuman);
        assert_eq!("Consistent".parse::<Scenario>().unwrap(), Scenario::ConsistentBot);
        assert!("4".parse::<Scenario>().is_err());
    }

    #[test]
    fn test_consistent_schedule() {
        let schedule = Scenario::ConsistentBot.schedule();
        assert_eq!(schedule.len(), 5);
        assert_eq!(schedule[0], (dec!(1.547330), 0));
        assert_eq!(schedule[4], (dec!(5.547334), 40));
    }

    #[test]
    fn test_observations_unique_tx_refs() {
        let obs = Scenario::ConsistentBot.observations("0xbot", start(), None);
        let mut refs: Vec<_> = obs.iter().map(|o| o.tx_ref.clone()).collect();
        refs.sort();
        refs.dedup();
        assert_eq!(refs.len(), 5);
        assert!(obs.iter().all(|o| o.execution_price.is_none()));
    }

    #[test]
    fn test_fill_prices_with_quote() {
        let quote = PriceQuote {
            asset: "ETH/USD".to_string(),
            price: 2000.0,
            confidence: 0.5,
            observed_at: start(),
        };
        let bot = Scenario::SingleBot.observations("0xbot", start(), Some(&quote));
        assert_eq!(bot[0].execution_price, Some(2001.5));
        let human = Scenario::SingleHuman.observations("0xhuman", start(), Some(&quote));
        assert_eq!(human[0].execution_price, Some(2000.0));
        assert_eq!(human[0].asset.as_deref(), Some("ETH/USD"));
    }
}
