//! Bounded per-trader trade history.
//!
//! Each trader's history sits behind its own lock so appends for one trader
//! never interleave, while different traders record independently.

use botwatch_core::{Result, TradeObservation, TraderId};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

/// What happened when an observation was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordReceipt {
    /// Timestamp was earlier than the trader's previous observation.
    pub timing_anomaly: bool,
    /// Observation dropped to make room, if the history was full.
    pub evicted: Option<TradeObservation>,
    /// History length after the append.
    pub history_len: usize,
}

#[derive(Debug, Default)]
struct TraderHistory {
    trades: VecDeque<TradeObservation>,
    timing_anomalies: u64,
}

/// Records trade observations, keeping the last `capacity` per trader.
pub struct TradeEventRecorder {
    capacity: usize,
    traders: RwLock<HashMap<TraderId, Arc<Mutex<TraderHistory>>>>,
}

impl TradeEventRecorder {
    /// Create a recorder. Capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            traders: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an observation to its trader's history.
    ///
    /// Out-of-order timestamps are kept and flagged, not rejected.
    pub fn record(&self, observation: TradeObservation) -> Result<RecordReceipt> {
        observation.validate()?;

        let slot = self.slot(&observation.trader);
        let mut history = lock(&slot);

        let timing_anomaly = history
            .trades
            .back()
            .is_some_and(|last| observation.timestamp < last.timestamp);
        if timing_anomaly {
            history.timing_anomalies += 1;
            debug!(
                trader = %observation.trader,
                tx = %observation.tx_ref,
                "Out-of-order trade timestamp"
            );
        }

        let evicted = if history.trades.len() >= self.capacity {
            history.trades.pop_front()
        } else {
            None
        };
        history.trades.push_back(observation);

        Ok(RecordReceipt {
            timing_anomaly,
            evicted,
            history_len: history.trades.len(),
        })
    }

    /// Copy of the trader's history, oldest first. Empty for unknown traders.
    pub fn history(&self, trader: &str) -> Vec<TradeObservation> {
        self.with_history(trader, |h| h.trades.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether a trade with this correlation id is still in the trader's history.
    pub fn contains_tx(&self, trader: &str, tx_ref: &str) -> bool {
        self.with_history(trader, |h| h.trades.iter().any(|t| t.tx_ref == tx_ref))
            .unwrap_or(false)
    }

    /// Number of out-of-order observations seen for the trader.
    pub fn timing_anomalies(&self, trader: &str) -> u64 {
        self.with_history(trader, |h| h.timing_anomalies)
            .unwrap_or(0)
    }

    /// Known traders, sorted.
    pub fn traders(&self) -> Vec<TraderId> {
        let mut ids: Vec<TraderId> = match self.traders.read() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        ids.sort();
        ids
    }

    fn with_history<R>(&self, trader: &str, f: impl FnOnce(&TraderHistory) -> R) -> Option<R> {
        let slot = self.existing(trader)?;
        let guard = lock(&slot);
        Some(f(&guard))
    }

    fn existing(&self, trader: &str) -> Option<Arc<Mutex<TraderHistory>>> {
        match self.traders.read() {
            Ok(guard) => guard.get(trader).cloned(),
            Err(poisoned) => poisoned.into_inner().get(trader).cloned(),
        }
    }

    fn slot(&self, trader: &str) -> Arc<Mutex<TraderHistory>> {
        if let Some(slot) = self.existing(trader) {
            return slot;
        }
        let mut guard = match self.traders.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .entry(trader.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(TraderHistory::default())))
            .clone()
    }
}

fn lock(slot: &Mutex<TraderHistory>) -> MutexGuard<'_, TraderHistory> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
