//! Latest-quote table fed by a push-style price feed.
//!
//! The ingestor owns the quote table. Transports push into it through a
//! [`FeedSink`]; readers only ever see immutable [`FeedSnapshot`]s.

use async_trait::async_trait;
use botwatch_core::{Error, FeedSnapshot, PriceQuote, QuoteSource, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Source of pushed price updates.
///
/// `run` streams updates into the sink until the source is exhausted or the
/// task is aborted. Reconnects and backoff are the transport's business.
#[async_trait]
pub trait FeedTransport: Send + Sync + 'static {
    async fn run(&self, sink: FeedSink) -> Result<()>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "feed"
    }
}

struct FeedState {
    quotes: Arc<BTreeMap<String, PriceQuote>>,
    /// Cleared by `stop()`; updates are dropped while false.
    accepting: bool,
}

struct Shared {
    state: RwLock<FeedState>,
    connected: AtomicBool,
    /// Count of applied updates since construction.
    updates: watch::Sender<u64>,
}

impl Shared {
    fn write_state(&self) -> RwLockWriteGuard<'_, FeedState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                error!("PriceFeedIngestor: Lock poisoned during write, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn snapshot(&self) -> FeedSnapshot {
        let quotes = match self.state.read() {
            Ok(guard) => guard.quotes.clone(),
            Err(poisoned) => poisoned.into_inner().quotes.clone(),
        };
        FeedSnapshot::from_table(quotes)
    }

    fn apply(&self, asset: &str, price: f64, confidence: f64, observed_at: DateTime<Utc>) -> bool {
        if asset.is_empty() || !price.is_finite() || !confidence.is_finite() || confidence < 0.0 {
            warn!(
                asset,
                price, confidence, "Dropping malformed price update"
            );
            return false;
        }

        {
            // Check and mutate under one guard so nothing lands after stop().
            let mut state = self.write_state();
            if !state.accepting {
                debug!(asset, "Ignoring price update after stop");
                return false;
            }
            Arc::make_mut(&mut state.quotes).insert(
                asset.to_string(),
                PriceQuote {
                    asset: asset.to_string(),
                    price,
                    confidence,
                    observed_at,
                },
            );
        }

        self.updates.send_modify(|n| *n += 1);
        true
    }

    fn set_connected(&self, connected: bool) {
        // Read guard excludes stop(), so a stopped feed never reports connected.
        let state = match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if connected && !state.accepting {
            debug!("Ignoring connect report after stop");
            return;
        }
        self.connected.store(connected, Ordering::SeqCst);
    }
}

/// Handle given to a transport for pushing updates.
#[derive(Clone)]
pub struct FeedSink {
    shared: Arc<Shared>,
}

impl FeedSink {
    /// Push an update observed now.
    pub fn on_update(&self, asset: &str, price: f64, confidence: f64) -> bool {
        self.shared.apply(asset, price, confidence, Utc::now())
    }

    /// Push an update with the publisher's timestamp.
    pub fn on_update_at(
        &self,
        asset: &str,
        price: f64,
        confidence: f64,
        observed_at: DateTime<Utc>,
    ) -> bool {
        self.shared.apply(asset, price, confidence, observed_at)
    }

    /// Report connection state changes.
    pub fn set_connected(&self, connected: bool) {
        self.shared.set_connected(connected);
    }
}

/// Maintains the latest quote per asset from a feed transport.
pub struct PriceFeedIngestor {
    shared: Arc<Shared>,
    transport: Arc<dyn FeedTransport>,
    start_timeout: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PriceFeedIngestor {
    /// Create an ingestor over the given transport. Nothing runs until `start()`.
    pub fn new(transport: Arc<dyn FeedTransport>, start_timeout: Duration) -> Self {
        let (updates, _) = watch::channel(0u64);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(FeedState {
                    quotes: Arc::new(BTreeMap::new()),
                    accepting: true,
                }),
                connected: AtomicBool::new(false),
                updates,
            }),
            transport,
            start_timeout,
            task: Mutex::new(None),
        }
    }

    /// Open the subscription and wait for data.
    ///
    /// Calling this while already running only waits for data. Fails with
    /// [`Error::FeedConnection`] when no update has ever arrived within the
    /// start timeout; the transport task is torn down and `start()` can be
    /// retried.
    pub async fn start(&self) -> Result<()> {
        let mut updates = self.shared.updates.subscribe();

        {
            let mut task = self.lock_task();
            let running = task.as_ref().is_some_and(|h| !h.is_finished());
            if running {
                debug!(transport = self.transport.name(), "Feed already started");
            } else {
                self.shared.write_state().accepting = true;
                let sink = self.sink();
                let transport = self.transport.clone();
                info!(transport = transport.name(), "Starting price feed");
                *task = Some(tokio::spawn(async move {
                    match transport.run(sink.clone()).await {
                        Ok(()) => info!(transport = transport.name(), "Price feed ended"),
                        Err(e) => error!(transport = transport.name(), "Price feed failed: {}", e),
                    }
                    sink.set_connected(false);
                }));
            }
        }

        if *updates.borrow() > 0 {
            return Ok(());
        }

        let waited = tokio::time::timeout(self.start_timeout, updates.wait_for(|n| *n > 0))
            .await
            .map(|r| r.is_ok());

        match waited {
            Ok(true) => {
                info!(
                    transport = self.transport.name(),
                    assets = self.shared.snapshot().len(),
                    "Price feed connected"
                );
                Ok(())
            }
            _ => {
                self.abort_task();
                self.shared.connected.store(false, Ordering::SeqCst);
                Err(Error::feed_connection(format!(
                    "no price data from {} within {:?}",
                    self.transport.name(),
                    self.start_timeout
                )))
            }
        }
    }

    /// Apply an update directly (same path the transport uses).
    pub fn on_update(&self, asset: &str, price: f64, confidence: f64) -> bool {
        self.shared.apply(asset, price, confidence, Utc::now())
    }

    /// Apply an update with an explicit observation time.
    pub fn on_update_at(
        &self,
        asset: &str,
        price: f64,
        confidence: f64,
        observed_at: DateTime<Utc>,
    ) -> bool {
        self.shared.apply(asset, price, confidence, observed_at)
    }

    pub(crate) fn sink(&self) -> FeedSink {
        FeedSink {
            shared: self.shared.clone(),
        }
    }

    /// Latest quote per asset as of now.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.shared.snapshot()
    }

    /// Whether the transport currently reports a live connection.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Close the subscription.
    ///
    /// Once this returns, the quote table no longer changes until the next
    /// `start()`.
    pub fn stop(&self) {
        self.shared.write_state().accepting = false;
        self.abort_task();
        self.shared.connected.store(false, Ordering::SeqCst);
        info!(transport = self.transport.name(), "Price feed stopped");
    }

    fn abort_task(&self) {
        if let Some(handle) = self.lock_task().take() {
            debug!(transport = self.transport.name(), "Aborting feed task");
            handle.abort();
        }
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.task.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl QuoteSource for PriceFeedIngestor {
    fn snapshot(&self) -> FeedSnapshot {
        self.shared.snapshot()
    }
}

impl Drop for PriceFeedIngestor {
    fn drop(&mut self) {
        self.abort_task();
    }
}
