//! In-process feed transport backed by an mpsc channel.
//!
//! Used for replay, simulation and tests: whoever holds the [`FeedPublisher`]
//! plays the role of the external price source.

use async_trait::async_trait;
use botwatch_core::{Error, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::feed::{FeedSink, FeedTransport};

/// One pushed price update.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedUpdate {
    pub asset: String,
    pub price: f64,
    pub confidence: f64,
    /// Publisher timestamp; the sink stamps "now" when absent.
    pub observed_at: Option<DateTime<Utc>>,
}

/// Sending half of a [`ChannelTransport`].
#[derive(Clone)]
pub struct FeedPublisher {
    tx: mpsc::Sender<FeedUpdate>,
}

impl FeedPublisher {
    /// Publish an update stamped on arrival.
    pub async fn publish(&self, asset: &str, price: f64, confidence: f64) -> Result<()> {
        self.send(FeedUpdate {
            asset: asset.to_string(),
            price,
            confidence,
            observed_at: None,
        })
        .await
    }

    pub async fn send(&self, update: FeedUpdate) -> Result<()> {
        self.tx
            .send(update)
            .await
            .map_err(|_| Error::transport("feed channel closed"))
    }
}

/// Transport that forwards everything sent through its publisher.
pub struct ChannelTransport {
    // Shared so the receiver survives an aborted run and a later restart.
    rx: Arc<Mutex<mpsc::Receiver<FeedUpdate>>>,
}

impl ChannelTransport {
    /// Create a transport and its publisher with the given buffer size.
    pub fn new(buffer: usize) -> (FeedPublisher, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (
            FeedPublisher { tx },
            Self {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }
}

#[async_trait]
impl FeedTransport for ChannelTransport {
    async fn run(&self, sink: FeedSink) -> Result<()> {
        let mut rx = self.rx.lock().await;
        sink.set_connected(true);

        while let Some(update) = rx.recv().await {
            let applied = match update.observed_at {
                Some(at) => sink.on_update_at(&update.asset, update.price, update.confidence, at),
                None => sink.on_update(&update.asset, update.price, update.confidence),
            };
            if !applied {
                debug!(asset = %update.asset, "Channel update not applied");
            }
        }

        sink.set_connected(false);
        Ok(())
    }

    fn name(&self) -> &str {
        "channel"
    }
}
