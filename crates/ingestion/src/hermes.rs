//! Pyth Hermes price stream transport.
//!
//! Subscribes to `/v2/updates/price/stream` (server-sent events) and pushes
//! each parsed price into the sink. Reconnects with exponential backoff.

use async_trait::async_trait;
use botwatch_core::config::{FeedConfig, FeedSubscription};
use botwatch_core::{Error, Result};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::feed::{FeedSink, FeedTransport};

/// One decoded price from a Hermes event.
#[derive(Debug, Clone, PartialEq)]
pub struct HermesPrice {
    /// Normalized feed id (lowercase hex, no 0x prefix).
    pub id: String,
    pub price: f64,
    pub confidence: f64,
    pub publish_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct PriceUpdateEvent {
    #[serde(default)]
    parsed: Vec<ParsedPriceUpdate>,
}

#[derive(Debug, Deserialize)]
struct ParsedPriceUpdate {
    id: String,
    price: RawPrice,
}

/// Fixed-point price as published: `value * 10^expo`.
#[derive(Debug, Deserialize)]
struct RawPrice {
    price: String,
    conf: String,
    expo: i32,
    publish_time: i64,
}

impl RawPrice {
    fn scaled(&self, raw: &str) -> Result<f64> {
        let value: i64 = raw
            .parse()
            .map_err(|e| Error::transport(format!("bad fixed-point value {raw:?}: {e}")))?;
        Ok(value as f64 * 10f64.powi(self.expo))
    }
}

fn normalize_id(id: &str) -> String {
    id.trim().trim_start_matches("0x").to_ascii_lowercase()
}

/// Decode the JSON body of one `data:` line.
pub fn decode_price_event(payload: &str) -> Result<Vec<HermesPrice>> {
    let event: PriceUpdateEvent = serde_json::from_str(payload)?;
    event
        .parsed
        .iter()
        .map(|update| {
            Ok(HermesPrice {
                id: normalize_id(&update.id),
                price: update.price.scaled(&update.price.price)?,
                confidence: update.price.scaled(&update.price.conf)?,
                publish_time: DateTime::from_timestamp(update.price.publish_time, 0),
            })
        })
        .collect()
}

/// Splits a server-sent event byte stream into `data:` payloads.
///
/// Chunks may end mid-line; the partial line is held until its newline
/// arrives. Comments, `event:` and other fields are skipped.
#[derive(Debug, Default)]
pub struct SseFrames {
    buffer: Vec<u8>,
}

impl SseFrames {
    /// Feed one chunk and return the payloads of every completed `data:` line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() {
                    payloads.push(data.to_string());
                }
            }
        }
        payloads
    }

    /// Bytes held back waiting for a newline.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// Streams prices from a Pyth Hermes endpoint.
pub struct HermesTransport {
    client: reqwest::Client,
    base_url: String,
    /// Normalized feed id -> asset name.
    assets: HashMap<String, String>,
    backoff_initial: Duration,
    backoff_max: Duration,
}

impl HermesTransport {
    pub fn new(config: &FeedConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.hermes_url.trim_end_matches('/').to_string(),
            assets: config
                .subscriptions
                .iter()
                .map(|FeedSubscription { asset, price_id }| (normalize_id(price_id), asset.clone()))
                .collect(),
            backoff_initial: Duration::from_secs(config.reconnect_backoff_initial_secs),
            backoff_max: Duration::from_secs(config.reconnect_backoff_max_secs),
        }
    }

    fn stream_request(&self) -> reqwest::RequestBuilder {
        let mut query: Vec<(&str, String)> = self
            .assets
            .keys()
            .map(|id| ("ids[]", format!("0x{id}")))
            .collect();
        query.push(("parsed", "true".to_string()));

        self.client
            .get(format!("{}/v2/updates/price/stream", self.base_url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .query(&query)
    }

    /// Push every subscribed price in one event. Returns how many were applied.
    fn dispatch(&self, payload: &str, sink: &FeedSink) -> usize {
        let prices = match decode_price_event(payload) {
            Ok(prices) => prices,
            Err(e) => {
                warn!("Hermes: Skipping undecodable event: {}", e);
                return 0;
            }
        };

        let mut applied = 0;
        for p in prices {
            let Some(asset) = self.assets.get(&p.id) else {
                continue;
            };
            let ok = match p.publish_time {
                Some(at) => sink.on_update_at(asset, p.price, p.confidence, at),
                None => sink.on_update(asset, p.price, p.confidence),
            };
            if ok {
                applied += 1;
            }
        }
        applied
    }

    async fn stream_once(&self, sink: &FeedSink) -> Result<()> {
        let response = self
            .stream_request()
            .send()
            .await
            .map_err(|e| Error::transport(format!("Hermes connect failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::transport(format!("Hermes returned HTTP {status}")));
        }

        info!("Hermes price stream connected");
        sink.set_connected(true);

        let mut body = response.bytes_stream();
        let mut frames = SseFrames::default();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::transport(format!("Hermes stream error: {e}")))?;
            for data in frames.push(&chunk) {
                let applied = self.dispatch(&data, sink);
                debug!(applied, "Hermes event");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl FeedTransport for HermesTransport {
    async fn run(&self, sink: FeedSink) -> Result<()> {
        if self.assets.is_empty() {
            return Err(Error::config("Hermes transport has no subscriptions"));
        }

        let mut backoff = self.backoff_initial;
        loop {
            match self.stream_once(&sink).await {
                Ok(()) => {
                    info!("Hermes stream closed by server, reconnecting");
                    sink.set_connected(false);
                    tokio::time::sleep(self.backoff_initial).await;
                    backoff = self.backoff_initial;
                }
                Err(e) => {
                    sink.set_connected(false);
                    warn!("Hermes stream error: {}. Reconnecting in {:?}", e, backoff);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.backoff_max);
                }
            }
        }
    }

    fn name(&self) -> &str {
        "hermes"
    }
}
