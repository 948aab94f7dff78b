//! Data ingestion for the botwatch system.
//!
//! This crate handles:
//! - Latest-quote tracking from a push-style price feed
//! - Feed transports (in-process channel, Pyth Hermes stream)
//! - Bounded per-trader trade history

pub mod feed;
pub mod channel;
pub mod hermes;
pub mod recorder;

pub use feed::{FeedSink, FeedTransport, PriceFeedIngestor};
pub use channel::{ChannelTransport, FeedPublisher, FeedUpdate};
pub use hermes::HermesTransport;
pub use recorder::{RecordReceipt, TradeEventRecorder};
