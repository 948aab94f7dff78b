//! Error types for the botwatch system.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the botwatch system.
#[derive(Error, Debug)]
pub enum Error {
    /// No price data arrived from the feed before the start timeout.
    #[error("Feed connection error: {0}")]
    FeedConnection(String),

    /// Malformed trade observation (non-positive amount, empty trader, ...).
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Feed transport failure (HTTP status, stream decode).
    #[error("Transport error: {0}")]
    Transport(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error with message.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a feed connection error.
    pub fn feed_connection(msg: impl Into<String>) -> Self {
        Error::FeedConnection(msg.into())
    }

    /// Create an invalid observation error.
    pub fn invalid_observation(msg: impl Into<String>) -> Self {
        Error::InvalidObservation(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a transport error.
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }
}
