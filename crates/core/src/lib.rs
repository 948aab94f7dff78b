//! Core types and configuration for the botwatch system.
//!
//! This crate provides shared types used across all other crates:
//! - Trade observations and price quotes
//! - Classification results and signal readings
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
