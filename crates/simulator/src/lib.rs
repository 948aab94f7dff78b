//! Scenario replay and reporting for the botwatch system.
//!
//! This crate provides:
//! - Canned bot-like and human-like trading scenarios
//! - Deterministic replay through the detection engine
//! - Text status reports over feed state and recent classifications

pub mod scenario;
pub mod replay;
pub mod report;

pub use scenario::Scenario;
pub use replay::{ReplayReport, ScenarioRunner};
pub use report::MonitorReport;
