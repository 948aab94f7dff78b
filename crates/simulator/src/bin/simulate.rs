//! Bot behavior simulator.
//!
//! `scenario` replays a canned trading pattern through the detector and prints
//! each classification. `monitor` connects to the Pyth Hermes price stream and
//! prints a status report on a fixed interval until Ctrl+C.

use anyhow::{Context, Result};
use botwatch_core::Config;
use botwatch_detection::BotDetector;
use botwatch_ingestion::{HermesTransport, PriceFeedIngestor};
use botwatch_simulator::report::summarize;
use botwatch_simulator::{MonitorReport, Scenario, ScenarioRunner};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(author, version, about = "Bot behavior simulator", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario: 1|bot, 2|human, 3|consistent
    Scenario {
        scenario: Scenario,

        /// Trader identity used for the simulated trades
        #[arg(short, long, default_value = "0xsimulated")]
        trader: String,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Stream live prices and print periodic status
    Monitor {
        /// Override the Hermes base URL
        #[arg(long)]
        hermes_url: Option<String>,

        /// Seconds between status reports
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Scenario to inject once prices are live, filled against the live quote
        #[arg(long)]
        scenario: Option<Scenario>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Scenario {
            scenario,
            trader,
            json,
        } => run_scenario(config, scenario, &trader, json),
        Commands::Monitor {
            hermes_url,
            interval_secs,
            scenario,
        } => run_monitor(config, hermes_url, interval_secs, scenario).await,
    }
}

fn run_scenario(config: Config, scenario: Scenario, trader: &str, json: bool) -> Result<()> {
    info!("Simulating: {}", scenario.describe());

    let report = ScenarioRunner::new(config, Utc::now()).run(scenario, trader)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for (n, result) in report.results.iter().enumerate() {
        println!("Trade {}/{}: {}", n + 1, report.results.len(), summarize(result));
    }
    if let Some(verdict) = report.final_verdict() {
        println!("Final verdict: {:?} (max score {:.2})", verdict, report.max_score());
    }
    Ok(())
}

async fn run_monitor(
    mut config: Config,
    hermes_url: Option<String>,
    interval_secs: Option<u64>,
    scenario: Option<Scenario>,
) -> Result<()> {
    if let Some(url) = hermes_url {
        config.feed.hermes_url = url;
    }
    if let Some(secs) = interval_secs {
        config.monitor.report_interval_secs = secs.max(1);
    }

    let transport = Arc::new(HermesTransport::new(&config.feed));
    let ingestor = Arc::new(PriceFeedIngestor::new(
        transport,
        Duration::from_secs(config.feed.start_timeout_secs),
    ));
    let detector = BotDetector::new(&config, ingestor.clone());

    info!("Connecting to price feed at {}", config.feed.hermes_url);
    ingestor
        .start()
        .await
        .context("Price feed did not deliver data")?;

    if let Some(scenario) = scenario {
        let snapshot = ingestor.snapshot();
        let quote = snapshot.iter().next().map(|(_, q)| q.clone());
        for observation in scenario.observations("0xsimulated", Utc::now(), quote.as_ref()) {
            match detector.observe(observation) {
                Ok(result) => info!("{}", summarize(&result)),
                Err(e) => warn!("Simulated trade rejected: {}", e),
            }
        }
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.monitor.report_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = MonitorReport {
                    feed: detector.feed_snapshot(),
                    feed_connected: ingestor.is_connected(),
                    recent: detector.recent_classifications(config.monitor.recent_limit),
                    stats: detector.stats(),
                };
                println!("{report}");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down bot detection monitor...");
                ingestor.stop();
                info!("Monitor stopped");
                break;
            }
        }
    }

    Ok(())
}
