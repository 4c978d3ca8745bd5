// SPDX-License-Identifier: MIT
//
// QKD Network Simulator: Key Buffers and Secure Channel Engine
// Copyright (c) 2025 Valer Bocan, PhD, CSSLP
// Email: valer.bocan@upt.ro
//
// Department of Computer and Information Technology
// Politehnica University of Timisoara

//! QKD Simulator - Command-line driver for QKD network scenarios
//!
//! Loads a YAML scenario, builds one link manager per node and runs the
//! discrete-event simulation for the configured duration.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   frames    ┌──────────────┐   frames    ┌──────────────┐
//! │    Node A    │ ───────────>│  Transport   │ ───────────>│    Node B    │
//! │ (LinkManager)│             │ (segments +  │             │ (LinkManager)│
//! └──────────────┘             │   latency)   │             └──────────────┘
//!        ▲                     └──────────────┘                    ▲
//!        │                                                         │
//!        └──────────────── QKD key material (charging) ────────────┘
//! ```
//!
//! The run ends with a JSON report of buffer snapshots, secure-channel
//! counters and traffic statistics.

mod network;

use anyhow::{Context, Result};
use clap::Parser;
use network::Network;
use qkd_core::config::{RuntimeOverrides, SimulationConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "qkd-sim")]
#[command(about = "QKD Simulator - Runs key distribution and secure channel scenarios", long_about = None)]
struct Args {
    /// Scenario file (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Also write the counters in Prometheus text format to this file
    #[arg(long)]
    prometheus: Option<PathBuf>,

    /// Override the scenario duration
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if args.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    info!("QKD Simulator v{}", qkd_core::VERSION);

    info!("Loading scenario from {}", args.config.display());
    let mut config = SimulationConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load scenario {}", args.config.display()))?;

    let overrides =
        RuntimeOverrides::from_env().context("Failed to read overrides from environment")?;
    overrides.apply(&mut config);
    if let Some(duration) = args.duration_secs {
        config.duration_secs = duration;
    }
    config.validate().context("Invalid scenario after overrides")?;

    info!("Seed: {}", config.seed);
    info!("Duration: {:?}", config.duration());
    info!("Links: {}", config.links.len());
    info!("Traffic flows: {}", config.traffic.len());

    let duration = config.duration();
    let (mut network, mut sim) = Network::build(config)?;
    sim.run_for(&mut network, duration);

    let report = network.report(&sim);
    info!(
        events = report.events_executed,
        generated = report.traffic.generated,
        delivered = report.traffic.delivered,
        deferred = report.traffic.deferred,
        "Simulation finished"
    );

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    if let Some(path) = &args.prometheus {
        std::fs::write(path, network.metrics().prometheus_format())
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }
    Ok(())
}
