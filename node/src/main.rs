// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # FERRY Node
//!
//! Entry point for the `ferry-node` binary. Parses CLI arguments,
//! initializes logging, and runs multi-chain scenarios against in-process
//! ledger instances.
//!
//! The binary supports three subcommands:
//!
//! - `simulate` - run a scenario and print a JSON report
//! - `init`     - write the default scenario to a file
//! - `version`  - print build version information

mod cli;
mod config;
mod logging;
mod simulation;

use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;

use cli::{Commands, FerryNodeCli};
use config::ScenarioConfig;
use simulation::Simulation;

// Single-threaded so the step loop and the relayer never call into the same
// instance at once; the reentrancy lock would refuse the second caller.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = FerryNodeCli::parse();

    match cli.command {
        Commands::Simulate(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format.into());
            simulate(args).await
        }
        Commands::Init(args) => {
            logging::init_logging(logging::DEFAULT_FILTER, cli.log_format.into());
            init_scenario(args)
        }
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Builds the chains, runs every step, and writes the report.
async fn simulate(args: cli::SimulateArgs) -> Result<()> {
    let scenario = match &args.config {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading scenario");
            ScenarioConfig::load(path)?
        }
        None => {
            tracing::info!("no scenario given, running the default");
            ScenarioConfig::default()
        }
    };

    let simulation = Simulation::build(scenario).context("failed to set up simulation")?;
    let timeout = Duration::from_millis(args.relay_timeout_ms);

    let report = tokio::select! {
        report = simulation.run(timeout) => report?,
        res = signal::ctrl_c() => {
            res.context("failed to listen for Ctrl+C")?;
            bail!("interrupted");
        }
    };

    let failed = report.steps.iter().filter(|s| !s.outcome.is_ok()).count();
    tracing::info!(steps = report.steps.len(), failed, deliveries = report.deliveries.len(), "simulation finished");

    let json = serde_json::to_string_pretty(&report).context("failed to encode report")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Writes the default scenario, refusing to clobber an existing file.
fn init_scenario(args: cli::InitArgs) -> Result<()> {
    let path = &args.config;
    if path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    ScenarioConfig::default().save(path)?;
    tracing::info!(path = %path.display(), "scenario written");

    println!("Scenario written to {}", path.display());
    println!("Run it with: ferry-node simulate --config {}", path.display());
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("ferry-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol   {}", ferry_protocol::config::PROTOCOL_VERSION);
    println!("rustc      {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}
