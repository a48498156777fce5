//! # CLI Interface
//!
//! Defines the command-line argument structure for `ferry-node` using
//! `clap` derive. Supports three subcommands: `simulate`, `init`, and
//! `version`.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// FERRY multi-chain simulator.
///
/// Spins up one ledger instance per configured chain, wires them to an
/// in-process loopback transport with a background relayer, runs a
/// scenario of deposits, withdrawals and cross-chain transfers, and prints
/// a JSON report of the resulting balances.
#[derive(Parser, Debug)]
#[command(
    name = "ferry-node",
    about = "FERRY multi-chain ledger simulator",
    version,
    propagate_version = true
)]
pub struct FerryNodeCli {
    /// Log output format.
    #[arg(long, global = true, env = "FERRY_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the FERRY node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario against freshly created instances.
    Simulate(SimulateArgs),
    /// Write the default scenario to a file.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Path to the scenario file (TOML).
    ///
    /// When omitted, the built-in default scenario runs.
    #[arg(long, short = 'c', env = "FERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout.
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Give up on a `relay` step after this many milliseconds.
    #[arg(long, env = "FERRY_RELAY_TIMEOUT_MS", default_value_t = 5_000)]
    pub relay_timeout_ms: u64,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Where to write the scenario.
    #[arg(long, short = 'c', env = "FERRY_CONFIG", default_value = "ferry.toml")]
    pub config: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// `--log-format` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}
