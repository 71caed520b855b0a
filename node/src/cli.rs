//! # CLI Interface
//!
//! Command-line arguments for `mycash-node`, via `clap` derive. Three
//! subcommands: `run`, `demo` and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// MyCash ledger node.
///
/// Hosts a notary and a roster of cash-holding parties on one in-process
/// network, serves the operator API and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "mycash-node",
    about = "MyCash ledger node",
    version,
    propagate_version = true
)]
pub struct MyCashNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Boot the roster and serve the operator API until interrupted.
    Run(RunArgs),
    /// Boot an in-memory roster, run the scripted scenario and print the result.
    Demo(DemoArgs),
    /// Print version information and exit.
    Version,
}

/// Options shared by every subcommand that boots a roster.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Path to a JSON node configuration file. Defaults apply when omitted.
    #[arg(long, short = 'c', env = "MYCASH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, env = "MYCASH_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Data directory for vaults, notary state and party keys. Overrides
    /// the configuration file.
    #[arg(long, short = 'd', env = "MYCASH_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the operator API.
    #[arg(long, env = "MYCASH_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "MYCASH_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,

    /// Run the demo scenario once the roster is up.
    #[arg(long)]
    pub seed_demo: bool,
}

#[derive(Args, Debug)]
pub struct DemoArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}
