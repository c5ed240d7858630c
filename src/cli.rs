//! Command-line argument parsing (spec §6).

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "rip-router")]
#[command(about = "A RIPv2-style distance-vector routing daemon")]
#[command(version)]
pub struct Cli {
    /// Path to the router's INI-style config file.
    pub config: PathBuf,

    /// Enable debug-level logging.
    #[arg(short, long)]
    pub debug: bool,

    /// Dump the routing table as JSON instead of the human-readable table.
    #[arg(long)]
    pub autotesting: bool,
}
