use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "metric-store", about = "Clustered Prometheus-compatible metric store")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to the node's TOML configuration file.
    #[arg(default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a sample configuration file and exit.
    GenerateConfig,
    /// Print the build version and exit.
    Version,
}
