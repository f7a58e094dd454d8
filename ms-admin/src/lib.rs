//! Ambient process concerns: config loading, CLI parsing, logging setup,
//! and metrics registry installation. None of this is part of the data
//! plane or rule plane; it's what `metric-store`'s `main` wires up first.

pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;

pub use cli::{Cli, Command};
pub use config::{Config, SAMPLE_CONFIG};
