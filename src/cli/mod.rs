//! CLI interface for scale-engine
//!
//! Provides subcommands for:
//! - `simulate`: Drive one position through a synthetic price path
//! - `validate`: Check a configuration file
//! - `config`: Show the effective configuration

mod simulate;

pub use simulate::SimulateArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "scale-engine")]
#[command(about = "Position scaling and staged profit-taking engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Simulate one position against the paper adapter
    Simulate(SimulateArgs),
    /// Load and validate the configuration
    Validate,
    /// Show the effective configuration
    Config,
}
