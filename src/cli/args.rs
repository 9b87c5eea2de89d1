//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Meridian - message-broker node bootstrap and resource reclamation.
#[derive(Parser)]
#[command(name = "meridian")]
#[command(version)]
#[command(about = "Meridian broker node")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the broker node
    Start(StartArgs),

    /// Validate a configuration file and exit
    CheckConfig(CheckConfigArgs),
}

#[derive(Args)]
pub struct StartArgs {
    /// Path to configuration file; defaults to MERIDIAN_CONFIG or
    /// config/meridian.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args)]
pub struct CheckConfigArgs {
    /// Path to configuration file; defaults to MERIDIAN_CONFIG or
    /// config/meridian.toml
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
