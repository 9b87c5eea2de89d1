//! Meridian - unified CLI entrypoint.
//!
//! Usage:
//!   meridian start --config config/meridian.toml
//!   meridian check-config --config config/meridian.toml

use anyhow::Result;
use clap::Parser;
use meridian::cli::commands::{run_check_config, run_start};
use meridian::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => run_start(args).await,
        Commands::CheckConfig(args) => run_check_config(args),
    }
}
