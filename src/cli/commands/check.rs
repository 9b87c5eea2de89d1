//! Check-config command - validates a configuration file and exits 0.

use crate::cli::args::CheckConfigArgs;
use crate::core::config::{self, Config};
use anyhow::Result;

pub fn run_check_config(args: CheckConfigArgs) -> Result<()> {
    let path = config::config_path(args.config.as_deref());
    let config = Config::load(&path)?;
    config.validate()?;
    println!("configuration file {} is valid", path.display());
    Ok(())
}
