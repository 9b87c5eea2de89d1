//! Meridian CLI - command-line interface.
//!
//! Provides the binary entry points:
//! - `meridian start` - Start the broker layer
//! - `meridian check-config` - Validate a configuration file and exit

mod args;
pub mod commands;

pub use args::{CheckConfigArgs, Cli, Commands, StartArgs};
