//! Command implementations.

mod check;
mod start;

pub use check::run_check_config;
pub use start::run_start;
