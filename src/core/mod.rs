//! Core runtime infrastructure.
//!
//! This module contains the essential components for running the Meridian
//! broker layer:
//! - `config` - Configuration parsing and validation
//! - `runtime` - Broker node bootstrap and lifecycle
//! - `time` - Deterministic time utilities

pub mod config;
pub mod runtime;
pub mod time;

pub use config::*;
pub use runtime::*;
pub use time::*;
