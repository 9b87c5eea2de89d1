//! Operations and observability.
//!
//! This module provides operational tooling:
//! - `telemetry` - Structured logging setup
//! - `audit` - Operational event sink
//! - `analytics` - Best-effort analytics collaborator

pub mod analytics;
pub mod audit;
pub mod telemetry;

pub use analytics::*;
pub use audit::*;
pub use telemetry::*;
