//! Message handling infrastructure.
//!
//! This module provides the broker-layer messaging subsystems:
//! - `transport` - Pub/sub transport abstraction and in-process core
//! - `reaper` - Zombie connection detection and eviction
//! - `poison` - Poison message listener and dead-letter records
//! - `system_stream` - Broker-owned operational log stream

pub mod poison;
pub mod reaper;
pub mod system_stream;
pub mod transport;

pub use poison::*;
pub use reaper::*;
pub use system_stream::*;
pub use transport::*;
