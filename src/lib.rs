#![deny(clippy::all, clippy::pedantic)]
// Module naming: common pattern in domain-driven code
#![allow(clippy::module_name_repetitions)]
// Function complexity: bootstrap sequencing is inherently long
#![allow(clippy::too_many_lines)]
// Documentation style: many terms don't need backticks
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
// API ergonomics: prefer simplicity over must_use annotations
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
// Format strings: allow non-inlined for readability
#![allow(clippy::uninlined_format_args)]
// Import style
#![allow(clippy::wildcard_imports)]
// Control flow style
#![allow(clippy::single_match_else)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::map_unwrap_or)]
// Passing style
#![allow(clippy::needless_pass_by_value)]
// Self usage
#![allow(clippy::unused_self)]
// Option/Result patterns
#![allow(clippy::unnecessary_wraps)]
// Async functions that may not await yet
#![allow(clippy::unused_async)]

//! Meridian - startup orchestration and resource reclamation for a
//! message-broker node.
//!
//! # Module Organization
//!
//! ## Core
//! - `core::config` - Configuration parsing and validation
//! - `core::runtime` - Broker node bootstrap and lifecycle
//! - `core::time` - Deterministic time utilities
//!
//! ## Control Plane
//! - `control::accounts` - Administrative account provisioning
//! - `control::api` - Admin request handlers against the metadata store
//!
//! ## Messaging
//! - `messaging::transport` - Pub/sub transport abstraction
//! - `messaging::reaper` - Zombie connection detection and eviction
//! - `messaging::poison` - Poison message listener and dead-letter records
//! - `messaging::system_stream` - Broker-owned operational log stream
//!
//! ## Storage
//! - `storage::metadata` - Metadata store handle and implementations
//!
//! ## Operations
//! - `ops::telemetry` - Structured logging setup
//! - `ops::audit` - Operational event sink
//! - `ops::analytics` - Best-effort analytics collaborator
//!
//! ## CLI
//! - `cli` - Command-line entry points

// Core infrastructure
pub mod core;

// Control plane
pub mod control;

// Messaging
pub mod messaging;

// Storage
pub mod storage;

// Operations
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, runtime, time};
pub use control::{accounts, api};
pub use messaging::{poison, reaper, system_stream, transport};
pub use ops::{analytics, audit, telemetry};
pub use storage::metadata;
