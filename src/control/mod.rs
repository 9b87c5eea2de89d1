//! Broker control plane.
//!
//! This module provides administrative bootstrapping and handler wiring:
//! - `accounts` - Administrative account provisioning
//! - `api` - Admin request handlers against the metadata store

pub mod accounts;
pub mod api;

pub use accounts::*;
pub use api::*;
