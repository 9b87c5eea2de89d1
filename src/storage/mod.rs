//! Durable metadata storage.
//!
//! This module provides the metadata store handle consumed by the broker
//! layer:
//! - `metadata` - Store trait plus file-backed and in-memory implementations

pub mod metadata;

pub use metadata::*;
