//! Common test harness utilities for integration tests.
//!
//! Provides configuration builders with short reaper timings, shared
//! in-memory collaborators, and a polling helper for asynchronous
//! assertions. All helpers use only existing dev-dependencies.

// Not all test files use all helpers; silence dead_code warnings for unused exports.
#![allow(dead_code)]

use meridian::config::{
    AnalyticsConfig, Config, ListenerConfig, NodeConfig, ReaperConfig, StorageConfig,
    TelemetryConfig,
};
use meridian::metadata::{MemoryStore, MetadataStore};
use meridian::transport::{InProcessTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Config with aggressive reaper timings suitable for tests. Analytics is
/// disabled so tests never depend on environment opt-outs.
pub fn test_config(name: &str, data_dir: &Path) -> Config {
    Config {
        node: NodeConfig {
            name: name.to_string(),
        },
        storage: StorageConfig {
            data_dir: data_dir.to_path_buf(),
        },
        listeners: ListenerConfig {
            client_bind: "127.0.0.1:6666".to_string(),
            admin_bind: "127.0.0.1:9000".to_string(),
        },
        reaper: ReaperConfig {
            grace_window_seconds: 30,
            zombie_threshold_seconds: 120,
            scan_interval_seconds: 1,
            confirm_timeout_millis: 50,
        },
        telemetry: TelemetryConfig::default(),
        analytics: AnalyticsConfig {
            enabled: false,
            endpoint: None,
        },
    }
}

pub fn memory_store() -> (MemoryStore, Arc<dyn MetadataStore>) {
    let store = MemoryStore::new();
    let handle: Arc<dyn MetadataStore> = Arc::new(store.clone());
    (store, handle)
}

pub fn in_process_transport() -> (InProcessTransport, Arc<dyn Transport>) {
    let transport = InProcessTransport::new();
    let handle: Arc<dyn Transport> = Arc::new(transport.clone());
    (transport, handle)
}

/// Poll `predicate` until it holds or the deadline passes.
pub async fn wait_until<F>(deadline: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    predicate()
}
