//! Best-effort analytics collaborator.
//!
//! Telemetry only: initialization failure and emission failure never affect
//! broker function. Deployments opt out entirely via configuration or the
//! MERIDIAN_ANALYTICS environment variable; the orchestrator substitutes a
//! disabled handle when initialization fails.

use crate::core::config::AnalyticsConfig;
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AnalyticsEvent {
    pub name: String,
    pub at: DateTime<Utc>,
}

/// Handle through which the broker layer records analytics events.
#[derive(Clone)]
pub struct AnalyticsHandle {
    enabled: bool,
    endpoint: Option<String>,
    events: Arc<Mutex<Vec<AnalyticsEvent>>>,
}

/// Initialize the analytics collaborator from configuration. The caller
/// treats an error as Degraded-NonFatal.
pub fn init(config: &AnalyticsConfig) -> Result<AnalyticsHandle> {
    let mut enabled = config.enabled;
    if let Ok(flag) = std::env::var("MERIDIAN_ANALYTICS") {
        if flag.eq_ignore_ascii_case("false") || flag == "0" {
            enabled = false;
        }
    }
    if let Some(endpoint) = &config.endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            bail!("analytics endpoint {endpoint} is not an http(s) URL");
        }
    }
    Ok(AnalyticsHandle {
        enabled,
        endpoint: config.endpoint.clone(),
        events: Arc::new(Mutex::new(Vec::new())),
    })
}

impl AnalyticsHandle {
    /// Handle that records nothing; used after a failed init or opt-out.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record one event. Best-effort: disabled handles drop silently.
    pub fn record(&self, name: &str) {
        if !self.enabled {
            return;
        }
        tracing::debug!(event = name, endpoint = ?self.endpoint, "analytics event");
        self.events.lock().push(AnalyticsEvent {
            name: name.to_string(),
            at: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> Vec<AnalyticsEvent> {
        self.events.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enabled_handle_records_events() {
        let handle = init(&AnalyticsConfig::default()).unwrap();
        assert!(handle.is_enabled());
        handle.record("node-started");
        let events = handle.snapshot();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "node-started");
    }

    #[test]
    fn config_opt_out_disables_recording() {
        let config = AnalyticsConfig {
            enabled: false,
            endpoint: None,
        };
        let handle = init(&config).unwrap();
        assert!(!handle.is_enabled());
        handle.record("node-started");
        assert!(handle.snapshot().is_empty());
    }

    #[test]
    fn malformed_endpoint_fails_init() {
        let config = AnalyticsConfig {
            enabled: true,
            endpoint: Some("segment.example.com".into()),
        };
        assert!(init(&config).is_err());
    }

    #[test]
    fn disabled_handle_is_inert() {
        let handle = AnalyticsHandle::disabled();
        handle.record("ignored");
        assert!(handle.snapshot().is_empty());
        assert!(!handle.is_enabled());
    }
}
