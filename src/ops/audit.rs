//! Operational event sink.
//!
//! Broker-layer components record lifecycle events (account provisioned,
//! connection reaped, poison message dead-lettered) here. Events land in
//! the process-local sink and, once a mirror is installed, fan out to the
//! system log stream. Recording never fails and never blocks the caller.

use std::sync::{Arc, Mutex, OnceLock};
use tracing::event;

#[derive(Debug, Clone)]
pub struct OpsEvent {
    /// Short machine-readable kind, e.g. "connection_reaped".
    pub event_type: String,
    /// Entity the event is about (identity, connection id, ...).
    pub subject: String,
    pub message: String,
}

#[derive(Clone, Default)]
pub struct OpsEventSink {
    inner: Arc<Mutex<Vec<OpsEvent>>>,
}

impl OpsEventSink {
    pub fn record(&self, event: OpsEvent) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.push(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mirror target for events; the runtime installs one backed by the system
/// log stream once the transport is wired.
pub trait OpsEventMirror: Send + Sync {
    fn mirror(&self, event: &OpsEvent);
}

static SINK: OnceLock<OpsEventSink> = OnceLock::new();
static MIRROR: OnceLock<Mutex<Option<Arc<dyn OpsEventMirror>>>> = OnceLock::new();

pub fn install_sink(sink: OpsEventSink) {
    let _ = SINK.set(sink);
}

pub fn install_mirror(mirror: Arc<dyn OpsEventMirror>) {
    let cell = MIRROR.get_or_init(|| Mutex::new(None));
    if let Ok(mut guard) = cell.lock() {
        *guard = Some(mirror);
    }
}

pub fn sink_len() -> usize {
    SINK.get().map(|s| s.len()).unwrap_or(0)
}

/// Copy of recorded events, for admin surfacing and tests.
pub fn snapshot() -> Vec<OpsEvent> {
    SINK.get()
        .and_then(|s| s.inner.lock().ok().map(|g| g.clone()))
        .unwrap_or_default()
}

/// Emit one operational event.
pub fn emit(event_type: &str, subject: &str, message: &str) {
    event!(
        target: "ops",
        tracing::Level::INFO,
        %event_type,
        %subject,
        %message
    );
    let sink = SINK.get_or_init(OpsEventSink::default);
    let event = OpsEvent {
        event_type: event_type.to_string(),
        subject: subject.to_string(),
        message: message.to_string(),
    };
    sink.record(event.clone());
    if let Some(lock) = MIRROR.get() {
        if let Ok(guard) = lock.lock() {
            if let Some(mirror) = guard.as_ref() {
                mirror.mirror(&event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_records_into_the_sink() {
        let before = sink_len();
        emit("test_event", "subject-1", "something happened");
        // Other tests share the process-wide sink; assert on growth and
        // presence rather than exact position.
        assert!(sink_len() > before);
        let events = snapshot();
        assert!(events
            .iter()
            .any(|e| e.event_type == "test_event" && e.subject == "subject-1"));
    }

    #[test]
    fn installed_mirror_sees_events() {
        struct Capture(Mutex<Vec<String>>);
        impl OpsEventMirror for Capture {
            fn mirror(&self, event: &OpsEvent) {
                if let Ok(mut guard) = self.0.lock() {
                    guard.push(event.event_type.clone());
                }
            }
        }
        let capture = Arc::new(Capture(Mutex::new(Vec::new())));
        install_mirror(capture.clone());
        emit("mirrored_event", "subject-2", "fan out");
        let seen = capture.0.lock().unwrap();
        assert!(seen.iter().any(|kind| kind == "mirrored_event"));
    }
}
