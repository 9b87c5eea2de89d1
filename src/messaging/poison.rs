//! Poison message listener.
//!
//! The transport layer reports messages that exceeded their delivery or
//! processing retry budget on an internal topic. Each notification is
//! turned into a durable dead-letter record: every notification yields
//! exactly one persisted record, and a malformed or briefly unstorable
//! notification never stalls the loop.

use crate::messaging::transport::{Transport, TransportError, POISON_TOPIC};
use crate::ops::audit;
use crate::storage::metadata::MetadataStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Number of persist attempts before a notification is counted as dropped.
const PERSIST_ATTEMPTS: u32 = 3;

/// Pause between persist attempts.
const PERSIST_BACKOFF: Duration = Duration::from_millis(50);

/// Failure notification emitted by the transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonNotification {
    pub payload: Vec<u8>,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_error: String,
}

impl PoisonNotification {
    pub fn new(payload: Vec<u8>, failure_count: u32, last_error: &str) -> Self {
        Self {
            payload,
            failure_count,
            first_failed_at: Utc::now(),
            last_error: last_error.to_string(),
        }
    }
}

/// Durable dead-letter record for a message that could not be delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoisonMessage {
    pub original_payload: Vec<u8>,
    pub failure_count: u32,
    pub first_failed_at: DateTime<Utc>,
    pub last_error: String,
    pub recorded_at: DateTime<Utc>,
}

impl From<PoisonNotification> for PoisonMessage {
    fn from(notification: PoisonNotification) -> Self {
        Self {
            original_payload: notification.payload,
            failure_count: notification.failure_count,
            first_failed_at: notification.first_failed_at,
            last_error: notification.last_error,
            recorded_at: Utc::now(),
        }
    }
}

/// Disposition of one received notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoisonOutcome {
    Recorded,
    Malformed,
    DroppedAfterRetries,
}

/// Long-lived subscriber routing failure notifications into the store.
#[derive(Clone)]
pub struct PoisonListener {
    store: Arc<dyn MetadataStore>,
    transport: Arc<dyn Transport>,
    dropped: Arc<AtomicU64>,
}

impl PoisonListener {
    pub fn new(store: Arc<dyn MetadataStore>, transport: Arc<dyn Transport>) -> Self {
        Self {
            store,
            transport,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Notifications that exhausted their persist attempts. Nonzero values
    /// indicate a storage outage overlapping poison traffic.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Subscribe to the poison topic and spawn the listener loop.
    pub fn subscribe(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, TransportError> {
        let mut sub = self.transport.subscribe(POISON_TOPIC)?;
        let listener = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("poison listener stopping");
                            break;
                        }
                    }
                    envelope = sub.next() => {
                        match envelope {
                            Some(envelope) => {
                                listener.handle_notification(&envelope.payload).await;
                            }
                            None => {
                                tracing::error!("poison subscription lost; listener exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });
        Ok(handle)
    }

    /// Process one raw notification. Malformed payloads are logged and
    /// skipped; persist failures are retried a bounded number of times and
    /// then surfaced through the drop counter.
    pub async fn handle_notification(&self, payload: &[u8]) -> PoisonOutcome {
        let notification: PoisonNotification = match serde_json::from_slice(payload) {
            Ok(notification) => notification,
            Err(err) => {
                tracing::warn!("malformed poison notification skipped: {err}");
                return PoisonOutcome::Malformed;
            }
        };
        let message = PoisonMessage::from(notification);
        for attempt in 1..=PERSIST_ATTEMPTS {
            match self.store.append_poison_message(&message) {
                Ok(()) => {
                    audit::emit(
                        "poison_recorded",
                        "transport",
                        &format!("dead-lettered after {} failures", message.failure_count),
                    );
                    return PoisonOutcome::Recorded;
                }
                Err(err) if attempt < PERSIST_ATTEMPTS => {
                    tracing::warn!("poison persist attempt {attempt} failed: {err}");
                    tokio::time::sleep(PERSIST_BACKOFF).await;
                }
                Err(err) => {
                    tracing::error!("poison notification dropped after {attempt} attempts: {err}");
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        PoisonOutcome::DroppedAfterRetries
    }
}
