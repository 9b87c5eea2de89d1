//! Pub/sub transport abstraction.
//!
//! The transport core (connection acceptance, message delivery, durable
//! streams) is an external collaborator; the broker layer only needs the
//! narrow surface below. [`InProcessTransport`] is the embedded core used
//! by the `start` command and by tests; a clustered deployment substitutes
//! its own implementation.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Internal topic carrying delivery-failure notifications from the
/// transport layer.
pub const POISON_TOPIC: &str = "$MDN.poison.notifications";

/// Internal topic carrying zombie liveness queries between nodes.
pub const ZOMBIE_CHECK_TOPIC: &str = "$MDN.zombies.check";

/// Broker-owned stream recording operational events.
pub const SYSTEM_LOG_STREAM: &str = "$MDN.system.logs";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("subscription rejected for {0}")]
    SubscribeRejected(String),
    #[error("publish failed for {0}")]
    PublishFailed(String),
    #[error("stream creation failed for {0}")]
    StreamRejected(String),
    #[error("resource release failed for {0}")]
    ReleaseFailed(String),
}

/// A delivered message. `reply_to` is set when the publisher expects a
/// response on a dedicated subject.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub payload: Vec<u8>,
    pub reply_to: Option<String>,
}

/// Receiving half of a subscription. Dropping it detaches from the topic.
pub struct Subscription {
    topic: String,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message; `None` means the transport dropped the
    /// subscription.
    pub async fn next(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

/// Outcome of an idempotent stream creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCreation {
    Created,
    AlreadyExists,
}

/// Narrow transport surface consumed by the broker layer.
pub trait Transport: Send + Sync + 'static {
    /// Whether the default namespace supports durable streams. Required by
    /// the broker layer; absence is a fatal misconfiguration.
    fn supports_durable_streams(&self) -> bool;

    /// Create a durable stream if absent.
    fn ensure_stream(&self, name: &str) -> Result<StreamCreation, TransportError>;

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Publish with a reply subject attached to the envelope.
    fn publish_with_reply(
        &self,
        topic: &str,
        payload: Vec<u8>,
        reply_to: &str,
    ) -> Result<(), TransportError>;

    fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError>;

    /// Release broker-side resources bound to a connection (producers,
    /// consumers, subscriptions).
    fn release_resource(&self, binding: &str) -> Result<(), TransportError>;
}

#[derive(Default)]
struct InProcessShared {
    topics: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Envelope>>>>,
    streams: Mutex<HashSet<String>>,
    released: Mutex<Vec<String>>,
    denied_topics: Mutex<HashSet<String>>,
    failing_releases: Mutex<HashSet<String>>,
}

/// In-process fan-out transport. Every subscriber of a topic receives every
/// message published to it; reply subjects are ordinary topics.
///
/// Carries narrow fault hooks (denied subscriptions, failing releases) so
/// startup and reaper failure paths stay testable without a real cluster.
#[derive(Clone)]
pub struct InProcessTransport {
    shared: Arc<InProcessShared>,
    durable_streams: bool,
}

impl Default for InProcessTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(InProcessShared::default()),
            durable_streams: true,
        }
    }

    /// Core without durable-stream support; the bootstrap capability check
    /// must refuse it.
    pub fn without_durable_streams() -> Self {
        Self {
            shared: Arc::new(InProcessShared::default()),
            durable_streams: false,
        }
    }

    /// Reject future subscriptions to `topic`.
    pub fn deny_subscriptions_on(&self, topic: &str) {
        self.shared.denied_topics.lock().insert(topic.to_string());
    }

    /// Make `release_resource` fail for `binding`.
    pub fn fail_release_of(&self, binding: &str) {
        self.shared
            .failing_releases
            .lock()
            .insert(binding.to_string());
    }

    /// Bindings released so far, in release order.
    pub fn released(&self) -> Vec<String> {
        self.shared.released.lock().clone()
    }

    /// Total live subscriptions across all topics.
    pub fn subscription_count(&self) -> usize {
        let mut topics = self.shared.topics.lock();
        topics
            .values_mut()
            .map(|senders| {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            })
            .sum()
    }

    pub fn stream_exists(&self, name: &str) -> bool {
        self.shared.streams.lock().contains(name)
    }

    fn fan_out(&self, topic: &str, envelope: Envelope) {
        let mut topics = self.shared.topics.lock();
        if let Some(senders) = topics.get_mut(topic) {
            senders.retain(|tx| tx.send(envelope.clone()).is_ok());
        }
    }
}

impl Transport for InProcessTransport {
    fn supports_durable_streams(&self) -> bool {
        self.durable_streams
    }

    fn ensure_stream(&self, name: &str) -> Result<StreamCreation, TransportError> {
        if !self.durable_streams {
            return Err(TransportError::StreamRejected(name.to_string()));
        }
        let mut streams = self.shared.streams.lock();
        if streams.insert(name.to_string()) {
            Ok(StreamCreation::Created)
        } else {
            Ok(StreamCreation::AlreadyExists)
        }
    }

    fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        self.fan_out(
            topic,
            Envelope {
                payload,
                reply_to: None,
            },
        );
        Ok(())
    }

    fn publish_with_reply(
        &self,
        topic: &str,
        payload: Vec<u8>,
        reply_to: &str,
    ) -> Result<(), TransportError> {
        self.fan_out(
            topic,
            Envelope {
                payload,
                reply_to: Some(reply_to.to_string()),
            },
        );
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<Subscription, TransportError> {
        if self.shared.denied_topics.lock().contains(topic) {
            return Err(TransportError::SubscribeRejected(topic.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared
            .topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription {
            topic: topic.to_string(),
            rx,
        })
    }

    fn release_resource(&self, binding: &str) -> Result<(), TransportError> {
        if self.shared.failing_releases.lock().contains(binding) {
            return Err(TransportError::ReleaseFailed(binding.to_string()));
        }
        self.shared.released.lock().push(binding.to_string());
        Ok(())
    }
}
