//! Zombie connection reaper.
//!
//! Broker-side connection state left behind by clients that vanished
//! without cleanup is detected and evicted here. Two cooperating halves
//! share one connection table:
//!
//! - the *check-request listener* answers liveness queries from peer nodes;
//! - the *killer loop* periodically ages records through
//!   `Active -> Suspect -> Zombie -> Reaped` and releases the transport
//!   resources of confirmed zombies.
//!
//! Transitions are monotonic except for two activity-driven resets:
//! `Suspect -> Active` on a genuine activity event, and `Zombie -> Active`
//! when any peer claims the connection during confirmation. Correctness
//! favors late reaping over reaping a live connection.

use crate::core::config::ReaperConfig;
use crate::core::time::Clock;
use crate::messaging::transport::{Envelope, Transport, TransportError, ZOMBIE_CHECK_TOPIC};
use crate::ops::audit;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lifecycle state of a tracked connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Recent activity within the grace window.
    Active,
    /// No activity for at least one grace window.
    Suspect,
    /// Candidate for eviction pending peer confirmation.
    Zombie,
    /// Resources released; the record is removed immediately after.
    Reaped,
}

/// Broker-side bookkeeping for one client connection.
#[derive(Debug, Clone)]
pub struct ConnectionRecord {
    pub id: Uuid,
    /// Owning resource binding (producer/consumer name) released on reap.
    pub resource: String,
    pub last_activity: Instant,
    pub state: ConnectionState,
}

/// Liveness query sent to peers before reaping. Transient; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZombieCheckRequest {
    pub connection_id: Uuid,
    pub requester_id: String,
    pub issued_at: DateTime<Utc>,
}

/// Positive liveness claim from a peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZombieCheckReply {
    pub connection_id: Uuid,
    pub responder_id: String,
    pub active: bool,
}

/// Summary of one killer-loop pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub suspected: usize,
    pub zombified: usize,
    pub revived: usize,
    pub reaped: usize,
    /// Zombies left in place because confirmation infrastructure failed.
    pub pending: usize,
    pub release_failures: usize,
}

struct StateAdvance {
    suspected: usize,
    zombified: usize,
    candidates: Vec<(Uuid, String)>,
}

/// Shared connection table. Every transition is applied as a single update
/// under the table-wide write lock so neither half observes a record
/// mid-transition.
#[derive(Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<RwLock<HashMap<Uuid, ConnectionRecord>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection created by the transport layer.
    pub fn register(&self, id: Uuid, resource: &str, now: Instant) {
        self.inner.write().insert(
            id,
            ConnectionRecord {
                id,
                resource: resource.to_string(),
                last_activity: now,
                state: ConnectionState::Active,
            },
        );
    }

    /// Activity event from the transport layer. Resets `Active`/`Suspect`
    /// records; a record already past `Suspect` is never resurrected by
    /// plain activity. Returns whether the event was applied.
    pub fn touch(&self, id: Uuid, now: Instant) -> bool {
        let mut table = self.inner.write();
        match table.get_mut(&id) {
            Some(record)
                if matches!(
                    record.state,
                    ConnectionState::Active | ConnectionState::Suspect
                ) =>
            {
                record.state = ConnectionState::Active;
                record.last_activity = now;
                true
            }
            _ => false,
        }
    }

    pub fn state(&self, id: Uuid) -> Option<ConnectionState> {
        self.inner.read().get(&id).map(|record| record.state)
    }

    /// Whether a peer query should count this connection as live here.
    pub fn is_locally_active(&self, id: Uuid) -> bool {
        matches!(
            self.state(id),
            Some(ConnectionState::Active | ConnectionState::Suspect)
        )
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<ConnectionRecord> {
        self.inner.read().values().cloned().collect()
    }

    /// Age records one step and collect zombie candidates. A record is
    /// advanced at most one state per pass, so a connection is always
    /// observed as `Suspect` for a full scan interval before it can become
    /// a zombie.
    fn advance_states(&self, now: Instant, grace: Duration, threshold: Duration) -> StateAdvance {
        let mut table = self.inner.write();
        let mut advance = StateAdvance {
            suspected: 0,
            zombified: 0,
            candidates: Vec::new(),
        };
        for record in table.values_mut() {
            let idle = now.saturating_duration_since(record.last_activity);
            match record.state {
                ConnectionState::Active if idle > grace => {
                    record.state = ConnectionState::Suspect;
                    advance.suspected += 1;
                }
                ConnectionState::Suspect if idle > threshold => {
                    record.state = ConnectionState::Zombie;
                    advance.zombified += 1;
                    advance.candidates.push((record.id, record.resource.clone()));
                }
                ConnectionState::Zombie => {
                    // Left over from a pass whose confirmation failed.
                    advance.candidates.push((record.id, record.resource.clone()));
                }
                _ => {}
            }
        }
        advance
    }

    /// Peer claimed the connection is alive: reset to `Active`.
    fn revive_zombie(&self, id: Uuid, now: Instant) -> bool {
        let mut table = self.inner.write();
        match table.get_mut(&id) {
            Some(record) if record.state == ConnectionState::Zombie => {
                record.state = ConnectionState::Active;
                record.last_activity = now;
                true
            }
            _ => false,
        }
    }

    fn mark_reaped(&self, id: Uuid) -> bool {
        let mut table = self.inner.write();
        match table.get_mut(&id) {
            Some(record) if record.state == ConnectionState::Zombie => {
                record.state = ConnectionState::Reaped;
                true
            }
            _ => false,
        }
    }

    fn remove_reaped(&self, id: Uuid) {
        let mut table = self.inner.write();
        if table
            .get(&id)
            .is_some_and(|record| record.state == ConnectionState::Reaped)
        {
            table.remove(&id);
        }
    }
}

/// Timing knobs for the reaper, resolved from configuration.
#[derive(Debug, Clone)]
pub struct ReaperTimings {
    pub grace_window: Duration,
    pub zombie_threshold: Duration,
    pub scan_interval: Duration,
    pub confirm_timeout: Duration,
}

impl From<&ReaperConfig> for ReaperTimings {
    fn from(config: &ReaperConfig) -> Self {
        Self {
            grace_window: config.grace_window(),
            zombie_threshold: config.zombie_threshold(),
            scan_interval: config.scan_interval(),
            confirm_timeout: config.confirm_timeout(),
        }
    }
}

enum ConfirmOutcome {
    /// At least one peer claims the connection.
    Alive,
    /// No peer claimed it within the confirmation timeout.
    Unclaimed,
    /// Confirmation infrastructure failed; do not reap on bad evidence.
    Indeterminate,
}

/// Zombie connection reaper; cheap to clone, both halves share the table.
#[derive(Clone)]
pub struct ZombieReaper<C: Clock> {
    node_id: String,
    table: ConnectionTable,
    transport: Arc<dyn Transport>,
    clock: C,
    timings: ReaperTimings,
}

impl<C: Clock> ZombieReaper<C> {
    pub fn new(
        node_id: &str,
        table: ConnectionTable,
        transport: Arc<dyn Transport>,
        clock: C,
        timings: ReaperTimings,
    ) -> Self {
        Self {
            node_id: node_id.to_string(),
            table,
            transport,
            clock,
            timings,
        }
    }

    pub fn table(&self) -> ConnectionTable {
        self.table.clone()
    }

    /// Subscribe the check-request listener and spawn its loop. The
    /// subscription itself happens synchronously: its failure is a fatal
    /// startup condition for the caller.
    pub fn subscribe_check_listener(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>, TransportError> {
        let mut sub = self.transport.subscribe(ZOMBIE_CHECK_TOPIC)?;
        let reaper = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("zombie check listener stopping");
                            break;
                        }
                    }
                    envelope = sub.next() => {
                        match envelope {
                            Some(envelope) => reaper.handle_check_request(&envelope),
                            None => {
                                tracing::error!("zombie check subscription lost; listener exiting");
                                break;
                            }
                        }
                    }
                }
            }
        });
        Ok(handle)
    }

    /// Spawn the killer loop on its fixed cadence.
    pub fn spawn_killer_loop(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let reaper = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::debug!("killer loop stopping");
                            break;
                        }
                    }
                    () = reaper.clock.sleep(reaper.timings.scan_interval) => {
                        let report = reaper.scan_once().await;
                        if report.reaped > 0 || report.revived > 0 || report.release_failures > 0 {
                            tracing::info!(
                                reaped = report.reaped,
                                revived = report.revived,
                                release_failures = report.release_failures,
                                "zombie scan pass"
                            );
                        }
                    }
                }
            }
        })
    }

    fn handle_check_request(&self, envelope: &Envelope) {
        let request: ZombieCheckRequest = match serde_json::from_slice(&envelope.payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!("malformed zombie check request skipped: {err}");
                return;
            }
        };
        // Own queries fan back to this listener; never vouch for the
        // connection under confirmation.
        if request.requester_id == self.node_id {
            return;
        }
        let Some(reply_to) = envelope.reply_to.as_deref() else {
            return;
        };
        if !self.table.is_locally_active(request.connection_id) {
            return;
        }
        let reply = ZombieCheckReply {
            connection_id: request.connection_id,
            responder_id: self.node_id.clone(),
            active: true,
        };
        match serde_json::to_vec(&reply) {
            Ok(payload) => {
                if let Err(err) = self.transport.publish(reply_to, payload) {
                    tracing::warn!("zombie check reply failed: {err}");
                }
            }
            Err(err) => tracing::warn!("zombie check reply encoding failed: {err}"),
        }
    }

    /// One killer-loop pass: age states, confirm candidates with peers,
    /// reap unclaimed zombies. A failure against one connection never halts
    /// the scan of the rest.
    pub async fn scan_once(&self) -> ScanReport {
        let now = self.clock.now();
        let advance = self.table.advance_states(
            now,
            self.timings.grace_window,
            self.timings.zombie_threshold,
        );
        let mut report = ScanReport {
            suspected: advance.suspected,
            zombified: advance.zombified,
            ..ScanReport::default()
        };
        for (id, resource) in advance.candidates {
            match self.confirm_liveness(id).await {
                ConfirmOutcome::Alive => {
                    if self.table.revive_zombie(id, self.clock.now()) {
                        tracing::info!(connection = %id, "peer claimed connection; reset to active");
                        report.revived += 1;
                    }
                }
                ConfirmOutcome::Indeterminate => {
                    report.pending += 1;
                }
                ConfirmOutcome::Unclaimed => {
                    if !self.table.mark_reaped(id) {
                        // Activity cannot reach a zombie, but another scan
                        // pass may have claimed it.
                        continue;
                    }
                    if let Err(err) = self.transport.release_resource(&resource) {
                        tracing::warn!(connection = %id, "resource release failed: {err}");
                        report.release_failures += 1;
                    }
                    self.table.remove_reaped(id);
                    audit::emit(
                        "connection_reaped",
                        &id.to_string(),
                        &format!("released binding {resource}"),
                    );
                    report.reaped += 1;
                }
            }
        }
        report
    }

    /// Ask peers whether anyone still owns the connection, bounded by the
    /// configured confirmation timeout.
    async fn confirm_liveness(&self, connection_id: Uuid) -> ConfirmOutcome {
        let reply_subject = format!("{ZOMBIE_CHECK_TOPIC}.reply.{}", Uuid::new_v4());
        let mut replies = match self.transport.subscribe(&reply_subject) {
            Ok(sub) => sub,
            Err(err) => {
                tracing::warn!("liveness reply subscription failed: {err}");
                return ConfirmOutcome::Indeterminate;
            }
        };
        let request = ZombieCheckRequest {
            connection_id,
            requester_id: self.node_id.clone(),
            issued_at: Utc::now(),
        };
        let payload = match serde_json::to_vec(&request) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!("zombie check encoding failed: {err}");
                return ConfirmOutcome::Indeterminate;
            }
        };
        if let Err(err) =
            self.transport
                .publish_with_reply(ZOMBIE_CHECK_TOPIC, payload, &reply_subject)
        {
            tracing::warn!("zombie check publish failed: {err}");
            return ConfirmOutcome::Indeterminate;
        }
        let claimed = tokio::time::timeout(self.timings.confirm_timeout, async {
            while let Some(envelope) = replies.next().await {
                if let Ok(reply) = serde_json::from_slice::<ZombieCheckReply>(&envelope.payload) {
                    if reply.connection_id == connection_id && reply.active {
                        return true;
                    }
                }
            }
            false
        })
        .await;
        match claimed {
            Ok(true) => ConfirmOutcome::Alive,
            // Timeout with no positive claim means no peer owns it.
            Ok(false) | Err(_) => ConfirmOutcome::Unclaimed,
        }
    }
}
