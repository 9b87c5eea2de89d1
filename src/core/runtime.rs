//! Broker node bootstrap and lifecycle.
//!
//! The orchestrator runs once at startup, synchronously performing the
//! steps that must succeed before the node is usable, then launches the
//! long-lived subsystems as background tasks owned by [`BrokerNode`].
//! Startup is fail-fast: any fatal step releases the acquired storage
//! handle and surfaces an error, which the process exits on with a
//! non-zero status. No partial startup is allowed.

use crate::control::api::AdminHandlers;
use crate::core::config::Config;
use crate::core::time::Clock;
use crate::messaging::poison::PoisonListener;
use crate::messaging::reaper::{ConnectionTable, ReaperTimings, ZombieReaper};
use crate::messaging::system_stream;
use crate::messaging::transport::{Transport, SYSTEM_LOG_STREAM};
use crate::ops::analytics::{self, AnalyticsHandle};
use crate::ops::audit::{self, OpsEvent, OpsEventMirror, OpsEventSink};
use crate::ops::telemetry::LogHandle;
use crate::storage::metadata::{self, MetadataStore};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How long `shutdown` waits for each background task before abandoning it.
const TASK_JOIN_GRACE: Duration = Duration::from_secs(5);

/// Mirrors operational events onto the system log stream.
struct SystemStreamMirror {
    transport: Arc<dyn Transport>,
}

impl OpsEventMirror for SystemStreamMirror {
    fn mirror(&self, event: &OpsEvent) {
        let line = format!(
            "{{\"event_type\":{:?},\"subject\":{:?},\"message\":{:?}}}",
            event.event_type, event.subject, event.message
        );
        // Operational logging is best-effort relative to core availability.
        if let Err(err) = self.transport.publish(SYSTEM_LOG_STREAM, line.into_bytes()) {
            tracing::debug!("system stream mirror publish failed: {err}");
        }
    }
}

/// The running broker-layer process: owns the storage handle, the transport
/// handle, and all background tasks. Created once at startup, destroyed at
/// shutdown.
pub struct BrokerNode<C: Clock> {
    config: Config,
    clock: C,
    store: Arc<dyn MetadataStore>,
    transport: Arc<dyn Transport>,
    connections: ConnectionTable,
    admin: AdminHandlers,
    analytics: AnalyticsHandle,
    tasks: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    log_handle: Option<LogHandle>,
}

impl<C: Clock> BrokerNode<C> {
    /// Bootstrap against the configured metadata store.
    pub async fn bootstrap(
        config: Config,
        transport: Arc<dyn Transport>,
        clock: C,
        log_handle: Option<LogHandle>,
    ) -> Result<Self> {
        config.validate()?;
        if !transport.supports_durable_streams() {
            bail!("transport core lacks durable stream support on the default namespace");
        }
        let store = metadata::open_store(&config.storage)
            .context("failed to acquire metadata store handle")?;
        Self::bootstrap_with_store(config, transport, store, clock, log_handle).await
    }

    /// Bootstrap with an already-open store handle. Performs the strict
    /// startup sequence; on a fatal step the store handle is released
    /// before the error is returned.
    pub async fn bootstrap_with_store(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn MetadataStore>,
        clock: C,
        log_handle: Option<LogHandle>,
    ) -> Result<Self> {
        if !transport.supports_durable_streams() {
            bail!("transport core lacks durable stream support on the default namespace");
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        audit::install_sink(OpsEventSink::default());

        // Telemetry-only collaborator: failure is logged and ignored.
        let analytics_handle = match analytics::init(&config.analytics) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!("analytics initialization failed: {err}");
                AnalyticsHandle::disabled()
            }
        };
        analytics_handle.record("node-started");

        // Admin handlers are wired before any background work so that
        // account provisioning strictly precedes administrative activity.
        let connections = ConnectionTable::new();
        let admin = AdminHandlers::new(store.clone(), connections.clone());

        let mut tasks = Vec::new();
        tasks.push(system_stream::spawn(transport.clone()));
        audit::install_mirror(Arc::new(SystemStreamMirror {
            transport: transport.clone(),
        }));

        if let Err(err) = crate::control::accounts::ensure_root_account(&store) {
            let _ = shutdown_tx.send(true);
            store.close();
            return Err(err).context("failed to provision administrative account");
        }

        let poison = PoisonListener::new(store.clone(), transport.clone());
        match poison.subscribe(shutdown_rx.clone()) {
            Ok(handle) => tasks.push(handle),
            // Only the reaper subscription is on the fatal list; a broker
            // without the poison listener is degraded, not down.
            Err(err) => tracing::warn!("poison listener subscription failed: {err}"),
        }

        let reaper = ZombieReaper::new(
            &config.node.name,
            connections.clone(),
            transport.clone(),
            clock.clone(),
            ReaperTimings::from(&config.reaper),
        );
        match reaper.subscribe_check_listener(shutdown_rx.clone()) {
            Ok(handle) => tasks.push(handle),
            Err(err) => {
                let _ = shutdown_tx.send(true);
                store.close();
                return Err(err).context("failed to subscribe zombie connection check requests");
            }
        }
        tasks.push(reaper.spawn_killer_loop(shutdown_rx.clone()));

        emit_ready_notice(&config);

        Ok(Self {
            config,
            clock,
            store,
            transport,
            connections,
            admin,
            analytics: analytics_handle,
            tasks,
            shutdown_tx,
            shutdown_rx,
            log_handle,
        })
    }

    /// The storage handle; the node owner is responsible for its release
    /// through [`BrokerNode::shutdown`].
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn admin(&self) -> &AdminHandlers {
        &self.admin
    }

    pub fn connections(&self) -> ConnectionTable {
        self.connections.clone()
    }

    pub fn analytics(&self) -> &AnalyticsHandle {
        &self.analytics
    }

    pub fn clock(&self) -> C {
        self.clock.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn log_handle(&self) -> Option<LogHandle> {
        self.log_handle.clone()
    }

    pub fn background_task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Ask the node to stop from another task.
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Block until CTRL+C or an internal shutdown request.
    pub async fn wait_for_shutdown(&mut self) -> Result<()> {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("shutdown signal received");
            }
            _ = self.shutdown_rx.changed() => {
                tracing::info!("shutdown requested by component");
            }
        }
        Ok(())
    }

    /// Stop background tasks and release the storage handle. Tasks get a
    /// grace period to observe the shutdown signal; stragglers are
    /// abandoned rather than blocking process exit.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown_tx
            .send(true)
            .context("failed to broadcast shutdown")?;
        for task in self.tasks.drain(..) {
            match tokio::time::timeout(TASK_JOIN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!("background task ended abnormally: {err}"),
                Err(_) => tracing::warn!("background task did not stop in time; abandoned"),
            }
        }
        self.analytics.record("node-shutdown");
        self.store.close();
        tracing::info!("meridian broker stopped");
        Ok(())
    }
}

/// Human-readable readiness notice. A container deployment (signaled by
/// MERIDIAN_DOCKER_ENV) gets the endpoint banner; the environment choice
/// has no behavioral effect beyond which notice is printed.
fn emit_ready_notice(config: &Config) {
    let containerized = std::env::var("MERIDIAN_DOCKER_ENV").is_ok_and(|v| !v.is_empty());
    let env = if containerized {
        tracing::info!(
            "\n**********\n\nDashboard: http://{admin}\nMeridian broker: {client} (client connections)\nMeridian broker: {admin} (CLI connections)\nUI/CLI root username - {user}\nUI/CLI root password - {pass}\nSDK connection token - {token}\n\n**********",
            admin = config.listeners.admin_bind,
            client = config.listeners.client_bind,
            user = crate::control::accounts::ROOT_IDENTITY,
            pass = crate::control::accounts::DEFAULT_ROOT_PASSWORD,
            token = crate::control::accounts::DEFAULT_CONNECTION_TOKEN,
        );
        "Docker"
    } else {
        "K8S"
    };
    tracing::info!("meridian broker is ready, env: {env}");
}
