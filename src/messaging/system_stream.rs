//! Broker-owned operational log stream.
//!
//! The system stream records operational and audit events. It must exist
//! before any component writes to it, but its creation is best-effort
//! relative to core availability: the orchestrator fires the task and does
//! not await it before declaring the node ready.

use crate::messaging::transport::{StreamCreation, Transport, SYSTEM_LOG_STREAM};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Create the system log stream if absent. "Already exists" is success.
pub fn ensure_system_stream(
    transport: &Arc<dyn Transport>,
) -> Result<StreamCreation, crate::messaging::transport::TransportError> {
    transport.ensure_stream(SYSTEM_LOG_STREAM)
}

/// Fire-and-forget creation task. Failure is observable via logging and
/// does not block startup.
pub fn spawn(transport: Arc<dyn Transport>) -> JoinHandle<()> {
    tokio::spawn(async move {
        match ensure_system_stream(&transport) {
            Ok(StreamCreation::Created) => {
                tracing::info!("system log stream created");
            }
            Ok(StreamCreation::AlreadyExists) => {
                tracing::debug!("system log stream already present");
            }
            Err(err) => {
                tracing::warn!("system log stream creation failed: {err}");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::transport::InProcessTransport;

    #[test]
    fn creation_is_idempotent() {
        let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new());
        assert_eq!(
            ensure_system_stream(&transport).unwrap(),
            StreamCreation::Created
        );
        assert_eq!(
            ensure_system_stream(&transport).unwrap(),
            StreamCreation::AlreadyExists
        );
    }

    #[tokio::test]
    async fn spawned_task_tolerates_a_core_without_durable_streams() {
        let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::without_durable_streams());
        // Must complete without panicking; the failure is logged only.
        spawn(transport).await.unwrap();
    }
}
