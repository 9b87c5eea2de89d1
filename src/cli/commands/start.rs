//! Start command - boots the Meridian broker layer and waits for shutdown.

use crate::cli::args::StartArgs;
use crate::core::config::Config;
use crate::core::runtime::BrokerNode;
use crate::core::time::SystemClock;
use crate::messaging::transport::{InProcessTransport, Transport};
use crate::ops::telemetry;
use anyhow::Result;
use std::sync::Arc;

pub async fn run_start(args: StartArgs) -> Result<()> {
    let config = Config::resolve(args.config.as_deref())?;
    let log_handle = telemetry::init_tracing(config.telemetry.log_level.as_deref())?;
    // Embedded transport core; a clustered deployment wires its own.
    let transport: Arc<dyn Transport> = Arc::new(InProcessTransport::new());
    let mut node = BrokerNode::bootstrap(config, transport, SystemClock, Some(log_handle)).await?;
    node.wait_for_shutdown().await?;
    node.shutdown().await
}
