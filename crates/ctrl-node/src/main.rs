//! # Control Node Binary
//!
//! 1. Load configuration from the environment
//! 2. Install logging
//! 3. Validate the HMAC secret is not default
//! 4. Start the node and run until Ctrl+C

use anyhow::{Context, Result};
use ctrl_node::{telemetry, ControlNode, NodeConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = NodeConfig::from_env().context("failed to load configuration")?;
    telemetry::init(&config.log)?;

    config
        .validate_for_production()
        .context("refusing to start with an insecure configuration")?;

    let node = ControlNode::start(config)
        .await
        .context("failed to start control node")?;

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    node.shutdown().await.context("unclean shutdown")?;
    Ok(())
}
