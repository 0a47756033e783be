//! # Coordination Node
//!
//! Runs one coordination-layer process until Ctrl+C.
//!
//! 1. Initialize telemetry (logs and metrics)
//! 2. Load and validate `CL_*` configuration
//! 3. Connect the backend and wire the components
//! 4. Start the broker, maintenance tasks and admin endpoint
//! 5. Shut down gracefully on Ctrl+C

use anyhow::{Context, Result};
use tracing::info;

use cl_telemetry::{init_telemetry, TelemetryConfig};
use coordination_runtime::{CoordinationContext, CoordinationRuntime, RuntimeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = TelemetryConfig::from_env();
    let _telemetry_guard = init_telemetry(&telemetry).context("Failed to initialize telemetry")?;

    let config = RuntimeConfig::from_env().context("Invalid configuration")?;
    info!(
        node_id = %config.node_id,
        backend = ?config.backend,
        metrics_port = telemetry.metrics_port,
        "Configuration loaded"
    );

    let context = CoordinationContext::build(config)
        .await
        .context("Failed to build coordination context")?;
    let runtime = CoordinationRuntime::new(context);
    runtime.start();
    let admin_addr = runtime
        .start_admin(telemetry.metrics_port)
        .await
        .context("Failed to bind admin endpoint")?;
    info!(%admin_addr, "Serving /health and /metrics");

    info!("Node is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    runtime.shutdown().await;
    Ok(())
}
