//! # Coordination Telemetry
//!
//! Logging and metrics for coordination-layer processes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cl_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let config = TelemetryConfig::from_env();
//! let _guard = init_telemetry(&config)?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_SERVICE_NAME` | `coordination-layer` | Service name in logs |
//! | `CL_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `CL_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `CL_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `CL_METRICS_PORT` | `9100` | Prometheus metrics port |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{register_metrics, render_metrics, MetricsHandle};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Register metrics and install the tracing subscriber.
///
/// Hold the returned guard for the lifetime of the process.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_tracing(config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name.clone(),
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
