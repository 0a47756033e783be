//! Prometheus metrics for the coordination layer.
//!
//! All metrics follow the naming convention: `cl_<component>_<metric>`.
//!
//! Components keep their own counters and expose snapshots; the runtime
//! copies those snapshots into these gauges on a timer, so every metric here
//! is a gauge even when the underlying value only grows.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // BROKER
    // =========================================================================

    /// Broker event counts
    pub static ref BROKER_EVENTS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cl_broker_events", "Broker event counts since start"),
        // published/publish_failures/received/dispatched/handler_errors/
        // codec_errors/transport_errors/reconnects
        &["event"]
    ).expect("metric creation failed");

    /// Current reconnect delay
    pub static ref BROKER_BACKOFF_MS: IntGauge = IntGauge::new(
        "cl_broker_backoff_milliseconds",
        "Delay before the next reconnect attempt"
    ).expect("metric creation failed");

    /// Registered channels and patterns
    pub static ref BROKER_SUBSCRIPTIONS: IntGauge = IntGauge::new(
        "cl_broker_subscriptions",
        "Registered channel and pattern subscriptions"
    ).expect("metric creation failed");

    // =========================================================================
    // MESSAGE ORDERING
    // =========================================================================

    /// Message counts by outcome
    pub static ref ORDERING_MESSAGES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cl_ordering_messages", "Ordered message counts since start"),
        &["outcome"]  // total/processed/duplicates/failed/retried/dead_lettered
    ).expect("metric creation failed");

    /// Messages waiting in the local queue
    pub static ref ORDERING_QUEUE_DEPTH: IntGauge = IntGauge::new(
        "cl_ordering_queue_depth",
        "Messages waiting in the local queue"
    ).expect("metric creation failed");

    /// Highest global sequence assigned by this process
    pub static ref ORDERING_GLOBAL_SEQUENCE: IntGauge = IntGauge::new(
        "cl_ordering_global_sequence",
        "Highest global sequence assigned by this process"
    ).expect("metric creation failed");

    /// Partitions seen by this process
    pub static ref ORDERING_PARTITIONS: IntGauge = IntGauge::new(
        "cl_ordering_partitions",
        "Partitions seen by this process"
    ).expect("metric creation failed");

    // =========================================================================
    // LOCKS AND DEDUP
    // =========================================================================

    /// Lock operation counts
    pub static ref LOCK_OPERATIONS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("cl_lock_operations", "Distributed lock operations since start"),
        &["operation"]  // acquired/waited/contended/released/extended/ownership_mismatches
    ).expect("metric creation failed");

    /// Ids held in the local dedup tier
    pub static ref DEDUP_LOCAL_ENTRIES: IntGauge = IntGauge::new(
        "cl_dedup_local_entries",
        "Message ids held in the local duplicate cache"
    ).expect("metric creation failed");
}

/// Handle proving the metrics are registered
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _registered: (),
}

/// Register all metrics with the global registry.
///
/// Calling it more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Broker
        Box::new(BROKER_EVENTS.clone()),
        Box::new(BROKER_BACKOFF_MS.clone()),
        Box::new(BROKER_SUBSCRIPTIONS.clone()),
        // Ordering
        Box::new(ORDERING_MESSAGES.clone()),
        Box::new(ORDERING_QUEUE_DEPTH.clone()),
        Box::new(ORDERING_GLOBAL_SEQUENCE.clone()),
        Box::new(ORDERING_PARTITIONS.clone()),
        // Locks and dedup
        Box::new(LOCK_OPERATIONS.clone()),
        Box::new(DEDUP_LOCAL_ENTRIES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _registered: () })
}

/// Set every labelled gauge in `vec` from `(label, value)` pairs.
pub fn set_labelled(vec: &IntGaugeVec, values: &[(&str, u64)]) {
    for (label, value) in values {
        vec.with_label_values(&[*label]).set(saturating_i64(*value));
    }
}

/// Clamp a counter into the gauge range.
pub fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Encode all metrics as Prometheus text format.
pub fn render_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
