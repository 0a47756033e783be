//! Structured logging helpers.
//!
//! Every coordination log line carries a `component` field (`broker`,
//! `locks`, `ordering`, `runtime`) so logs from one process can be split by
//! component without parsing targets.

/// Log with a `component` field attached.
///
/// ```rust,ignore
/// log_event!(warn, "broker", "Transport lost", backoff_ms = 400);
/// ```
#[macro_export]
macro_rules! log_event {
    (info, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (warn, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (error, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };

    (debug, $component:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(
            component = $component,
            $($($field)*,)?
            $msg
        )
    };
}
