//! # Admin Endpoint
//!
//! Plain HTTP listener on the metrics port.
//!
//! | Route      | Response                                  |
//! |------------|-------------------------------------------|
//! | `/health`  | JSON: node id and broker listen state     |
//! | `/metrics` | Prometheus text, synced on every scrape   |

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use cl_telemetry::{log_event, render_metrics};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::container::CoordinationContext;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Routes served on the metrics port.
pub fn admin_router(context: Arc<CoordinationContext>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .with_state(context)
}

async fn health_check(State(context): State<Arc<CoordinationContext>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "node_id": context.node_id(),
        "broker_listening": context.broker.is_listening(),
    }))
}

async fn metrics(State(context): State<Arc<CoordinationContext>>) -> Response {
    context.sync_metrics();
    match render_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            log_event!(warn, "runtime", "Metrics render failed", error = %e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Serve `router` on `listener` until `shutdown` flips.
pub async fn serve_admin(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.changed().await.ok();
        })
        .await
}
