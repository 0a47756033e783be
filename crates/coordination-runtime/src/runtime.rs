//! # Coordination Runtime
//!
//! Owns a [`CoordinationContext`] and its background tasks.
//!
//! ## Startup Sequence
//!
//! 1. Start the broker listen loop
//! 2. Spawn the dedup sweep (drops expired local ids)
//! 3. Spawn the metrics sync (copies snapshots into the gauges)
//! 4. Optionally serve the admin endpoint ([`start_admin`](CoordinationRuntime::start_admin))
//!
//! ## Shutdown Sequence
//!
//! 1. Signal shutdown to the background tasks
//! 2. Stop the broker listen loop
//! 3. Wait for the tasks to exit

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cl_telemetry::log_event;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::admin::{admin_router, serve_admin};
use crate::container::CoordinationContext;

/// A running coordination node.
pub struct CoordinationRuntime {
    context: Arc<CoordinationContext>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CoordinationRuntime {
    /// Wrap a context; nothing runs until [`start`](Self::start).
    pub fn new(context: CoordinationContext) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            context: Arc::new(context),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Shared component handle.
    pub fn context(&self) -> Arc<CoordinationContext> {
        Arc::clone(&self.context)
    }

    /// Start listening and spawn the maintenance tasks.
    pub fn start(&self) {
        log_event!(info, "runtime", "Starting coordination runtime", node_id = %self.context.node_id());

        if !self.context.broker.start_listening() {
            warn!("Broker listen loop not started");
        }

        let sweep = self.spawn_periodic("dedup-sweep", self.context.config.sweep_interval, |ctx| {
            let removed = ctx.ordering.clear_expired();
            if removed > 0 {
                debug!(removed, "Expired local dedup entries dropped");
            }
        });
        let metrics =
            self.spawn_periodic("metrics-sync", self.context.config.metrics_interval, |ctx| {
                ctx.sync_metrics();
            });

        self.tasks.lock().extend([sweep, metrics]);
        log_event!(info, "runtime", "Coordination runtime running");
    }

    /// Serve `/health` and `/metrics` on `port` (0 picks a free port).
    ///
    /// Returns the bound address. The server stops with [`shutdown`](Self::shutdown).
    pub async fn start_admin(&self, port: u16) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        let addr = listener.local_addr()?;
        let router = admin_router(Arc::clone(&self.context));
        let shutdown = self.shutdown_rx.clone();

        let server = tokio::spawn(async move {
            if let Err(e) = serve_admin(listener, router, shutdown).await {
                log_event!(error, "runtime", "Admin endpoint failed", error = %e);
            }
        });
        self.tasks.lock().push(server);
        log_event!(info, "runtime", "Admin endpoint listening", %addr);
        Ok(addr)
    }

    fn spawn_periodic(
        &self,
        name: &'static str,
        period: Duration,
        tick: impl Fn(&CoordinationContext) + Send + 'static,
    ) -> JoinHandle<()> {
        let context = Arc::clone(&self.context);
        let mut shutdown = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => tick(&context),
                    _ = shutdown.changed() => {
                        debug!(task = name, "Shutdown signal received");
                        break;
                    }
                }
            }
        })
    }

    /// Number of running background tasks.
    pub fn task_count(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }

    /// Stop everything and wait for the tasks to exit.
    pub async fn shutdown(&self) {
        log_event!(info, "runtime", "Initiating graceful shutdown...");

        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal: {}", e);
        }
        self.context.broker.stop_listening().await;

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.context.sync_metrics();
        log_event!(info, "runtime", "Shutdown complete");
    }
}
