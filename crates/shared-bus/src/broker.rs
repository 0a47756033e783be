//! # Pub/Sub Broker
//!
//! Channel fan-out over a [`PubSubTransport`] with a single background
//! listen task.
//!
//! ## Listen Loop
//!
//! ```text
//! ┌─────────┐  Ok(msg)   ┌──────────┐   decode    ┌──────────┐
//! │ receive │ ─────────→ │ registry │ ──────────→ │ handler  │
//! └─────────┘            └──────────┘             └──────────┘
//!      │ Err
//!      ▼
//! sleep(backoff) → reconnect → re-issue every subscription
//! ```
//!
//! Transport and codec failures are logged and counted here; they never
//! propagate out of `publish` / `subscribe` and never stop the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use shared_types::{ChannelPattern, Envelope, TransportError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::ExponentialBackoff;
use crate::handler::MessageHandler;
use crate::registry::{ChannelKind, HandlerRegistry};
use crate::transport::{PubSubTransport, TransportMessage};

/// Broker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// First reconnect delay.
    pub initial_backoff: Duration,
    /// Growth factor per consecutive failure.
    pub backoff_multiplier: f64,
    /// Upper bound on the reconnect delay.
    pub max_backoff: Duration,
    /// Bound on a single publish.
    pub publish_timeout: Duration,
    /// Bound on a single receive wait.
    pub receive_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_secs(60),
            publish_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_secs(1),
        }
    }
}

impl BrokerConfig {
    /// Fast timings for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            initial_backoff: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_backoff: Duration::from_millis(200),
            publish_timeout: Duration::from_millis(500),
            receive_timeout: Duration::from_millis(20),
        }
    }
}

/// Broker counters snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerStats {
    /// Envelopes handed to the transport successfully.
    pub published: u64,
    /// Publishes that failed or timed out.
    pub publish_failures: u64,
    /// Deliveries taken off the transport.
    pub received: u64,
    /// Deliveries a handler accepted.
    pub dispatched: u64,
    /// Deliveries a handler rejected.
    pub handler_errors: u64,
    /// Payloads that failed to encode or decode.
    pub codec_errors: u64,
    /// Transport failures (receive, subscribe, reconnect).
    pub transport_errors: u64,
    /// Successful reconnects.
    pub reconnects: u64,
    /// Reconnect delay the loop would apply next, in milliseconds.
    pub current_backoff_ms: u64,
}

#[derive(Default)]
struct BrokerCounters {
    published: AtomicU64,
    publish_failures: AtomicU64,
    received: AtomicU64,
    dispatched: AtomicU64,
    handler_errors: AtomicU64,
    codec_errors: AtomicU64,
    transport_errors: AtomicU64,
    reconnects: AtomicU64,
    current_backoff_ms: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

struct BrokerInner {
    node_id: String,
    config: BrokerConfig,
    transport: Arc<dyn PubSubTransport>,
    registry: RwLock<HandlerRegistry>,
    counters: BrokerCounters,
}

struct Listener {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Channel-based fan-out with a background listen task.
pub struct PubSubBroker {
    inner: Arc<BrokerInner>,
    listener: Mutex<Option<Listener>>,
}

impl PubSubBroker {
    /// Create a broker stamping envelopes with `node_id`.
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn PubSubTransport>,
        config: BrokerConfig,
    ) -> Self {
        let inner = BrokerInner {
            node_id: node_id.into(),
            counters: BrokerCounters::default(),
            registry: RwLock::new(HandlerRegistry::new()),
            transport,
            config,
        };
        inner
            .counters
            .current_backoff_ms
            .store(duration_ms(inner.config.initial_backoff), Ordering::Relaxed);
        Self {
            inner: Arc::new(inner),
            listener: Mutex::new(None),
        }
    }

    /// Identity stamped into `source` of every published envelope.
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Register `handler` for `channel`, replacing any previous handler.
    ///
    /// Returns `false` if the pattern is invalid or the transport rejects
    /// the subscription.
    pub async fn subscribe(
        &self,
        channel: &str,
        handler: Arc<dyn MessageHandler>,
        kind: ChannelKind,
    ) -> bool {
        let pattern = match kind {
            ChannelKind::Exact => None,
            ChannelKind::Pattern => match ChannelPattern::new(channel) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    warn!(%channel, error = %e, "Rejected subscription with invalid pattern");
                    return false;
                }
            },
        };

        if let Err(e) = self.inner.transport_subscribe(channel, kind).await {
            bump(&self.inner.counters.transport_errors);
            warn!(%channel, ?kind, error = %e, "Subscribe failed");
            return false;
        }

        let previous = {
            let mut registry = self.inner.registry.write();
            match pattern {
                Some(pattern) => registry.insert_pattern(pattern, handler),
                None => registry.insert_exact(channel, handler),
            }
        };

        // Same key under the other kind: drop the stale wire subscription.
        if let Some(previous) = previous.filter(|p| *p != kind) {
            if let Err(e) = self.inner.transport_unsubscribe(channel, previous).await {
                bump(&self.inner.counters.transport_errors);
                warn!(%channel, ?previous, error = %e, "Stale subscription not removed");
            }
        }

        info!(%channel, ?kind, replaced = previous.is_some(), "Subscribed");
        true
    }

    /// Remove the registration for `channel`.
    ///
    /// Returns `false` if nothing was registered. A transport failure is
    /// logged; the registration is gone either way.
    pub async fn unsubscribe(&self, channel: &str) -> bool {
        let removed = self.inner.registry.write().remove(channel);
        let Some(kind) = removed else {
            debug!(%channel, "Unsubscribe for unknown channel");
            return false;
        };

        if let Err(e) = self.inner.transport_unsubscribe(channel, kind).await {
            bump(&self.inner.counters.transport_errors);
            warn!(%channel, ?kind, error = %e, "Transport unsubscribe failed");
        }
        info!(%channel, ?kind, "Unsubscribed");
        true
    }

    /// Publish `envelope` on `channel`, stamped with this node's identity.
    ///
    /// Bounded by `publish_timeout`. Returns `false` on any failure.
    pub async fn publish(&self, channel: &str, mut envelope: Envelope) -> bool {
        envelope.channel = channel.to_string();
        envelope.source = self.inner.node_id.clone();

        let payload = match envelope.encode() {
            Ok(payload) => payload,
            Err(e) => {
                bump(&self.inner.counters.codec_errors);
                bump(&self.inner.counters.publish_failures);
                error!(%channel, id = %envelope.id, error = %e, "Envelope encode failed");
                return false;
            }
        };

        let timeout = self.inner.config.publish_timeout;
        let send = self.inner.transport.publish(channel, &payload);
        let result = match tokio::time::timeout(timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation: "publish".to_string(),
                timeout_ms: duration_ms(timeout),
            }),
        };

        match result {
            Ok(receivers) => {
                bump(&self.inner.counters.published);
                debug!(
                    %channel,
                    id = %envelope.id,
                    message_type = %envelope.message_type,
                    receivers,
                    "Envelope published"
                );
                true
            }
            Err(e) => {
                bump(&self.inner.counters.publish_failures);
                bump(&self.inner.counters.transport_errors);
                warn!(%channel, id = %envelope.id, error = %e, "Publish failed");
                false
            }
        }
    }

    /// Build an envelope from parts and publish it.
    pub async fn publish_event(
        &self,
        channel: &str,
        message_type: &str,
        data: serde_json::Value,
    ) -> bool {
        self.publish(channel, Envelope::new(channel, message_type, data))
            .await
    }

    /// Start the background listen task.
    ///
    /// Returns `false` if a listener is already running or no tokio runtime
    /// is available.
    pub fn start_listening(&self) -> bool {
        let mut listener = self.listener.lock();
        if listener.as_ref().is_some_and(|l| !l.task.is_finished()) {
            debug!("Listener already running");
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("start_listening called outside a tokio runtime");
            return false;
        };

        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = runtime.spawn(listen_loop(self.inner.clone(), shutdown_rx));
        *listener = Some(Listener { shutdown, task });
        info!(node_id = %self.inner.node_id, "Broker listening");
        true
    }

    /// Cooperatively stop the listen task and wait for it to exit.
    pub async fn stop_listening(&self) {
        let listener = self.listener.lock().take();
        let Some(listener) = listener else {
            return;
        };
        let _ = listener.shutdown.send(true);
        if let Err(e) = listener.task.await {
            warn!(error = %e, "Listener task ended abnormally");
        }
        info!(node_id = %self.inner.node_id, "Broker stopped listening");
    }

    /// Whether the listen task is running.
    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .as_ref()
            .is_some_and(|l| !l.task.is_finished())
    }

    /// Current registrations, sorted by channel.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<(String, ChannelKind)> {
        self.inner.registry.read().entries()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        let c = &self.inner.counters;
        BrokerStats {
            published: c.published.load(Ordering::Relaxed),
            publish_failures: c.publish_failures.load(Ordering::Relaxed),
            received: c.received.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            handler_errors: c.handler_errors.load(Ordering::Relaxed),
            codec_errors: c.codec_errors.load(Ordering::Relaxed),
            transport_errors: c.transport_errors.load(Ordering::Relaxed),
            reconnects: c.reconnects.load(Ordering::Relaxed),
            current_backoff_ms: c.current_backoff_ms.load(Ordering::Relaxed),
        }
    }
}

impl BrokerInner {
    async fn transport_subscribe(
        &self,
        channel: &str,
        kind: ChannelKind,
    ) -> Result<(), TransportError> {
        match kind {
            ChannelKind::Exact => self.transport.subscribe(channel).await,
            ChannelKind::Pattern => self.transport.psubscribe(channel).await,
        }
    }

    async fn transport_unsubscribe(
        &self,
        channel: &str,
        kind: ChannelKind,
    ) -> Result<(), TransportError> {
        match kind {
            ChannelKind::Exact => self.transport.unsubscribe(channel).await,
            ChannelKind::Pattern => self.transport.punsubscribe(channel).await,
        }
    }

    async fn dispatch(&self, message: TransportMessage) {
        bump(&self.counters.received);

        let envelope = match Envelope::decode(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                bump(&self.counters.codec_errors);
                warn!(channel = %message.channel, error = %e, "Dropped malformed payload");
                return;
            }
        };

        let handler = self.registry.read().resolve(&message);
        let Some(handler) = handler else {
            debug!(channel = %message.channel, "No handler for delivery");
            return;
        };

        let id = envelope.id.clone();
        match handler.handle(envelope).await {
            Ok(()) => bump(&self.counters.dispatched),
            Err(e) => {
                bump(&self.counters.handler_errors);
                warn!(channel = %message.channel, %id, error = %e, "Handler failed");
            }
        }
    }

    /// Reconnect and re-issue every registered subscription.
    async fn reconnect(&self) -> bool {
        if let Err(e) = self.transport.reconnect().await {
            bump(&self.counters.transport_errors);
            warn!(error = %e, "Reconnect failed");
            return false;
        }
        bump(&self.counters.reconnects);

        let entries = self.registry.read().entries();
        let total = entries.len();
        let mut restored = 0usize;
        for (channel, kind) in entries {
            match self.transport_subscribe(&channel, kind).await {
                Ok(()) => restored += 1,
                Err(e) => {
                    bump(&self.counters.transport_errors);
                    warn!(%channel, ?kind, error = %e, "Resubscribe failed");
                }
            }
        }
        info!(restored, total, "Reconnected and resubscribed");
        true
    }

    fn record_backoff(&self, backoff: &ExponentialBackoff) {
        self.counters
            .current_backoff_ms
            .store(duration_ms(backoff.current()), Ordering::Relaxed);
    }
}

async fn listen_loop(inner: Arc<BrokerInner>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = ExponentialBackoff::new(
        inner.config.initial_backoff,
        inner.config.backoff_multiplier,
        inner.config.max_backoff,
    );
    debug!("Listen loop started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let received = tokio::select! {
            _ = shutdown.changed() => break,
            received = inner.transport.receive(inner.config.receive_timeout) => received,
        };

        match received {
            Ok(Some(message)) => {
                backoff.reset();
                inner.record_backoff(&backoff);
                inner.dispatch(message).await;
            }
            Ok(None) => {
                backoff.reset();
                inner.record_backoff(&backoff);
            }
            Err(e) => {
                bump(&inner.counters.transport_errors);
                let delay = backoff.current();
                warn!(
                    error = %e,
                    backoff_ms = duration_ms(delay),
                    failures = backoff.failures() + 1,
                    "Transport receive failed, backing off"
                );

                tokio::select! {
                    _ = shutdown.changed() => break,
                    () = tokio::time::sleep(delay) => {}
                }
                backoff.record_failure();
                inner.record_backoff(&backoff);
                inner.reconnect().await;
            }
        }
    }

    debug!("Listen loop exited");
}
