//! # Pub/Sub Transport
//!
//! The wire underneath the broker. A transport owns one subscriber
//! connection: channel and pattern subscriptions, a receive call with a
//! bounded wait, and an explicit reconnect.
//!
//! [`InMemoryPubSub`] is a hub shared by several [`InMemoryTransport`]
//! handles, one per simulated process. It follows Redis semantics: a
//! message published on a channel is delivered once per matching exact
//! subscription and once per matching pattern subscription, and a
//! reconnect starts a fresh connection with no subscriptions.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared_types::{ChannelPattern, TransportError};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::registry::ChannelKind;
use crate::DEFAULT_CHANNEL_CAPACITY;

/// A message taken off the wire, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Which kind of subscription delivered it.
    pub kind: ChannelKind,
    /// The matching pattern, when the transport reports it.
    pub pattern: Option<String>,
    /// Raw payload.
    pub payload: String,
}

/// Subscriber connection to a pub/sub system.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish a raw payload. Returns the number of receivers reported.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, TransportError>;

    /// Subscribe to a literal channel.
    async fn subscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Subscribe to a glob pattern.
    async fn psubscribe(&self, pattern: &str) -> Result<(), TransportError>;

    /// Drop a literal channel subscription.
    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;

    /// Drop a pattern subscription.
    async fn punsubscribe(&self, pattern: &str) -> Result<(), TransportError>;

    /// Wait up to `timeout` for the next message.
    ///
    /// `Ok(None)` means the wait elapsed with the connection healthy.
    async fn receive(&self, timeout: Duration) -> Result<Option<TransportMessage>, TransportError>;

    /// Re-establish the connection. Subscriptions are not carried over.
    async fn reconnect(&self) -> Result<(), TransportError>;
}

// =============================================================================
// IN-MEMORY HUB
// =============================================================================

#[derive(Debug, Clone)]
struct HubMessage {
    channel: String,
    payload: String,
}

struct HubInner {
    sender: broadcast::Sender<HubMessage>,
    available: AtomicBool,
    published: AtomicU64,
}

/// Process-spanning in-memory pub/sub hub.
///
/// Uses `tokio::sync::broadcast` for fan-out. Clones share the same hub.
#[derive(Clone)]
pub struct InMemoryPubSub {
    inner: Arc<HubInner>,
    capacity: usize,
}

impl InMemoryPubSub {
    /// Create a hub with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a hub buffering up to `capacity` messages per connection.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(HubInner {
                sender,
                available: AtomicBool::new(true),
                published: AtomicU64::new(0),
            }),
            capacity,
        }
    }

    /// Open a connection for one process.
    #[must_use]
    pub fn connect(&self) -> InMemoryTransport {
        InMemoryTransport {
            hub: self.clone(),
            receiver: tokio::sync::Mutex::new(self.inner.sender.subscribe()),
            subscriptions: Mutex::new(Subscriptions::default()),
            pending: Mutex::new(VecDeque::new()),
            connected: AtomicBool::new(true),
            injected_failures: AtomicU32::new(0),
        }
    }

    /// Simulate a hub outage: publish, receive and reconnect all fail.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Whether the hub is accepting traffic.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Total messages published through the hub.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Connections currently attached.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.sender.receiver_count()
    }

    /// Per-connection buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Subscriptions {
    channels: HashSet<String>,
    patterns: HashMap<String, ChannelPattern>,
}

impl Subscriptions {
    fn deliveries(&self, message: &HubMessage) -> Vec<TransportMessage> {
        let mut out = Vec::new();
        if self.channels.contains(&message.channel) {
            out.push(TransportMessage {
                channel: message.channel.clone(),
                kind: ChannelKind::Exact,
                pattern: None,
                payload: message.payload.clone(),
            });
        }
        for (raw, pattern) in &self.patterns {
            if pattern.matches(&message.channel) {
                out.push(TransportMessage {
                    channel: message.channel.clone(),
                    kind: ChannelKind::Pattern,
                    pattern: Some(raw.clone()),
                    payload: message.payload.clone(),
                });
            }
        }
        out
    }
}

/// One process's connection to an [`InMemoryPubSub`] hub.
pub struct InMemoryTransport {
    hub: InMemoryPubSub,
    receiver: tokio::sync::Mutex<broadcast::Receiver<HubMessage>>,
    subscriptions: Mutex<Subscriptions>,
    /// Deliveries fanned out from one hub message but not yet returned.
    pending: Mutex<VecDeque<TransportMessage>>,
    connected: AtomicBool,
    injected_failures: AtomicU32,
}

impl InMemoryTransport {
    /// Make the next `count` receive calls fail with `ConnectionLost`.
    pub fn inject_failures(&self, count: u32) {
        self.injected_failures.fetch_add(count, Ordering::SeqCst);
    }

    /// Whether the connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Active channel and pattern subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        let subs = self.subscriptions.lock();
        subs.channels.len() + subs.patterns.len()
    }

    fn ensure_connected(&self, operation: &str) -> Result<(), TransportError> {
        if !self.hub.is_available() {
            self.connected.store(false, Ordering::SeqCst);
        }
        if !self.is_connected() {
            return Err(TransportError::ConnectionLost(format!(
                "in-memory hub unreachable during {operation}"
            )));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PubSubTransport for InMemoryTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, TransportError> {
        if !self.hub.is_available() {
            return Err(TransportError::ConnectionLost(
                "in-memory hub unreachable during publish".to_string(),
            ));
        }
        self.hub.inner.published.fetch_add(1, Ordering::Relaxed);
        let message = HubMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        // No receivers is not an error for pub/sub.
        Ok(self.hub.inner.sender.send(message).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.ensure_connected("subscribe")?;
        self.subscriptions.lock().channels.insert(channel.to_string());
        Ok(())
    }

    async fn psubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.ensure_connected("psubscribe")?;
        let compiled =
            ChannelPattern::new(pattern).map_err(|e| TransportError::Command(e.to_string()))?;
        self.subscriptions
            .lock()
            .patterns
            .insert(pattern.to_string(), compiled);
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.ensure_connected("unsubscribe")?;
        self.subscriptions.lock().channels.remove(channel);
        Ok(())
    }

    async fn punsubscribe(&self, pattern: &str) -> Result<(), TransportError> {
        self.ensure_connected("punsubscribe")?;
        self.subscriptions.lock().patterns.remove(pattern);
        Ok(())
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<TransportMessage>, TransportError> {
        if self.take_injected_failure() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::ConnectionLost("injected failure".to_string()));
        }
        self.ensure_connected("receive")?;

        let queued = self.pending.lock().pop_front();
        if queued.is_some() {
            return Ok(queued);
        }

        let mut receiver = self.receiver.lock().await;
        let wait = async {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        let mut deliveries = self.subscriptions.lock().deliveries(&message);
                        if deliveries.is_empty() {
                            continue;
                        }
                        let first = deliveries.remove(0);
                        self.pending.lock().extend(deliveries);
                        return Ok(first);
                    }
                    Err(broadcast::error::RecvError::Lagged(count)) => {
                        warn!(lagged = count, "Transport lagged, messages dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err(TransportError::Closed);
                    }
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(message)) => Ok(Some(message)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    async fn reconnect(&self) -> Result<(), TransportError> {
        if !self.hub.is_available() {
            return Err(TransportError::ConnectionLost(
                "in-memory hub unreachable during reconnect".to_string(),
            ));
        }
        // Messages published while disconnected are lost, as on a real socket.
        *self.receiver.lock().await = self.hub.inner.sender.subscribe();
        *self.subscriptions.lock() = Subscriptions::default();
        self.pending.lock().clear();
        self.connected.store(true, Ordering::SeqCst);
        debug!("In-memory transport reconnected");
        Ok(())
    }
}
