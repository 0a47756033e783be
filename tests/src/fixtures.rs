//! Shared test fixtures.

use std::sync::Arc;
use std::time::Duration;

use coordination_runtime::{CoordinationContext, RuntimeConfig};
use parking_lot::Mutex;
use shared_bus::{FnHandler, InMemoryPubSub, MessageHandler};
use shared_store::InMemoryStore;
use shared_types::Envelope;

/// One store and one hub shared by every node built from it.
#[derive(Clone)]
pub struct TestCluster {
    pub store: Arc<InMemoryStore>,
    pub hub: InMemoryPubSub,
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            hub: InMemoryPubSub::new(),
        }
    }

    /// A node with test timings.
    pub fn node(&self, node_id: &str) -> CoordinationContext {
        self.node_with(RuntimeConfig::for_testing(node_id))
    }

    /// A node with explicit configuration.
    pub fn node_with(&self, config: RuntimeConfig) -> CoordinationContext {
        CoordinationContext::in_memory(config, self.store.clone(), &self.hub)
    }
}

/// Shared list of delivered envelopes.
pub type Seen = Arc<Mutex<Vec<Envelope>>>;

/// A handler that records every delivery.
pub fn collector() -> (Seen, Arc<dyn MessageHandler>) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler = FnHandler::new(move |envelope| {
        sink.lock().push(envelope);
        Ok(())
    });
    (seen, handler)
}

/// Poll `condition` for up to one second.
pub async fn wait_for(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
