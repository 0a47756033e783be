//! # Coordination Context
//!
//! One explicit handle per process holding every coordination component.
//! Components share a single store; the broker owns the transport.
//!
//! ```text
//! CoordinationStore ──┬── DuplicateDetector ──┐
//!                     ├── DistributedLockManager
//!                     └───────────────────────┴── MessageOrderingManager
//! PubSubTransport ────── PubSubBroker
//! ```

use std::sync::Arc;

use cl_01_distributed_locks::DistributedLockManager;
use cl_02_message_ordering::{MessageOrderingApi, MessageOrderingManager};
use cl_telemetry::metrics::{
    saturating_i64, set_labelled, BROKER_BACKOFF_MS, BROKER_EVENTS, BROKER_SUBSCRIPTIONS,
    DEDUP_LOCAL_ENTRIES, LOCK_OPERATIONS, ORDERING_GLOBAL_SEQUENCE, ORDERING_MESSAGES,
    ORDERING_PARTITIONS, ORDERING_QUEUE_DEPTH,
};
use shared_bus::{DuplicateDetector, InMemoryPubSub, PubSubBroker, PubSubTransport};
use shared_store::{CoordinationStore, InMemoryStore};
use shared_types::{StoreError, TransportError};
use thiserror::Error;
use tracing::info;

use crate::container::config::{Backend, ConfigError, RuntimeConfig};

/// Failures while building a context.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("transport unavailable: {0}")]
    Transport(#[from] TransportError),

    #[error("backend {0} requires the `redis` feature")]
    BackendDisabled(&'static str),
}

/// Every coordination component of one process.
pub struct CoordinationContext {
    pub config: RuntimeConfig,
    pub store: Arc<dyn CoordinationStore>,
    pub broker: Arc<PubSubBroker>,
    pub dedup: Arc<DuplicateDetector>,
    pub locks: Arc<DistributedLockManager>,
    pub ordering: Arc<MessageOrderingManager>,
}

impl CoordinationContext {
    /// Wire components over an existing store and transport.
    pub fn from_parts(
        config: RuntimeConfig,
        store: Arc<dyn CoordinationStore>,
        transport: Arc<dyn PubSubTransport>,
    ) -> Self {
        let broker = Arc::new(PubSubBroker::new(
            config.node_id.clone(),
            transport,
            config.broker.clone(),
        ));
        let dedup = Arc::new(DuplicateDetector::new(store.clone(), config.dedup.clone()));
        let locks = Arc::new(DistributedLockManager::new(
            store.clone(),
            config.locks.clone(),
        ));
        let ordering = Arc::new(MessageOrderingManager::new(
            store.clone(),
            dedup.clone(),
            config.ordering.clone(),
        ));

        Self {
            config,
            store,
            broker,
            dedup,
            locks,
            ordering,
        }
    }

    /// Wire components over a shared in-memory store and hub.
    ///
    /// Contexts built from the same store and hub behave like separate
    /// processes talking to one Redis instance.
    pub fn in_memory(config: RuntimeConfig, store: Arc<InMemoryStore>, hub: &InMemoryPubSub) -> Self {
        Self::from_parts(config, store, Arc::new(hub.connect()))
    }

    /// Build the backend named by `config` and wire components over it.
    pub async fn build(config: RuntimeConfig) -> Result<Self, StartupError> {
        config.validate()?;
        match config.backend.clone() {
            Backend::InMemory => {
                info!(node_id = %config.node_id, "Using in-memory store and hub");
                let hub = InMemoryPubSub::new();
                Ok(Self::in_memory(config, Arc::new(InMemoryStore::new()), &hub))
            }
            Backend::Redis {
                endpoint,
                auth_token_env,
                pool_size,
            } => {
                Self::connect_redis(config, endpoint, auth_token_env, pool_size).await
            }
        }
    }

    #[cfg(feature = "redis")]
    async fn connect_redis(
        config: RuntimeConfig,
        endpoint: String,
        auth_token_env: Option<String>,
        pool_size: usize,
    ) -> Result<Self, StartupError> {
        use shared_bus::RedisTransport;
        use shared_store::{RedisConfig, RedisStore};

        let redis = RedisConfig {
            endpoint,
            auth_token_env,
            pool_size,
        };
        let store = RedisStore::connect(&redis).await?;
        let transport = RedisTransport::connect(store.pool().clone()).await?;
        info!(node_id = %config.node_id, endpoint = %redis.endpoint, "Connected to Redis");
        Ok(Self::from_parts(config, Arc::new(store), Arc::new(transport)))
    }

    #[cfg(not(feature = "redis"))]
    async fn connect_redis(
        _config: RuntimeConfig,
        _endpoint: String,
        _auth_token_env: Option<String>,
        _pool_size: usize,
    ) -> Result<Self, StartupError> {
        Err(StartupError::BackendDisabled("redis"))
    }

    /// Process identity.
    pub fn node_id(&self) -> &str {
        &self.config.node_id
    }

    /// Copy component snapshots into the Prometheus gauges.
    pub fn sync_metrics(&self) {
        let broker = self.broker.stats();
        set_labelled(
            &BROKER_EVENTS,
            &[
                ("published", broker.published),
                ("publish_failures", broker.publish_failures),
                ("received", broker.received),
                ("dispatched", broker.dispatched),
                ("handler_errors", broker.handler_errors),
                ("codec_errors", broker.codec_errors),
                ("transport_errors", broker.transport_errors),
                ("reconnects", broker.reconnects),
            ],
        );
        BROKER_BACKOFF_MS.set(saturating_i64(broker.current_backoff_ms));
        BROKER_SUBSCRIPTIONS.set(saturating_i64(self.broker.subscriptions().len() as u64));

        let ordering = self.ordering.get_stats();
        set_labelled(
            &ORDERING_MESSAGES,
            &[
                ("total", ordering.total),
                ("processed", ordering.processed),
                ("duplicates", ordering.duplicates),
                ("failed", ordering.failed),
                ("retried", ordering.retried),
                ("dead_lettered", ordering.dead_lettered),
            ],
        );
        ORDERING_QUEUE_DEPTH.set(saturating_i64(ordering.queue_depth as u64));
        ORDERING_GLOBAL_SEQUENCE.set(saturating_i64(ordering.current_global_sequence));
        ORDERING_PARTITIONS.set(saturating_i64(ordering.partition_count as u64));

        let locks = self.locks.stats();
        set_labelled(
            &LOCK_OPERATIONS,
            &[
                ("acquired", locks.acquired),
                ("waited", locks.waited),
                ("contended", locks.contended),
                ("released", locks.released),
                ("extended", locks.extended),
                ("ownership_mismatches", locks.ownership_mismatches),
            ],
        );

        DEDUP_LOCAL_ENTRIES.set(saturating_i64(self.dedup.local_len() as u64));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cl_01_distributed_locks::LockApi;
    use std::time::Duration;

    #[tokio::test]
    async fn test_contexts_share_store() {
        let store = Arc::new(InMemoryStore::new());
        let hub = InMemoryPubSub::new();
        let a = CoordinationContext::in_memory(RuntimeConfig::for_testing("a"), store.clone(), &hub);
        let b = CoordinationContext::in_memory(RuntimeConfig::for_testing("b"), store, &hub);

        let lock = a
            .locks
            .acquire_lock("report", "a", Duration::from_secs(5), Duration::ZERO)
            .await
            .unwrap();
        assert!(b.locks.is_locked("report").await.unwrap());
        a.locks.release_lock(&lock).await.unwrap();
        assert!(!b.locks.is_locked("report").await.unwrap());
        assert_eq!(b.broker.node_id(), "b");
    }

    #[tokio::test]
    async fn test_build_in_memory() {
        let context = CoordinationContext::build(RuntimeConfig::for_testing("solo"))
            .await
            .unwrap();
        assert_eq!(context.node_id(), "solo");
        context.sync_metrics();
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_redis_backend_needs_feature() {
        let mut config = RuntimeConfig::for_testing("solo");
        config.backend = Backend::Redis {
            endpoint: "127.0.0.1:6379".to_string(),
            auth_token_env: None,
            pool_size: 2,
        };
        assert!(matches!(
            CoordinationContext::build(config).await,
            Err(StartupError::BackendDisabled("redis"))
        ));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = RuntimeConfig::for_testing("solo");
        config.ordering.max_queue_size = 0;
        assert!(matches!(
            CoordinationContext::build(config).await,
            Err(StartupError::Config(ConfigError::Inconsistent(_)))
        ));
    }
}
