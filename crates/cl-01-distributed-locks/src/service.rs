//! Distributed Lock Service
//!
//! Main service implementing [`LockApi`] over the shared store.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use shared_store::CoordinationStore;
use shared_types::channels::lock_key;
use shared_types::expiry_after;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LockConfig;
use crate::domain::{new_token, DistributedLock, LockError, LockStats};
use crate::ports::inbound::LockApi;

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[derive(Default)]
struct Counters {
    acquired: AtomicU64,
    waited: AtomicU64,
    contended: AtomicU64,
    released: AtomicU64,
    extended: AtomicU64,
    ownership_mismatches: AtomicU64,
}

/// Distributed Lock Manager
///
/// Acquisition:
/// 1. Generate a fresh token
/// 2. `set_if_absent(lock:{resource_id}, token, ttl)`
/// 3. On contention sleep `poll_interval` and retry until the timeout
///
/// Release and extend are single atomic compare-and-mutate store calls
/// keyed on the token.
pub struct DistributedLockManager {
    store: Arc<dyn CoordinationStore>,
    config: LockConfig,
    counters: Counters,
}

impl DistributedLockManager {
    /// Create a manager over the shared store
    pub fn new(store: Arc<dyn CoordinationStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            counters: Counters::default(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Acquire with the configured default TTL and timeout
    pub async fn acquire(&self, resource_id: &str, owner: &str) -> Result<DistributedLock, LockError> {
        self.acquire_lock(
            resource_id,
            owner,
            self.config.default_ttl,
            self.config.default_timeout,
        )
        .await
    }

    /// Run `work` while holding `resource_id`, releasing afterwards.
    ///
    /// A failed release (the lock expired while `work` ran) is logged, not
    /// returned: `work` has already completed.
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource_id: &str,
        owner: &str,
        ttl: Duration,
        timeout: Duration,
        work: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = T> + Send,
        T: Send,
    {
        let lock = self.acquire_lock(resource_id, owner, ttl, timeout).await?;
        let output = work().await;
        if let Err(e) = self.release_lock(&lock).await {
            warn!(%resource_id, %owner, error = %e, "Lock lost before scoped work finished");
        }
        Ok(output)
    }

    /// Counter snapshot
    pub fn stats(&self) -> LockStats {
        let c = &self.counters;
        LockStats {
            acquired: c.acquired.load(Ordering::Relaxed),
            waited: c.waited.load(Ordering::Relaxed),
            contended: c.contended.load(Ordering::Relaxed),
            released: c.released.load(Ordering::Relaxed),
            extended: c.extended.load(Ordering::Relaxed),
            ownership_mismatches: c.ownership_mismatches.load(Ordering::Relaxed),
        }
    }

    fn mismatch(&self, lock: &DistributedLock) -> LockError {
        self.counters
            .ownership_mismatches
            .fetch_add(1, Ordering::Relaxed);
        LockError::OwnershipMismatch {
            resource_id: lock.resource_id.clone(),
            token: lock.token.clone(),
        }
    }
}

#[async_trait]
impl LockApi for DistributedLockManager {
    async fn acquire_lock(
        &self,
        resource_id: &str,
        owner: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<DistributedLock, LockError> {
        if resource_id.is_empty() {
            return Err(LockError::InvalidResource(resource_id.to_string()));
        }
        // A zero TTL would expire on write.
        let ttl = if ttl.is_zero() { self.config.default_ttl } else { ttl };

        let key = lock_key(resource_id);
        let token = new_token();
        let started = Instant::now();
        let deadline = started + timeout;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            if self.store.set_if_absent(&key, &token, ttl).await? {
                self.counters.acquired.fetch_add(1, Ordering::Relaxed);
                info!(%resource_id, %owner, attempts, ttl_ms = duration_ms(ttl), "Lock acquired");
                return Ok(DistributedLock::new(resource_id, token, owner, ttl));
            }
            self.counters.waited.fetch_add(1, Ordering::Relaxed);

            let now = Instant::now();
            if now >= deadline {
                self.counters.contended.fetch_add(1, Ordering::Relaxed);
                debug!(%resource_id, %owner, attempts, "Lock acquire timed out");
                return Err(LockError::Timeout {
                    resource_id: resource_id.to_string(),
                    waited: now - started,
                });
            }
            tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
        }
    }

    async fn release_lock(&self, lock: &DistributedLock) -> Result<(), LockError> {
        if !self.store.delete_if_equals(&lock.key(), &lock.token).await? {
            warn!(resource_id = %lock.resource_id, owner = %lock.owner, "Release refused: token mismatch");
            return Err(self.mismatch(lock));
        }
        self.counters.released.fetch_add(1, Ordering::Relaxed);
        info!(resource_id = %lock.resource_id, owner = %lock.owner, "Lock released");
        Ok(())
    }

    async fn extend_lock(
        &self,
        lock: &mut DistributedLock,
        additional: Duration,
    ) -> Result<(), LockError> {
        let now = Utc::now();
        let new_expiry = expiry_after(now.max(lock.expires_at), additional);
        let store_ttl = (new_expiry - now).to_std().unwrap_or(additional);

        if !self
            .store
            .expire_if_equals(&lock.key(), &lock.token, store_ttl)
            .await?
        {
            warn!(resource_id = %lock.resource_id, owner = %lock.owner, "Extend refused: token mismatch");
            return Err(self.mismatch(lock));
        }

        lock.ttl = (new_expiry - lock.acquired_at)
            .to_std()
            .unwrap_or(lock.ttl.saturating_add(additional));
        lock.expires_at = new_expiry;
        self.counters.extended.fetch_add(1, Ordering::Relaxed);
        debug!(
            resource_id = %lock.resource_id,
            additional_ms = duration_ms(additional),
            "Lock extended"
        );
        Ok(())
    }

    async fn is_locked(&self, resource_id: &str) -> Result<bool, LockError> {
        Ok(self.store.get(&lock_key(resource_id)).await?.is_some())
    }
}
