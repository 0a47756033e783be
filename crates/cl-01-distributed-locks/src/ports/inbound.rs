//! Inbound Port (Driving Port / API)

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DistributedLock, LockError};

/// Primary distributed lock API
///
/// No fairness: concurrent waiters race on each poll.
#[async_trait]
pub trait LockApi: Send + Sync {
    /// Acquire `resource_id` for `owner`, polling until `timeout`.
    ///
    /// # Errors
    /// - `Timeout`: the resource stayed held for the whole timeout
    /// - `Store`: the shared store failed
    async fn acquire_lock(
        &self,
        resource_id: &str,
        owner: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Result<DistributedLock, LockError>;

    /// Release a held lock.
    ///
    /// # Errors
    /// - `OwnershipMismatch`: the key is gone or holds another token
    async fn release_lock(&self, lock: &DistributedLock) -> Result<(), LockError>;

    /// Push the expiry of a held lock out by `additional`.
    ///
    /// On success `lock.ttl` and `lock.expires_at` are updated.
    ///
    /// # Errors
    /// - `OwnershipMismatch`: the key is gone or holds another token
    async fn extend_lock(
        &self,
        lock: &mut DistributedLock,
        additional: Duration,
    ) -> Result<(), LockError>;

    /// Whether anyone currently holds `resource_id`.
    async fn is_locked(&self, resource_id: &str) -> Result<bool, LockError>;
}
