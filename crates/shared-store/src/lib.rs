//! # Shared Store - Coordination Store Port
//!
//! The only cross-process mutable state of the coordination layer lives
//! behind [`CoordinationStore`]: the global sequence counter, the
//! processed-message keys, the lock keys, and the dead-letter list.
//!
//! ## Atomicity Rules
//!
//! - Every mutation of shared state goes through a single store primitive.
//! - Compare-then-mutate (lock release / extend) uses the dedicated
//!   `*_if_equals` primitives, which adapters must execute atomically
//!   (a Lua script on Redis, one critical section in memory).
//! - No component performs a cross-process read-modify-write on its own.
//!
//! ## Adapters
//!
//! | Adapter | Feature | Use |
//! |---------|---------|-----|
//! | [`InMemoryStore`] | always | single node, tests |
//! | `RedisStore` | `redis` | fleets sharing a Redis/KeyDB instance |

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;
use shared_types::StoreError;

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisStore};

/// Key-value primitives the coordination layer depends on.
///
/// Adapters are shared by every component of a process (`Arc<dyn
/// CoordinationStore>`) and by every process of the fleet.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Atomically increment an integer counter, creating it at 0.
    ///
    /// Returns the value after the increment.
    async fn incr(&self, key: &str) -> Result<u64, StoreError>;

    /// Write `value` only if `key` does not exist, with an expiry.
    ///
    /// Returns `true` if this call created the key.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Read a string value.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditionally write a string value, optionally with an expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a key. Returns `true` if it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Replace the expiry of an existing key. Returns `false` if absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Append to a list, returning the new length.
    async fn list_append(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Read a whole list (oldest first).
    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Atomically delete `key` if it currently holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Atomically replace the expiry of `key` if it currently holds `expected`.
    async fn expire_if_equals(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;
}
