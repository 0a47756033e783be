//! # Duplicate Detector
//!
//! Two-tier idempotency filter keyed by envelope id.
//!
//! ## Tiers
//!
//! 1. **Local**: process-local map of id → expiry, checked first.
//! 2. **Shared**: `processed_msg:{id}` in the coordination store, checked on
//!    a local miss. A shared hit is copied into the local tier.
//!
//! ## Limitation
//!
//! `is_duplicate` followed by `mark_processed` is check-then-act: two
//! processes can both see "not a duplicate" for the same id. Callers that
//! need a single winner use [`DuplicateDetector::try_claim`], which maps to
//! one set-if-absent on the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_store::CoordinationStore;
use shared_types::channels::{processed_key, PROCESSED_SENTINEL};
use shared_types::StoreError;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default retention of processed ids: one hour.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(3600);

/// Duplicate detector settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long a processed id is remembered, in both tiers.
    pub ttl: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_DEDUP_TTL,
        }
    }
}

impl DedupConfig {
    /// Short retention for tests.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            ttl: Duration::from_secs(2),
        }
    }
}

/// Two-tier duplicate filter.
pub struct DuplicateDetector {
    store: Arc<dyn CoordinationStore>,
    config: DedupConfig,
    /// id → local expiry.
    local: Mutex<HashMap<String, Instant>>,
}

impl DuplicateDetector {
    /// Create a detector over the shared store.
    pub fn new(store: Arc<dyn CoordinationStore>, config: DedupConfig) -> Self {
        Self {
            store,
            config,
            local: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `message_id` has already been processed.
    ///
    /// # Errors
    ///
    /// Propagates store failures on a local miss.
    pub async fn is_duplicate(&self, message_id: &str) -> Result<bool, StoreError> {
        if self.local_hit(message_id) {
            trace!(%message_id, "Duplicate (local tier)");
            return Ok(true);
        }

        let shared = self.store.get(&processed_key(message_id)).await?;
        if shared.is_none() {
            return Ok(false);
        }

        self.remember(message_id);
        debug!(%message_id, "Duplicate (shared tier), backfilled local cache");
        Ok(true)
    }

    /// Record `message_id` as processed in both tiers.
    ///
    /// # Errors
    ///
    /// Propagates the store write failure; the local tier is untouched then.
    pub async fn mark_processed(&self, message_id: &str) -> Result<(), StoreError> {
        self.store
            .set(
                &processed_key(message_id),
                PROCESSED_SENTINEL,
                Some(self.config.ttl),
            )
            .await?;
        self.remember(message_id);
        Ok(())
    }

    /// Atomically claim `message_id`. Exactly one caller across the fleet
    /// gets `true` until the claim expires.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn try_claim(&self, message_id: &str) -> Result<bool, StoreError> {
        if self.local_hit(message_id) {
            return Ok(false);
        }
        let claimed = self
            .store
            .set_if_absent(&processed_key(message_id), PROCESSED_SENTINEL, self.config.ttl)
            .await?;
        self.remember(message_id);
        Ok(claimed)
    }

    /// Drop expired local entries. Returns how many were removed.
    pub fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut local = self.local.lock();
        let before = local.len();
        local.retain(|_, expires_at| *expires_at > now);
        let removed = before - local.len();
        if removed > 0 {
            debug!(removed, remaining = local.len(), "Cleared expired dedup entries");
        }
        removed
    }

    /// Entries held in the local tier (expired ones included until swept).
    #[must_use]
    pub fn local_len(&self) -> usize {
        self.local.lock().len()
    }

    /// Configured retention.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.config.ttl
    }

    fn local_hit(&self, message_id: &str) -> bool {
        let now = Instant::now();
        self.local
            .lock()
            .get(message_id)
            .is_some_and(|expires_at| *expires_at > now)
    }

    fn remember(&self, message_id: &str) {
        let expires_at = Instant::now() + self.config.ttl;
        self.local.lock().insert(message_id.to_string(), expires_at);
    }
}
