//! Configuration for the distributed lock manager

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lock manager configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockConfig {
    /// TTL applied when the caller does not pick one
    pub default_ttl: Duration,
    /// How long `acquire_lock` keeps polling when the caller does not pick a timeout
    pub default_timeout: Duration,
    /// Fixed delay between set-if-absent attempts
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(30),
            default_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl LockConfig {
    /// Short timings for tests
    pub fn for_testing() -> Self {
        Self {
            default_ttl: Duration::from_secs(2),
            default_timeout: Duration::from_millis(500),
            poll_interval: Duration::from_millis(10),
        }
    }
}
