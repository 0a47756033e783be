//! Lock domain: errors, tokens and the counters snapshot

pub mod errors;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use errors::LockError;
pub use shared_types::DistributedLock;

/// Fresh ownership token.
pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

/// Lock manager counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStats {
    /// Successful acquisitions
    pub acquired: u64,
    /// Acquire attempts that found the lock held
    pub waited: u64,
    /// Acquisitions that timed out
    pub contended: u64,
    /// Successful releases
    pub released: u64,
    /// Successful extensions
    pub extended: u64,
    /// Release or extend attempts with a stale token
    pub ownership_mismatches: u64,
}
