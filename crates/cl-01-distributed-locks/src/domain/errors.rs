//! Error types for distributed locks

use std::time::Duration;

use shared_types::StoreError;
use thiserror::Error;

/// All errors a lock operation can return
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The resource stayed held for the whole acquire timeout
    #[error("Timed out after {waited:?} waiting for lock on {resource_id}")]
    Timeout { resource_id: String, waited: Duration },

    /// The stored token no longer matches (expired, or taken by another holder)
    #[error("Lock on {resource_id} is not owned by token {token}")]
    OwnershipMismatch { resource_id: String, token: String },

    /// Resource ids must be non-empty
    #[error("Invalid resource id: {0:?}")]
    InvalidResource(String),

    /// Shared store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    /// Whether the caller may simply try again later
    pub fn is_contention(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
