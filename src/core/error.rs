//! Errors surfaced by the scan and mapping layer.

use thiserror::Error;

use crate::adapters::StoreError;

/// Failure of a lineage-layer operation.
///
/// Each variant calls for a different remediation, so callers match on them
/// rather than treating them as one opaque error. Nothing here is retried.
#[derive(Debug, Error)]
pub enum LineageError {
    /// The backing store call failed; the store's error is kept as-is
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Run {run_id} has malformed origin: {reason}")]
    MalformedOrigin { run_id: String, reason: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl LineageError {
    /// Whether the failure came from the store rather than the data
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
