//! Store interfaces for the orchestration engine.
//!
//! The engine is reached through two narrow traits. Any type that
//! implements them (the SQLite store, the in-memory store, a test double)
//! can be handed to the scanner and resolver; nothing holds a global client.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{EventRecord, EventRecordsFilter, RunMetadata};

pub use memory::{InMemoryInstance, StoreCall};
pub use sqlite::SqliteInstance;

/// Errors raised by a backing store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be encoded or decoded; retrying won't help
    #[error("Corrupt {key}: {reason}")]
    Corrupt { key: String, reason: String },
}

/// Read access to the engine's event log
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Records matching `filter`, ascending by storage id, at most `limit`
    async fn get_event_records(
        &self,
        filter: &EventRecordsFilter,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError>;
}

/// Read access to the engine's run-metadata store
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Look up a run; `Ok(None)` when no run has this id
    async fn get_run_by_id(&self, run_id: &str) -> Result<Option<RunMetadata>, StoreError>;
}
