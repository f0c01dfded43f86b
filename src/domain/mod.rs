//! Domain types for lineage-tap.
//!
//! This module contains the core data structures:
//! - Events: Records read from the engine's event log
//! - Run: Engine run metadata and job origin
//! - Lineage: Events produced for downstream publishers

pub mod events;
pub mod lineage;
pub mod run;

// Re-export commonly used types
pub use events::{ClassificationSet, EventCategory, EventRecord, EventRecordsFilter, EventType};
pub use lineage::{
    LineageEvent, LineageEventType, LineageJob, LineageRun, ParentRun, StepLineageFields, PRODUCER,
};
pub use run::{ExternalJobOrigin, ExternalRepositoryOrigin, RunMetadata, RunStatus};
