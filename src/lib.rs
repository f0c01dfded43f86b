//! lineage-tap - Lineage events from an orchestration engine's event log
//!
//! Polls the engine's append-only event log with a persisted cursor and
//! translates run and step lifecycle records into lineage events.
//!
//! # Architecture
//!
//! - The event log is read incrementally: one query per event type, each
//!   strictly after the cursor and capped at a page limit
//! - Pages are merged into storage order and translated one record at a time
//! - The cursor advances only past records that translated cleanly, and
//!   carries the ids of steps still in flight between ticks
//!
//! # Modules
//!
//! - `adapters`: Store interfaces and implementations (SQLite, in-memory)
//! - `core`: Scanner, origin resolver, field derivation, translator, sensor
//! - `domain`: Data structures (EventRecord, RunMetadata, LineageEvent)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Emit lineage events for everything new in the event log
//! lineage-tap tick
//!
//! # Which repository did a run come from?
//! lineage-tap repo <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use adapters::{EventLogStore, InMemoryInstance, RunStore, SqliteInstance, StoreError};
pub use crate::core::{LineageCursor, LineageError, LineageSensor, SensorSettings, TickReport};
pub use domain::{ClassificationSet, EventRecord, EventType, LineageEvent, RunMetadata};
