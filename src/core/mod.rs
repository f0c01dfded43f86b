//! Core scan and mapping logic.
//!
//! This module contains:
//! - Scanner: Classification-partitioned, cursor-based event log polling
//! - Origin: Run id to repository resolution
//! - Naming, Time, Ids: Field derivation for lineage events
//! - Translator: Record to lineage event mapping
//! - Cursor, Sensor: Persisted state and the polling tick

pub mod cursor;
pub mod error;
pub mod ids;
pub mod naming;
pub mod origin;
pub mod scanner;
pub mod sensor;
pub mod time;
pub mod translator;

// Re-export commonly used types
pub use cursor::{CursorFile, CursorLock, LineageCursor, RunningPipeline, RunningStep};
pub use error::LineageError;
pub use ids::make_step_run_id;
pub use naming::{make_step_job_name, make_step_job_name_strict, split_step_job_name};
pub use origin::get_repository_name;
pub use scanner::{get_event_log_records, ScanBatch, ScanPage};
pub use sensor::{LineageSensor, SensorSettings, SkippedRecord, TickReport};
pub use time::to_utc_iso_8601;
pub use translator::LineageTranslator;
