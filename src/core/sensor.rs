//! One polling pass over the event log.
//!
//! A tick scans from the cursor, merges pages into storage order, and
//! translates records one by one. A record whose data cannot be translated
//! (unknown run, bad timestamp, rejected name) is logged and skipped. A store
//! failure stops the tick before the failing record, so the tick can be
//! repeated from the cursor it returns without losing or repeating events.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::adapters::{EventLogStore, RunStore};
use crate::domain::{ClassificationSet, LineageEvent};

use super::cursor::LineageCursor;
use super::error::LineageError;
use super::scanner::get_event_log_records;
use super::translator::LineageTranslator;

/// Sensor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSettings {
    /// Namespace stamped on every lineage job
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Maximum records fetched per classification per tick
    #[serde(default = "default_record_filter_limit")]
    pub record_filter_limit: usize,

    /// Watermark used when no cursor has been persisted yet
    #[serde(default)]
    pub after_storage_id: i64,

    /// Reject job names containing the step delimiter
    #[serde(default)]
    pub strict_naming: bool,

    /// Classifications to scan
    #[serde(default = "ClassificationSet::lineage_default")]
    pub event_types: ClassificationSet,
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_record_filter_limit() -> usize {
    30
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            record_filter_limit: default_record_filter_limit(),
            after_storage_id: 0,
            strict_naming: false,
            event_types: ClassificationSet::lineage_default(),
        }
    }
}

/// A record passed over because its data could not be translated
#[derive(Debug)]
pub struct SkippedRecord {
    pub storage_id: i64,
    pub error: LineageError,
}

/// Outcome of a tick
#[derive(Debug)]
pub struct TickReport {
    /// Events produced, in storage order
    pub events: Vec<LineageEvent>,

    /// Cursor to persist; advanced past every record that translated
    pub cursor: LineageCursor,

    /// Records consumed this tick, skipped ones included
    pub records_processed: usize,

    /// Records consumed without producing events
    pub skipped: Vec<SkippedRecord>,

    /// The store failure that stopped the tick early, if any
    pub error: Option<LineageError>,
}

impl TickReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Split into the events and cursor, or the error if the tick failed.
    ///
    /// Callers that need the partial progress of a failed tick should read
    /// the fields directly instead.
    pub fn into_result(self) -> Result<(Vec<LineageEvent>, LineageCursor), LineageError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok((self.events, self.cursor)),
        }
    }
}

/// Polls the event log and translates new records
#[derive(Debug, Clone, Default)]
pub struct LineageSensor {
    settings: SensorSettings,
}

impl LineageSensor {
    pub fn new(settings: SensorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }

    /// Cursor to start from when none has been persisted
    pub fn initial_cursor(&self) -> LineageCursor {
        LineageCursor::new(self.settings.after_storage_id)
    }

    /// Run one tick against `store` starting from `cursor`
    #[instrument(skip(self, store, cursor), fields(after = cursor.last_storage_id))]
    pub async fn tick<S>(&self, store: &S, mut cursor: LineageCursor) -> TickReport
    where
        S: EventLogStore + RunStore + ?Sized,
    {
        let started = Instant::now();

        let batch = match get_event_log_records(
            store,
            &self.settings.event_types,
            cursor.last_storage_id,
            self.settings.record_filter_limit,
        )
        .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Event log scan failed");
                return TickReport {
                    events: Vec::new(),
                    cursor,
                    records_processed: 0,
                    skipped: Vec::new(),
                    error: Some(e),
                };
            }
        };

        let translator = LineageTranslator::new(store, &self.settings.namespace)
            .with_strict_naming(self.settings.strict_naming);

        let mut events = Vec::new();
        let mut records_processed = 0;
        let mut skipped = Vec::new();
        let mut failure = None;

        for record in batch.into_merged() {
            match translator.translate(&mut cursor, &record).await {
                Ok(produced) => events.extend(produced),
                Err(e) if e.is_store_failure() => {
                    error!(
                        storage_id = record.storage_id,
                        error = %e,
                        "Store failed while translating record, stopping tick"
                    );
                    failure = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(
                        storage_id = record.storage_id,
                        event_type = %record.event_type,
                        run_id = %record.run_id,
                        error = %e,
                        "Skipping untranslatable record"
                    );
                    skipped.push(SkippedRecord {
                        storage_id: record.storage_id,
                        error: e,
                    });
                }
            }
            cursor.last_storage_id = record.storage_id;
            records_processed += 1;
        }

        info!(
            records = records_processed,
            skipped = skipped.len(),
            events = events.len(),
            cursor = cursor.last_storage_id,
            running_steps = cursor.running_step_count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tick finished"
        );

        TickReport {
            events,
            cursor,
            records_processed,
            skipped,
            error: failure,
        }
    }
}
