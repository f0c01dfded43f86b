//! Event records read from the orchestration engine's event log.
//!
//! Records are owned by the engine; this crate only reads them. Each record
//! sits at a unique, strictly increasing storage position that doubles as the
//! scan cursor.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single record from the engine's append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Storage position (strictly increasing across the log)
    pub storage_id: i64,

    /// Classification of this event
    pub event_type: EventType,

    /// Engine run this event belongs to
    pub run_id: String,

    /// Job (pipeline) name of the run
    pub job_name: String,

    /// Step key, for step-level events
    pub step_key: Option<String>,

    /// Unix epoch seconds, possibly fractional
    pub timestamp: f64,

    /// Asset key path, for asset events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_key: Option<Vec<String>>,

    /// Opaque engine payload
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Create a record with an empty payload
    pub fn new(
        storage_id: i64,
        event_type: EventType,
        run_id: impl Into<String>,
        job_name: impl Into<String>,
        timestamp: f64,
    ) -> Self {
        Self {
            storage_id,
            event_type,
            run_id: run_id.into(),
            job_name: job_name.into(),
            step_key: None,
            timestamp,
            asset_key: None,
            payload: serde_json::Value::Null,
        }
    }

    /// Attach a step key
    pub fn with_step(mut self, step_key: impl Into<String>) -> Self {
        self.step_key = Some(step_key.into());
        self
    }

    /// Attach an asset key path
    pub fn with_asset_key(mut self, asset_key: Vec<String>) -> Self {
        self.asset_key = Some(asset_key);
        self
    }

    /// Attach an engine payload
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Event classifications emitted by the engine.
///
/// Serialized names match the engine's own event type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    RunEnqueued,
    RunDequeued,
    RunStarting,
    RunStart,
    RunSuccess,
    RunFailure,
    RunCanceling,
    RunCanceled,

    StepStart,
    StepInput,
    StepOutput,
    StepSuccess,
    StepFailure,
    StepSkipped,
    StepUpForRetry,
    StepRestarted,
    AssetMaterialization,
    AssetObservation,

    EngineEvent,
    LogsCaptured,
}

/// Coarse grouping of event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// Job-level lifecycle events
    Run,

    /// Step-level events, including asset events raised inside a step
    Step,

    /// Engine housekeeping, not relevant to lineage
    Other,
}

impl EventType {
    /// Every known event type
    pub const ALL: [EventType; 20] = [
        EventType::RunEnqueued,
        EventType::RunDequeued,
        EventType::RunStarting,
        EventType::RunStart,
        EventType::RunSuccess,
        EventType::RunFailure,
        EventType::RunCanceling,
        EventType::RunCanceled,
        EventType::StepStart,
        EventType::StepInput,
        EventType::StepOutput,
        EventType::StepSuccess,
        EventType::StepFailure,
        EventType::StepSkipped,
        EventType::StepUpForRetry,
        EventType::StepRestarted,
        EventType::AssetMaterialization,
        EventType::AssetObservation,
        EventType::EngineEvent,
        EventType::LogsCaptured,
    ];

    pub fn category(self) -> EventCategory {
        use EventType::*;
        match self {
            RunEnqueued | RunDequeued | RunStarting | RunStart | RunSuccess | RunFailure
            | RunCanceling | RunCanceled => EventCategory::Run,
            StepStart | StepInput | StepOutput | StepSuccess | StepFailure | StepSkipped
            | StepUpForRetry | StepRestarted | AssetMaterialization | AssetObservation => {
                EventCategory::Step
            }
            EngineEvent | LogsCaptured => EventCategory::Other,
        }
    }

    /// Engine name of this event type (e.g. `STEP_START`)
    pub fn as_str(self) -> &'static str {
        use EventType::*;
        match self {
            RunEnqueued => "RUN_ENQUEUED",
            RunDequeued => "RUN_DEQUEUED",
            RunStarting => "RUN_STARTING",
            RunStart => "RUN_START",
            RunSuccess => "RUN_SUCCESS",
            RunFailure => "RUN_FAILURE",
            RunCanceling => "RUN_CANCELING",
            RunCanceled => "RUN_CANCELED",
            StepStart => "STEP_START",
            StepInput => "STEP_INPUT",
            StepOutput => "STEP_OUTPUT",
            StepSuccess => "STEP_SUCCESS",
            StepFailure => "STEP_FAILURE",
            StepSkipped => "STEP_SKIPPED",
            StepUpForRetry => "STEP_UP_FOR_RETRY",
            StepRestarted => "STEP_RESTARTED",
            AssetMaterialization => "ASSET_MATERIALIZATION",
            AssetObservation => "ASSET_OBSERVATION",
            EngineEvent => "ENGINE_EVENT",
            LogsCaptured => "LOGS_CAPTURED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("Unknown event type: {}", s))
    }
}

/// Query filter for a single-classification retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecordsFilter {
    /// Only records of this classification
    pub event_type: EventType,

    /// Only records with storage id strictly greater than this
    pub after_cursor: i64,
}

impl EventRecordsFilter {
    pub fn new(event_type: EventType, after_cursor: i64) -> Self {
        Self {
            event_type,
            after_cursor,
        }
    }

    /// Check whether a record satisfies this filter
    pub fn matches(&self, record: &EventRecord) -> bool {
        record.event_type == self.event_type && record.storage_id > self.after_cursor
    }
}

/// Set of classifications a scan retrieves.
///
/// Iteration order is the `EventType` declaration order, so scans over the
/// same set always issue their calls in the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassificationSet(BTreeSet<EventType>);

impl ClassificationSet {
    pub fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// All job-level lifecycle events
    pub fn run_events() -> Self {
        Self::of_category(EventCategory::Run)
    }

    /// All step-level events
    pub fn step_events() -> Self {
        Self::of_category(EventCategory::Step)
    }

    /// Run and step events: the set a lineage sensor scans by default
    pub fn lineage_default() -> Self {
        Self::run_events().union(&Self::step_events())
    }

    fn of_category(category: EventCategory) -> Self {
        EventType::ALL
            .iter()
            .copied()
            .filter(|t| t.category() == category)
            .collect()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn insert(&mut self, event_type: EventType) -> bool {
        self.0.insert(event_type)
    }

    pub fn contains(&self, event_type: EventType) -> bool {
        self.0.contains(&event_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = EventType> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<EventType> for ClassificationSet {
    fn from_iter<I: IntoIterator<Item = EventType>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
