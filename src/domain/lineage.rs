//! Lineage events produced from engine records.
//!
//! These are the values handed to a downstream publisher. Transport is not
//! handled here.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Producer URI stamped on every emitted event
pub const PRODUCER: &str = concat!(
    "https://github.com/lineage-tap/lineage-tap/tree/",
    env!("CARGO_PKG_VERSION")
);

/// A run-state transition in lineage terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageEvent {
    pub event_type: LineageEventType,

    /// Canonical UTC timestamp (`YYYY-MM-DDThh:mm:ss.ffffffZ`)
    pub event_time: String,

    pub run: LineageRun,

    pub job: LineageJob,

    /// Repository the job definition came from, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,

    /// Datasets produced by the run (asset key paths joined with `/`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    pub producer: String,
}

impl LineageEvent {
    /// Step-level fields, if this event describes a step run.
    ///
    /// Job-level events carry the engine's run id rather than a generated
    /// one, so they have no step shape.
    pub fn step_fields(&self) -> Option<StepLineageFields> {
        self.run.parent.as_ref()?;
        let lineage_run_id = Uuid::parse_str(&self.run.run_id).ok()?;

        Some(StepLineageFields {
            lineage_run_id,
            qualified_job_name: self.job.name.clone(),
            event_time_utc: self.event_time.clone(),
            repository_name: self.repository_name.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineageEventType {
    Start,
    Complete,
    Fail,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageRun {
    /// Engine run id for jobs, generated UUIDv7 for steps
    pub run_id: String,

    /// Enclosing job run, for step runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentRun {
    pub run_id: String,
    pub job: LineageJob,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageJob {
    pub namespace: String,
    pub name: String,
}

/// Per-step values derived from one engine record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLineageFields {
    pub lineage_run_id: Uuid,
    pub qualified_job_name: String,
    pub event_time_utc: String,
    pub repository_name: Option<String>,
}
