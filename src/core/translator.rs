//! Translation of engine records into lineage events.
//!
//! Job-level events reuse the engine's run id. Step-level events get a fresh
//! UUIDv7 at step start, remembered in the cursor until the step ends, with
//! the enclosing run as parent.

use tracing::{debug, info, instrument, warn};

use crate::adapters::RunStore;
use crate::domain::{
    EventRecord, EventType, LineageEvent, LineageEventType, LineageJob, LineageRun, ParentRun,
    PRODUCER,
};

use super::cursor::{LineageCursor, RunningPipeline, RunningStep};
use super::error::LineageError;
use super::ids::make_step_run_id;
use super::naming::{make_step_job_name, make_step_job_name_strict};
use super::origin::get_repository_name;
use super::time::to_utc_iso_8601;

/// Maps records to lineage events, resolving run origins through `runs`
pub struct LineageTranslator<'a, R: ?Sized> {
    runs: &'a R,
    namespace: &'a str,
    strict_naming: bool,
}

impl<'a, R> LineageTranslator<'a, R>
where
    R: RunStore + ?Sized,
{
    pub fn new(runs: &'a R, namespace: &'a str) -> Self {
        Self {
            runs,
            namespace,
            strict_naming: false,
        }
    }

    /// Reject step job names that cannot be split back into job and step
    pub fn with_strict_naming(mut self, strict: bool) -> Self {
        self.strict_naming = strict;
        self
    }

    /// Translate one record, updating the cursor's in-flight state.
    ///
    /// Returns no events for records that carry no lineage meaning. The
    /// cursor's watermark is left alone; advancing it is the caller's job.
    #[instrument(
        skip(self, cursor, record),
        fields(storage_id = record.storage_id, event_type = %record.event_type, run_id = %record.run_id)
    )]
    pub async fn translate(
        &self,
        cursor: &mut LineageCursor,
        record: &EventRecord,
    ) -> Result<Vec<LineageEvent>, LineageError> {
        match record.event_type {
            EventType::RunStart => {
                let repository = self.repository_for(&record.run_id).await?;
                let event = self.job_event(LineageEventType::Start, record, repository.clone())?;

                cursor
                    .running_pipelines
                    .entry(record.run_id.clone())
                    .or_default()
                    .repository_name = repository;

                info!(job = %record.job_name, "Run started");
                Ok(vec![event])
            }

            EventType::RunSuccess | EventType::RunFailure | EventType::RunCanceled => {
                let event_type = match record.event_type {
                    EventType::RunSuccess => LineageEventType::Complete,
                    EventType::RunFailure => LineageEventType::Fail,
                    _ => LineageEventType::Abort,
                };

                let repository = match cursor.running_pipelines.get(&record.run_id) {
                    Some(pipeline) => pipeline.repository_name.clone(),
                    None => self.repository_for(&record.run_id).await?,
                };
                let event = self.job_event(event_type, record, repository)?;

                if let Some(pipeline) = cursor.running_pipelines.remove(&record.run_id) {
                    if !pipeline.running_steps.is_empty() {
                        warn!(
                            steps = pipeline.running_steps.len(),
                            "Run ended with steps still open"
                        );
                    }
                }

                info!(job = %record.job_name, outcome = ?event_type, "Run ended");
                Ok(vec![event])
            }

            EventType::StepStart => {
                let Some(step_key) = record.step_key.as_deref() else {
                    warn!("Step event without a step key, skipping");
                    return Ok(Vec::new());
                };

                let step = RunningStep {
                    step_run_id: make_step_run_id(),
                    output_datasets: Vec::new(),
                };

                let pipeline = self.ensure_pipeline(cursor, &record.run_id).await?;
                let event = self.step_event(
                    LineageEventType::Start,
                    record,
                    step_key,
                    &step,
                    pipeline.repository_name.clone(),
                )?;

                debug!(step_key, step_run_id = %step.step_run_id, "Step started");
                if let Some(previous) = pipeline.running_steps.insert(step_key.to_string(), step) {
                    warn!(
                        step_key,
                        previous = %previous.step_run_id,
                        "Step restarted before it ended"
                    );
                }
                Ok(vec![event])
            }

            EventType::AssetMaterialization => {
                let (Some(step_key), Some(asset_key)) =
                    (record.step_key.as_deref(), record.asset_key.as_ref())
                else {
                    debug!("Materialization outside a step, skipping");
                    return Ok(Vec::new());
                };

                let dataset = asset_key.join("/");
                match cursor
                    .running_pipelines
                    .get_mut(&record.run_id)
                    .and_then(|p| p.running_steps.get_mut(step_key))
                {
                    Some(step) => {
                        if !step.output_datasets.contains(&dataset) {
                            step.output_datasets.push(dataset);
                        }
                    }
                    None => warn!(step_key, %dataset, "Materialization for a step not being tracked"),
                }
                Ok(Vec::new())
            }

            EventType::StepSuccess | EventType::StepFailure => {
                let Some(step_key) = record.step_key.as_deref() else {
                    warn!("Step event without a step key, skipping");
                    return Ok(Vec::new());
                };
                let event_type = if record.event_type == EventType::StepSuccess {
                    LineageEventType::Complete
                } else {
                    LineageEventType::Fail
                };

                let pipeline = self.ensure_pipeline(cursor, &record.run_id).await?;
                let step = match pipeline.running_steps.get(step_key) {
                    Some(step) => step.clone(),
                    None => {
                        warn!(step_key, "Step ended without a recorded start");
                        RunningStep {
                            step_run_id: make_step_run_id(),
                            output_datasets: Vec::new(),
                        }
                    }
                };
                let event = self.step_event(
                    event_type,
                    record,
                    step_key,
                    &step,
                    pipeline.repository_name.clone(),
                )?;
                pipeline.running_steps.remove(step_key);

                debug!(step_key, step_run_id = %step.step_run_id, outcome = ?event_type, "Step ended");
                Ok(vec![event])
            }

            _ => Ok(Vec::new()),
        }
    }

    /// Tracked state for `run_id`, resolving its origin if the run started
    /// before the sensor saw it
    async fn ensure_pipeline<'c>(
        &self,
        cursor: &'c mut LineageCursor,
        run_id: &str,
    ) -> Result<&'c mut RunningPipeline, LineageError> {
        if !cursor.running_pipelines.contains_key(run_id) {
            let repository = self.repository_for(run_id).await?;
            info!(run_id, repository = ?repository, "Tracking run first seen mid-flight");
            cursor.running_pipelines.insert(
                run_id.to_string(),
                RunningPipeline {
                    repository_name: repository,
                    ..Default::default()
                },
            );
        }
        Ok(cursor
            .running_pipelines
            .entry(run_id.to_string())
            .or_default())
    }

    /// Repository for `run_id`, or `None` for runs launched without an
    /// external origin
    async fn repository_for(&self, run_id: &str) -> Result<Option<String>, LineageError> {
        match get_repository_name(self.runs, run_id).await {
            Ok(repository) => Ok(Some(repository)),
            Err(LineageError::MalformedOrigin { reason, .. }) => {
                warn!(run_id, %reason, "Run has no usable origin, emitting without repository");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn job(&self, name: String) -> LineageJob {
        LineageJob {
            namespace: self.namespace.to_string(),
            name,
        }
    }

    fn job_event(
        &self,
        event_type: LineageEventType,
        record: &EventRecord,
        repository_name: Option<String>,
    ) -> Result<LineageEvent, LineageError> {
        Ok(LineageEvent {
            event_type,
            event_time: to_utc_iso_8601(record.timestamp)?,
            run: LineageRun {
                run_id: record.run_id.clone(),
                parent: None,
            },
            job: self.job(record.job_name.clone()),
            repository_name,
            outputs: Vec::new(),
            producer: PRODUCER.to_string(),
        })
    }

    fn step_event(
        &self,
        event_type: LineageEventType,
        record: &EventRecord,
        step_key: &str,
        step: &RunningStep,
        repository_name: Option<String>,
    ) -> Result<LineageEvent, LineageError> {
        let name = if self.strict_naming {
            make_step_job_name_strict(&record.job_name, step_key)?
        } else {
            make_step_job_name(&record.job_name, step_key)
        };

        Ok(LineageEvent {
            event_type,
            event_time: to_utc_iso_8601(record.timestamp)?,
            run: LineageRun {
                run_id: step.step_run_id.to_string(),
                parent: Some(ParentRun {
                    run_id: record.run_id.clone(),
                    job: self.job(record.job_name.clone()),
                }),
            },
            job: self.job(name),
            repository_name,
            outputs: step.output_datasets.clone(),
            producer: PRODUCER.to_string(),
        })
    }
}
