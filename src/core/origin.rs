//! Resolution of the repository a run's job definition came from.

use tracing::{debug, instrument};

use crate::adapters::RunStore;

use super::error::LineageError;

/// Look up `run_id` and return the repository named in its external origin.
///
/// Issues exactly one store lookup. A missing run and a run without a usable
/// origin are reported as different errors.
#[instrument(skip(store))]
pub async fn get_repository_name<S>(store: &S, run_id: &str) -> Result<String, LineageError>
where
    S: RunStore + ?Sized,
{
    let run = store
        .get_run_by_id(run_id)
        .await?
        .ok_or_else(|| LineageError::RunNotFound {
            run_id: run_id.to_string(),
        })?;

    let origin = run
        .external_job_origin
        .ok_or_else(|| LineageError::MalformedOrigin {
            run_id: run_id.to_string(),
            reason: "run has no external job origin".to_string(),
        })?;

    match origin.repository_origin.repository_name {
        Some(name) if !name.is_empty() => {
            debug!(repository = %name, "Resolved run origin");
            Ok(name)
        }
        _ => Err(LineageError::MalformedOrigin {
            run_id: run_id.to_string(),
            reason: "external job origin has no repository name".to_string(),
        }),
    }
}
