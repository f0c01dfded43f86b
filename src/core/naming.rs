//! Qualified job names for step runs.
//!
//! A step's lineage job is named `<job>.<step_key>`. Step keys already use
//! `.` for nested graphs, so the name only splits back unambiguously when
//! the job name itself has no `.`.

use super::error::LineageError;

/// Separator between job name and step key
pub const DELIMITER: char = '.';

/// Join a job name and a step key verbatim, without escaping.
pub fn make_step_job_name(job_name: &str, step_key: &str) -> String {
    format!("{}{}{}", job_name, DELIMITER, step_key)
}

/// Like [`make_step_job_name`], but refuses names that would not split back.
pub fn make_step_job_name_strict(job_name: &str, step_key: &str) -> Result<String, LineageError> {
    if job_name.is_empty() || step_key.is_empty() {
        return Err(LineageError::InvalidArgument(format!(
            "job name and step key must be non-empty (got {:?}, {:?})",
            job_name, step_key
        )));
    }
    if job_name.contains(DELIMITER) {
        return Err(LineageError::InvalidArgument(format!(
            "job name {:?} contains the delimiter '{}'",
            job_name, DELIMITER
        )));
    }
    Ok(make_step_job_name(job_name, step_key))
}

/// Split a qualified name at its first delimiter into (job, step key)
pub fn split_step_job_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(DELIMITER)
        .filter(|(job, step)| !job.is_empty() && !step.is_empty())
}
