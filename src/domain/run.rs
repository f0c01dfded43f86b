//! Run metadata as recorded by the orchestration engine.
//!
//! Only the parts needed to resolve where a run's job definition came from
//! are modelled; everything else stays in the opaque `tags` map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A run as stored in the engine's run-metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Engine run identifier
    pub run_id: String,

    /// Name of the job being executed
    pub job_name: String,

    /// Current engine status
    #[serde(default)]
    pub status: RunStatus,

    /// Where the job definition was loaded from (absent for ad-hoc runs)
    #[serde(default)]
    pub external_job_origin: Option<ExternalJobOrigin>,

    /// Free-form run tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl RunMetadata {
    /// Create a run with no recorded origin
    pub fn new(run_id: impl Into<String>, job_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            job_name: job_name.into(),
            status: RunStatus::default(),
            external_job_origin: None,
            tags: BTreeMap::new(),
        }
    }

    /// Attach an external origin pointing at `repository_name`
    pub fn with_repository(mut self, repository_name: impl Into<String>) -> Self {
        self.external_job_origin = Some(ExternalJobOrigin {
            job_name: self.job_name.clone(),
            repository_origin: ExternalRepositoryOrigin {
                repository_name: Some(repository_name.into()),
                code_location_name: None,
            },
        });
        self
    }

    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = status;
        self
    }
}

/// Descriptor of the externally loaded job a run was launched from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalJobOrigin {
    /// Job name within the repository
    pub job_name: String,

    /// Repository (workspace) that hosts the job definition
    pub repository_origin: ExternalRepositoryOrigin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRepositoryOrigin {
    /// Repository name; missing on origins not backed by a repository
    #[serde(default)]
    pub repository_name: Option<String>,

    /// Code location the repository was loaded from
    #[serde(default)]
    pub code_location_name: Option<String>,
}

/// Engine-side status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Queued,
    NotStarted,
    Starting,
    Started,
    Success,
    Failure,
    Canceling,
    Canceled,
}

impl RunStatus {
    /// Engine name of the status (matches the serde form)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::NotStarted => "NOT_STARTED",
            Self::Starting => "STARTING",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Canceling => "CANCELING",
            Self::Canceled => "CANCELED",
        }
    }
}
