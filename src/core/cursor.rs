//! Sensor cursor: the scan watermark plus in-flight run state.
//!
//! The cursor is persisted as a single JSON document. Step run ids are
//! generated when a step starts and must survive until the step ends,
//! possibly several ticks later, so they live here next to the watermark.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Persisted sensor state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageCursor {
    /// Highest storage id already processed (exclusive lower bound)
    pub last_storage_id: i64,

    /// Runs that have started and not yet finished, keyed by engine run id
    #[serde(default)]
    pub running_pipelines: BTreeMap<String, RunningPipeline>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningPipeline {
    /// Repository resolved when the run was first seen
    pub repository_name: Option<String>,

    /// Steps that have started and not yet finished, keyed by step key
    #[serde(default)]
    pub running_steps: BTreeMap<String, RunningStep>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningStep {
    /// Lineage run id generated at step start
    pub step_run_id: Uuid,

    /// Datasets materialized by the step so far
    #[serde(default)]
    pub output_datasets: Vec<String>,
}

impl LineageCursor {
    /// Fresh cursor starting after `after_storage_id`
    pub fn new(after_storage_id: i64) -> Self {
        Self {
            last_storage_id: after_storage_id,
            running_pipelines: BTreeMap::new(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Number of steps currently tracked across all runs
    pub fn running_step_count(&self) -> usize {
        self.running_pipelines
            .values()
            .map(|p| p.running_steps.len())
            .sum()
    }
}

/// On-disk location of a persisted cursor
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

/// Exclusive lock on a cursor file; released on drop
#[derive(Debug)]
pub struct CursorLock {
    _file: File,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Take the exclusive tick lock, failing if another process holds it
    pub fn lock(&self) -> Result<CursorLock> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "Cursor is locked by another process: {}",
                lock_path.display()
            )
        })?;

        Ok(CursorLock { _file: file })
    }

    /// Read the cursor; `None` if it has never been written
    pub fn load(&self) -> Result<Option<LineageCursor>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cursor: {}", self.path.display()))?;

        let cursor = LineageCursor::from_json(&raw)
            .with_context(|| format!("Failed to parse cursor: {}", self.path.display()))?;

        Ok(Some(cursor))
    }

    /// Read the cursor, or start after `after_storage_id` if there is none
    pub fn load_or_new(&self, after_storage_id: i64) -> Result<LineageCursor> {
        Ok(self
            .load()?
            .unwrap_or_else(|| LineageCursor::new(after_storage_id)))
    }

    /// Replace the cursor atomically (write to a temp file, then rename)
    pub fn save(&self, cursor: &LineageCursor) -> Result<()> {
        let dir = self.path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        let json = serde_json::to_string_pretty(cursor).context("Failed to serialize cursor")?;

        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(json.as_bytes())
            .context("Failed to write cursor")?;
        tmp.as_file().sync_all().context("Failed to sync cursor")?;
        tmp.persist(&self.path)
            .with_context(|| format!("Failed to persist cursor: {}", self.path.display()))?;

        Ok(())
    }
}
