//! SQLite-backed engine store.
//!
//! Mirrors the layout of the engine's own SQLite storage: an `event_logs`
//! table keyed by an autoincrement id (the storage cursor) and a `runs`
//! table holding each run's JSON body.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use super::{EventLogStore, RunStore, StoreError};
use crate::domain::{EventRecord, EventRecordsFilter, EventType, RunMetadata};

/// Engine instance reading from a SQLite database
pub struct SqliteInstance {
    conn: Mutex<Connection>,
}

/// Raw `event_logs` row before decoding
struct EventRow {
    id: i64,
    run_id: String,
    job_name: String,
    event_type: String,
    step_key: Option<String>,
    timestamp: f64,
    asset_key: Option<String>,
    body: Option<String>,
}

impl SqliteInstance {
    /// Open (and if needed initialise) a database file
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS event_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                job_name TEXT NOT NULL,
                event_type TEXT NOT NULL,
                step_key TEXT,
                timestamp REAL NOT NULL,
                asset_key TEXT,
                body TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_event_logs_type_id ON event_logs(event_type, id);
            CREATE INDEX IF NOT EXISTS idx_event_logs_run ON event_logs(run_id);

            CREATE TABLE IF NOT EXISTS runs (
                run_id TEXT PRIMARY KEY,
                job_name TEXT NOT NULL,
                status TEXT NOT NULL,
                run_body TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append an event; the record's `storage_id` is ignored and the
    /// assigned id is returned
    pub fn store_event(&self, record: &EventRecord) -> Result<i64, StoreError> {
        let asset_key = record
            .asset_key
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Corrupt {
                key: format!("asset key of {} event for run {}", record.event_type, record.run_id),
                reason: e.to_string(),
            })?;
        let body = if record.payload.is_null() {
            None
        } else {
            Some(record.payload.to_string())
        };

        let conn = self.conn();
        conn.execute(
            "INSERT INTO event_logs (run_id, job_name, event_type, step_key, timestamp, asset_key, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.run_id,
                record.job_name,
                record.event_type.as_str(),
                record.step_key,
                record.timestamp,
                asset_key,
                body,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert or replace a run
    pub fn add_run(&self, run: &RunMetadata) -> Result<(), StoreError> {
        let body = serde_json::to_string(run).map_err(|e| StoreError::Corrupt {
            key: format!("run {}", run.run_id),
            reason: e.to_string(),
        })?;

        self.conn().execute(
            "INSERT OR REPLACE INTO runs (run_id, job_name, status, run_body) VALUES (?1, ?2, ?3, ?4)",
            params![run.run_id, run.job_name, run.status.as_str(), body],
        )?;
        Ok(())
    }

    /// Highest storage id in the log (0 when empty)
    pub fn max_storage_id(&self) -> Result<i64, StoreError> {
        let max = self
            .conn()
            .query_row("SELECT COALESCE(MAX(id), 0) FROM event_logs", [], |row| {
                row.get(0)
            })?;
        Ok(max)
    }
}

impl EventRow {
    fn corrupt(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            key: format!("event at storage id {}", self.id),
            reason: reason.into(),
        }
    }

    fn decode(self) -> Result<EventRecord, StoreError> {
        let event_type: EventType = self
            .event_type
            .parse()
            .map_err(|reason: String| self.corrupt(reason))?;

        let asset_key = match &self.asset_key {
            Some(raw) => Some(
                serde_json::from_str(raw)
                    .map_err(|e| self.corrupt(format!("invalid asset key: {}", e)))?,
            ),
            None => None,
        };

        let payload = match &self.body {
            Some(raw) => serde_json::from_str(raw)
                .map_err(|e| self.corrupt(format!("invalid body: {}", e)))?,
            None => serde_json::Value::Null,
        };

        Ok(EventRecord {
            storage_id: self.id,
            event_type,
            run_id: self.run_id,
            job_name: self.job_name,
            step_key: self.step_key,
            timestamp: self.timestamp,
            asset_key,
            payload,
        })
    }
}

#[async_trait]
impl EventLogStore for SqliteInstance {
    async fn get_event_records(
        &self,
        filter: &EventRecordsFilter,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let rows = {
            let conn = self.conn();
            let mut stmt = conn.prepare_cached(
                "SELECT id, run_id, job_name, event_type, step_key, timestamp, asset_key, body
                 FROM event_logs
                 WHERE event_type = ?1 AND id > ?2
                 ORDER BY id ASC
                 LIMIT ?3",
            )?;
            let limit = i64::try_from(limit).unwrap_or(i64::MAX);
            let rows = stmt
                .query_map(
                    params![filter.event_type.as_str(), filter.after_cursor, limit],
                    |row| {
                        Ok(EventRow {
                            id: row.get(0)?,
                            run_id: row.get(1)?,
                            job_name: row.get(2)?,
                            event_type: row.get(3)?,
                            step_key: row.get(4)?,
                            timestamp: row.get(5)?,
                            asset_key: row.get(6)?,
                            body: row.get(7)?,
                        })
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        debug!(
            event_type = %filter.event_type,
            after = filter.after_cursor,
            count = rows.len(),
            "Fetched event records"
        );

        rows.into_iter().map(EventRow::decode).collect()
    }
}

#[async_trait]
impl RunStore for SqliteInstance {
    async fn get_run_by_id(&self, run_id: &str) -> Result<Option<RunMetadata>, StoreError> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT run_body FROM runs WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|raw| {
            serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key: format!("run {}", run_id),
                reason: e.to_string(),
            })
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RunStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_and_fetch_events() {
        let instance = SqliteInstance::in_memory().unwrap();
        let first = instance
            .store_event(&EventRecord::new(0, EventType::RunStart, "r1", "etl", 10.0))
            .unwrap();
        instance
            .store_event(
                &EventRecord::new(0, EventType::StepStart, "r1", "etl", 11.5).with_step("load"),
            )
            .unwrap();
        instance
            .store_event(
                &EventRecord::new(0, EventType::AssetMaterialization, "r1", "etl", 12.0)
                    .with_step("load")
                    .with_asset_key(vec!["warehouse".to_string(), "orders".to_string()]),
            )
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(instance.max_storage_id().unwrap(), 3);

        let steps = instance
            .get_event_records(&EventRecordsFilter::new(EventType::StepStart, 0), 10)
            .await
            .unwrap();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].storage_id, 2);
        assert_eq!(steps[0].step_key.as_deref(), Some("load"));
        assert_eq!(steps[0].timestamp, 11.5);

        let assets = instance
            .get_event_records(&EventRecordsFilter::new(EventType::AssetMaterialization, 2), 10)
            .await
            .unwrap();
        assert_eq!(
            assets[0].asset_key,
            Some(vec!["warehouse".to_string(), "orders".to_string()])
        );
    }

    #[tokio::test]
    async fn test_fetch_respects_cursor_and_limit() {
        let instance = SqliteInstance::in_memory().unwrap();
        for i in 0..5 {
            instance
                .store_event(&EventRecord::new(0, EventType::StepSuccess, "r", "etl", i as f64))
                .unwrap();
        }

        let records = instance
            .get_event_records(&EventRecordsFilter::new(EventType::StepSuccess, 2), 2)
            .await
            .unwrap();
        let ids: Vec<i64> = records.iter().map(|r| r.storage_id).collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_corrupt() {
        let instance = SqliteInstance::in_memory().unwrap();
        instance
            .conn()
            .execute(
                "INSERT INTO event_logs (run_id, job_name, event_type, timestamp) VALUES ('r', 'j', 'STEP_START', 1.0)",
                [],
            )
            .unwrap();
        instance
            .conn()
            .execute("UPDATE event_logs SET body = 'not json' WHERE id = 1", [])
            .unwrap();

        let err = instance
            .get_event_records(&EventRecordsFilter::new(EventType::StepStart, 0), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "event at storage id 1"));
    }

    #[tokio::test]
    async fn test_undecodable_run_is_corrupt() {
        let instance = SqliteInstance::in_memory().unwrap();
        instance
            .conn()
            .execute(
                "INSERT INTO runs (run_id, job_name, status, run_body) VALUES ('r', 'etl', 'STARTED', 'not json')",
                [],
            )
            .unwrap();

        let err = instance.get_run_by_id("r").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { ref key, .. } if key == "run r"));
    }

    #[tokio::test]
    async fn test_run_status_column() {
        let instance = SqliteInstance::in_memory().unwrap();
        instance
            .add_run(&RunMetadata::new("r1", "etl").with_status(RunStatus::NotStarted))
            .unwrap();

        let status: String = instance
            .conn()
            .query_row("SELECT status FROM runs WHERE run_id = 'r1'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(status, "NOT_STARTED");

        let run = instance.get_run_by_id("r1").await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::NotStarted);
    }

    #[tokio::test]
    async fn test_payload_round_trip() {
        let instance = SqliteInstance::in_memory().unwrap();
        let payload = serde_json::json!({ "message": "Started execution", "pid": 4121 });
        instance
            .store_event(
                &EventRecord::new(0, EventType::RunStart, "r1", "etl", 1.0)
                    .with_payload(payload.clone()),
            )
            .unwrap();

        let records = instance
            .get_event_records(&EventRecordsFilter::new(EventType::RunStart, 0), 10)
            .await
            .unwrap();
        assert_eq!(records[0].payload, payload);
    }

    #[tokio::test]
    async fn test_runs_round_trip_through_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("event_log.db");

        {
            let instance = SqliteInstance::open(&path).unwrap();
            instance
                .add_run(&RunMetadata::new("r1", "etl").with_repository("analytics"))
                .unwrap();
        }

        let instance = SqliteInstance::open(&path).unwrap();
        let run = instance.get_run_by_id("r1").await.unwrap().unwrap();
        assert_eq!(run.job_name, "etl");
        assert!(instance.get_run_by_id("missing").await.unwrap().is_none());
    }
}
