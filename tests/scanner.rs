//! Event Cursor Scanner Integration Tests
//!
//! Tests for per-classification retrieval, cursor semantics and merging.

use std::sync::Mutex;

use async_trait::async_trait;
use lineage_tap::adapters::{EventLogStore, SqliteInstance, StoreError};
use lineage_tap::core::{get_event_log_records, LineageError};
use lineage_tap::domain::{ClassificationSet, EventRecord, EventRecordsFilter, EventType};

/// Store double that records every query and serves a fixed log
struct RecordingStore {
    log: Vec<EventRecord>,
    calls: Mutex<Vec<(EventRecordsFilter, usize)>>,
}

impl RecordingStore {
    fn new(log: Vec<EventRecord>) -> Self {
        Self {
            log,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<(EventRecordsFilter, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventLogStore for RecordingStore {
    async fn get_event_records(
        &self,
        filter: &EventRecordsFilter,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        self.calls.lock().unwrap().push((*filter, limit));
        Ok(self
            .log
            .iter()
            .filter(|r| filter.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Two interleaved runs: ids 1..=10
fn sample_log() -> Vec<EventRecord> {
    let steps = [
        (EventType::RunStart, "a", None),
        (EventType::RunStart, "b", None),
        (EventType::StepStart, "a", Some("extract")),
        (EventType::StepStart, "b", Some("extract")),
        (EventType::StepSuccess, "a", Some("extract")),
        (EventType::EngineEvent, "a", None),
        (EventType::StepFailure, "b", Some("extract")),
        (EventType::RunSuccess, "a", None),
        (EventType::RunFailure, "b", None),
        (EventType::LogsCaptured, "b", None),
    ];

    steps
        .iter()
        .enumerate()
        .map(|(i, (event_type, run, step))| {
            let record = EventRecord::new(i as i64 + 1, *event_type, *run, "etl", i as f64);
            match step {
                Some(step) => record.with_step(*step),
                None => record,
            }
        })
        .collect()
}

#[tokio::test]
async fn test_get_event_log_records() {
    let store = RecordingStore::new(sample_log());
    let last_storage_id = 100;
    let record_filter_limit = 100;
    let event_types = ClassificationSet::run_events().union(&ClassificationSet::step_events());

    get_event_log_records(&store, &event_types, last_storage_id, record_filter_limit)
        .await
        .unwrap();

    let calls = store.calls();
    assert_eq!(calls.len(), event_types.len());
    for event_type in event_types.iter() {
        assert!(calls.contains(&(
            EventRecordsFilter::new(event_type, last_storage_id),
            record_filter_limit
        )));
    }
}

#[tokio::test]
async fn test_only_requested_classifications_returned() {
    let store = RecordingStore::new(sample_log());

    let batch = get_event_log_records(&store, &ClassificationSet::lineage_default(), 0, 100)
        .await
        .unwrap();

    // Engine housekeeping (ids 6 and 10) is not part of the default set
    let mut ids: Vec<i64> = batch.records().map(|r| r.storage_id).collect();
    ids.sort();
    assert_eq!(ids, vec![1, 2, 3, 4, 5, 7, 8, 9]);
}

#[tokio::test]
async fn test_repeated_scan_is_idempotent() {
    let store = RecordingStore::new(sample_log());
    let event_types = ClassificationSet::lineage_default();

    let first = get_event_log_records(&store, &event_types, 3, 2).await.unwrap();
    let second = get_event_log_records(&store, &event_types, 3, 2).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_advancing_cursor_never_repeats_or_skips() {
    let log = sample_log();
    let store = RecordingStore::new(log.clone());
    let event_types = ClassificationSet::lineage_default();

    let mut cursor = 0;
    let mut seen = Vec::new();
    for _ in 0..20 {
        let merged = get_event_log_records(&store, &event_types, cursor, 1)
            .await
            .unwrap()
            .into_merged();
        let Some(last) = merged.last() else { break };
        cursor = last.storage_id;
        seen.extend(merged.into_iter().map(|r| r.storage_id));
    }

    let expected: Vec<i64> = log
        .iter()
        .filter(|r| event_types.contains(r.event_type))
        .map(|r| r.storage_id)
        .collect();
    assert_eq!(seen, expected);
}

#[tokio::test]
async fn test_pages_keep_store_order() {
    let store = RecordingStore::new(sample_log());
    let event_types: ClassificationSet =
        [EventType::RunStart, EventType::StepStart].into_iter().collect();

    let batch = get_event_log_records(&store, &event_types, 0, 10).await.unwrap();

    assert_eq!(batch.pages().len(), 2);
    for page in batch.pages() {
        assert!(page.records.iter().all(|r| r.event_type == page.event_type));
        assert!(page.records.windows(2).all(|w| w[0].storage_id < w[1].storage_id));
    }
    assert_eq!(batch.max_storage_id(), Some(4));
}

#[tokio::test]
async fn test_sqlite_store_scan() {
    let instance = SqliteInstance::in_memory().unwrap();
    for record in sample_log() {
        instance.store_event(&record).unwrap();
    }

    let merged = get_event_log_records(&instance, &ClassificationSet::step_events(), 2, 10)
        .await
        .unwrap()
        .into_merged();

    let ids: Vec<i64> = merged.iter().map(|r| r.storage_id).collect();
    assert_eq!(ids, vec![3, 4, 5, 7]);
    assert_eq!(merged[0].step_key.as_deref(), Some("extract"));
}

#[tokio::test]
async fn test_store_failure_is_not_swallowed() {
    struct DownStore;

    #[async_trait]
    impl EventLogStore for DownStore {
        async fn get_event_records(
            &self,
            _filter: &EventRecordsFilter,
            _limit: usize,
        ) -> Result<Vec<EventRecord>, StoreError> {
            Err(StoreError::Unavailable("connection reset".to_string()))
        }
    }

    let err = get_event_log_records(&DownStore, &ClassificationSet::lineage_default(), 0, 10)
        .await
        .unwrap_err();

    assert!(err.is_store_failure());
    assert!(matches!(err, LineageError::Store(StoreError::Unavailable(_))));
}
