//! Incremental scan of the engine's event log.
//!
//! The store filters on a single event type per query, so a scan issues one
//! query per classification, all with the same exclusive cursor and page
//! limit. Queries run concurrently; each page keeps the store's ascending
//! order. Merging pages into one ordered stream is left to the caller
//! ([`ScanBatch::into_merged`]).

use futures::future::try_join_all;
use tracing::{debug, instrument, warn};

use crate::adapters::{EventLogStore, StoreError};
use crate::domain::{ClassificationSet, EventRecord, EventRecordsFilter, EventType};

use super::error::LineageError;

/// Records returned for one classification
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    pub event_type: EventType,
    pub records: Vec<EventRecord>,
}

/// Result of one scan: a page per classification, in classification order
#[derive(Debug, Clone, PartialEq)]
pub struct ScanBatch {
    after_storage_id: i64,
    limit: usize,
    pages: Vec<ScanPage>,
}

impl ScanBatch {
    fn empty(after_storage_id: i64, limit: usize) -> Self {
        Self {
            after_storage_id,
            limit,
            pages: Vec::new(),
        }
    }

    /// Cursor the scan was issued with
    pub fn after_storage_id(&self) -> i64 {
        self.after_storage_id
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn pages(&self) -> &[ScanPage] {
        &self.pages
    }

    /// All records, page by page (no cross-classification ordering)
    pub fn records(&self) -> impl Iterator<Item = &EventRecord> {
        self.pages.iter().flat_map(|p| p.records.iter())
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|p| p.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_storage_id(&self) -> Option<i64> {
        self.records().map(|r| r.storage_id).max()
    }

    /// Highest storage id below which the batch is known to be complete.
    ///
    /// A page that came back full may have more records behind it, so
    /// nothing past its last record can be trusted yet. `None` means no page
    /// was full and every record in the batch is safe.
    pub fn safe_horizon(&self) -> Option<i64> {
        self.pages
            .iter()
            .filter(|p| self.limit > 0 && p.records.len() >= self.limit)
            .filter_map(|p| p.records.last().map(|r| r.storage_id))
            .min()
    }

    /// Merge all pages into one stream ordered by storage id.
    ///
    /// Duplicates are dropped and records beyond [`Self::safe_horizon`] are
    /// cut, so advancing a cursor to the last merged record never skips a
    /// record a later scan would return.
    pub fn into_merged(self) -> Vec<EventRecord> {
        let horizon = self.safe_horizon();
        let mut records: Vec<EventRecord> = self
            .pages
            .into_iter()
            .flat_map(|p| p.records)
            .filter(|r| horizon.map_or(true, |h| r.storage_id <= h))
            .collect();
        records.sort_by_key(|r| r.storage_id);
        records.dedup_by_key(|r| r.storage_id);
        records
    }
}

/// Fetch records of every classification in `event_types` stored after
/// `after_storage_id`, at most `limit` per classification.
///
/// An empty classification set or a zero limit returns an empty batch
/// without calling the store. Store errors are returned unchanged.
#[instrument(skip(store, event_types), fields(classifications = event_types.len()))]
pub async fn get_event_log_records<S>(
    store: &S,
    event_types: &ClassificationSet,
    after_storage_id: i64,
    limit: usize,
) -> Result<ScanBatch, LineageError>
where
    S: EventLogStore + ?Sized,
{
    if after_storage_id < 0 {
        return Err(LineageError::InvalidArgument(format!(
            "cursor must be non-negative, got {}",
            after_storage_id
        )));
    }

    if event_types.is_empty() || limit == 0 {
        debug!("Nothing to scan");
        return Ok(ScanBatch::empty(after_storage_id, limit));
    }

    let requests = event_types.iter().map(|event_type| async move {
        let filter = EventRecordsFilter::new(event_type, after_storage_id);
        let mut records = store.get_event_records(&filter, limit).await?;

        let before = records.len();
        records.retain(|r| filter.matches(r));
        if records.len() != before {
            warn!(
                %event_type,
                dropped = before - records.len(),
                "Store returned records outside the requested filter"
            );
        }

        Ok::<_, StoreError>(ScanPage {
            event_type,
            records,
        })
    });

    let pages = try_join_all(requests).await?;
    let batch = ScanBatch {
        after_storage_id,
        limit,
        pages,
    };

    debug!(
        records = batch.len(),
        max_storage_id = ?batch.max_storage_id(),
        "Scanned event log"
    );

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryInstance, StoreCall};

    fn seeded() -> InMemoryInstance {
        let instance = InMemoryInstance::new();
        instance.append(EventRecord::new(0, EventType::RunStart, "r", "etl", 1.0));
        instance.append(EventRecord::new(0, EventType::StepStart, "r", "etl", 2.0).with_step("a"));
        instance.append(EventRecord::new(0, EventType::StepSuccess, "r", "etl", 3.0).with_step("a"));
        instance.append(EventRecord::new(0, EventType::StepStart, "r", "etl", 4.0).with_step("b"));
        instance.append(EventRecord::new(0, EventType::StepSuccess, "r", "etl", 5.0).with_step("b"));
        instance.append(EventRecord::new(0, EventType::RunSuccess, "r", "etl", 6.0));
        instance
    }

    #[tokio::test]
    async fn test_one_call_per_classification() {
        let instance = seeded();
        let event_types: ClassificationSet =
            [EventType::RunStart, EventType::StepStart].into_iter().collect();

        get_event_log_records(&instance, &event_types, 100, 100)
            .await
            .unwrap();

        let calls = instance.calls();
        assert_eq!(calls.len(), 2);
        for event_type in event_types.iter() {
            assert!(calls.contains(&StoreCall::GetEventRecords {
                filter: EventRecordsFilter::new(event_type, 100),
                limit: 100,
            }));
        }
    }

    #[tokio::test]
    async fn test_empty_set_and_zero_limit_skip_store() {
        let instance = seeded();

        let batch = get_event_log_records(&instance, &ClassificationSet::new(), 0, 10)
            .await
            .unwrap();
        assert!(batch.is_empty());

        let batch = get_event_log_records(&instance, &ClassificationSet::lineage_default(), 0, 0)
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(instance.calls().is_empty());
    }

    #[tokio::test]
    async fn test_negative_cursor_rejected() {
        let instance = seeded();
        let err = get_event_log_records(&instance, &ClassificationSet::lineage_default(), -1, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, LineageError::InvalidArgument(_)));
        assert!(instance.calls().is_empty());
    }

    #[tokio::test]
    async fn test_merge_orders_by_storage_id() {
        let instance = seeded();
        let batch = get_event_log_records(&instance, &ClassificationSet::lineage_default(), 0, 10)
            .await
            .unwrap();

        assert_eq!(batch.len(), 6);
        assert_eq!(batch.safe_horizon(), None);
        let ids: Vec<i64> = batch.into_merged().iter().map(|r| r.storage_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_merge_stops_at_full_page() {
        let instance = seeded();
        // At limit 1 every non-empty page is full
        let batch = get_event_log_records(&instance, &ClassificationSet::lineage_default(), 0, 1)
            .await
            .unwrap();

        assert_eq!(batch.safe_horizon(), Some(1));
        let ids: Vec<i64> = batch.into_merged().iter().map(|r| r.storage_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let instance = seeded();
        instance.set_unavailable(Some("connection refused".to_string()));

        let err = get_event_log_records(&instance, &ClassificationSet::run_events(), 0, 10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LineageError::Store(StoreError::Unavailable(ref reason)) if reason == "connection refused"
        ));
    }
}
