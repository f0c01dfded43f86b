//! Vec-backed engine store that records every call made against it.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{EventLogStore, RunStore, StoreError};
use crate::domain::{EventRecord, EventRecordsFilter, RunMetadata};

/// A call observed by [`InMemoryInstance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetEventRecords {
        filter: EventRecordsFilter,
        limit: usize,
    },
    GetRunById {
        run_id: String,
    },
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<EventRecord>,
    runs: HashMap<String, RunMetadata>,
    calls: Vec<StoreCall>,
    unavailable: Option<String>,
}

/// In-memory engine instance implementing both store traits
#[derive(Debug, Default)]
pub struct InMemoryInstance {
    inner: Mutex<Inner>,
}

impl InMemoryInstance {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append a record, assigning the next storage id; returns that id
    pub fn append(&self, mut record: EventRecord) -> i64 {
        let mut inner = self.lock();
        let next_id = inner.events.last().map(|e| e.storage_id).unwrap_or(0) + 1;
        record.storage_id = next_id;
        inner.events.push(record);
        next_id
    }

    pub fn add_run(&self, run: RunMetadata) {
        self.lock().runs.insert(run.run_id.clone(), run);
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.lock().unavailable = reason;
    }

    /// Calls observed so far, oldest first
    pub fn calls(&self) -> Vec<StoreCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }
}

#[async_trait]
impl EventLogStore for InMemoryInstance {
    async fn get_event_records(
        &self,
        filter: &EventRecordsFilter,
        limit: usize,
    ) -> Result<Vec<EventRecord>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::GetEventRecords {
            filter: *filter,
            limit,
        });

        if let Some(reason) = &inner.unavailable {
            return Err(StoreError::Unavailable(reason.clone()));
        }

        Ok(inner
            .events
            .iter()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RunStore for InMemoryInstance {
    async fn get_run_by_id(&self, run_id: &str) -> Result<Option<RunMetadata>, StoreError> {
        let mut inner = self.lock();
        inner.calls.push(StoreCall::GetRunById {
            run_id: run_id.to_string(),
        });

        if let Some(reason) = &inner.unavailable {
            return Err(StoreError::Unavailable(reason.clone()));
        }

        Ok(inner.runs.get(run_id).cloned())
    }
}
