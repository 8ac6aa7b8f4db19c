//! In-memory fakes for the storage ports, used by the core unit tests.
//!
//! Each fake keeps its state behind an `Arc`, so a clone handed to a service
//! and a clone kept by the test observe the same data.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use fieldvisit_types::draft::{Draft, DraftId, DraftSummary};
use fieldvisit_types::error::RepositoryError;

use crate::repository::draft::DraftRepository;
use crate::service::clock::Clock;
use crate::storage::blob_store::BlobStore;
use crate::tree::blobs::BlobMap;

// ---------------------------------------------------------------------------
// Metadata tier
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryDraftRepository {
    records: Arc<Mutex<HashMap<DraftId, Draft>>>,
    corrupt: Arc<Mutex<HashSet<DraftId>>>,
}

impl InMemoryDraftRepository {
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// The stored record exactly as written, bypassing corruption.
    pub fn raw(&self, draft_id: &DraftId) -> Option<Draft> {
        self.records.lock().unwrap().get(draft_id).cloned()
    }

    /// Make the next reads of `draft_id` fail to decode.
    pub fn corrupt(&self, draft_id: &DraftId) {
        self.corrupt.lock().unwrap().insert(draft_id.clone());
    }
}

impl DraftRepository for InMemoryDraftRepository {
    async fn upsert(&self, draft: &Draft) -> Result<DateTime<Utc>, RepositoryError> {
        self.corrupt.lock().unwrap().remove(&draft.draft_id);
        let mut records = self.records.lock().unwrap();
        let mut record = draft.clone();
        if let Some(existing) = records.get(&draft.draft_id) {
            record.created_at = existing.created_at;
        }
        let created_at = record.created_at;
        records.insert(draft.draft_id.clone(), record);
        Ok(created_at)
    }

    async fn get(&self, draft_id: &DraftId) -> Result<Option<Draft>, RepositoryError> {
        if self.corrupt.lock().unwrap().contains(draft_id) {
            return Err(RepositoryError::Corrupt(format!(
                "record for {draft_id} is not valid JSON"
            )));
        }
        Ok(self.raw(draft_id))
    }

    async fn delete(&self, draft_id: &DraftId) -> Result<bool, RepositoryError> {
        self.corrupt.lock().unwrap().remove(draft_id);
        Ok(self.records.lock().unwrap().remove(draft_id).is_some())
    }

    async fn list(&self) -> Result<Vec<DraftSummary>, RepositoryError> {
        let mut summaries: Vec<DraftSummary> = self
            .records
            .lock()
            .unwrap()
            .values()
            .map(DraftSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn list_updated_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DraftId>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.updated_at < cutoff)
            .map(|d| d.draft_id.clone())
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Blob tier
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<DraftId, BlobMap>>>,
    fail_puts: Arc<AtomicBool>,
    fail_gets: Arc<AtomicBool>,
}

impl InMemoryBlobStore {
    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self, draft_id: &DraftId) -> BlobMap {
        self.blobs
            .lock()
            .unwrap()
            .get(draft_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl BlobStore for InMemoryBlobStore {
    async fn put_all(&self, draft_id: &DraftId, blobs: &BlobMap) -> Result<(), RepositoryError> {
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(RepositoryError::Quota("storage full".to_string()));
        }
        if blobs.is_empty() {
            return Ok(());
        }
        let mut stored = self.blobs.lock().unwrap();
        let entry = stored.entry(draft_id.clone()).or_default();
        for (path, attachment) in blobs {
            entry.insert(path.clone(), attachment.clone());
        }
        Ok(())
    }

    async fn get_all(&self, draft_id: &DraftId) -> Result<BlobMap, RepositoryError> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(RepositoryError::Connection);
        }
        Ok(self.raw(draft_id))
    }

    async fn delete_all(&self, draft_id: &DraftId) -> Result<(), RepositoryError> {
        self.blobs.lock().unwrap().remove(draft_id);
        Ok(())
    }

    async fn retain_paths(
        &self,
        draft_id: &DraftId,
        keep: &[String],
    ) -> Result<usize, RepositoryError> {
        let mut stored = self.blobs.lock().unwrap();
        let Some(entry) = stored.get_mut(draft_id) else {
            return Ok(0);
        };
        let before = entry.len();
        entry.retain(|path, _| keep.contains(path));
        let removed = before - entry.len();
        if entry.is_empty() {
            stored.remove(draft_id);
        }
        Ok(removed)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: TimeDelta) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
