//! Debounced autosave.
//!
//! The wizard emits a change event on every keystroke. `AutosaveCoordinator`
//! keeps at most one pending write per draft: each `schedule` call re-arms
//! that draft's quiescence timer and replaces the pending payload producer,
//! so a burst of edits collapses into a single write carrying the latest
//! state. Writes for one draft are serialized; once a write has started it
//! runs to completion even if the coordinator is dropped.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use fieldvisit_types::config::EngineConfig;
use fieldvisit_types::draft::{DraftId, DraftPatch, SaveOutcome};
use fieldvisit_types::error::DraftError;

use crate::repository::draft::DraftRepository;
use crate::service::clock::Clock;
use crate::service::draft::DraftService;
use crate::storage::blob_store::BlobStore;

/// Sink for coalesced autosave writes.
pub trait DraftWriter: Send + Sync + 'static {
    fn write_patch(
        &self,
        draft_id: &DraftId,
        patch: DraftPatch,
    ) -> impl Future<Output = Result<SaveOutcome, DraftError>> + Send;
}

impl<R, B, C> DraftWriter for DraftService<R, B, C>
where
    R: DraftRepository + 'static,
    B: BlobStore + 'static,
    C: Clock + 'static,
{
    async fn write_patch(
        &self,
        draft_id: &DraftId,
        patch: DraftPatch,
    ) -> Result<SaveOutcome, DraftError> {
        self.merge_into(draft_id, patch).await
    }
}

type Producer = Box<dyn FnOnce() -> DraftPatch + Send + Sync>;

struct PendingWrite {
    generation: u64,
    token: CancellationToken,
    producer: Producer,
}

struct Shared<W> {
    writer: Arc<W>,
    pending: DashMap<DraftId, PendingWrite>,
    write_locks: DashMap<DraftId, Arc<Mutex<()>>>,
}

impl<W: DraftWriter> Shared<W> {
    fn write_lock(&self, draft_id: &DraftId) -> Arc<Mutex<()>> {
        Arc::clone(&self.write_locks.entry(draft_id.clone()).or_default())
    }

    /// Take the per-draft lock, then claim the pending write selected by
    /// `claim`. Claiming under the lock means a caller that finds nothing
    /// pending knows every earlier write has already finished.
    async fn run_pending(
        &self,
        draft_id: &DraftId,
        claim: impl FnOnce(&PendingWrite) -> bool,
    ) -> Option<Result<SaveOutcome, DraftError>> {
        let lock = self.write_lock(draft_id);
        let result = {
            let _guard = lock.lock().await;
            self.write_claimed(draft_id, claim).await
        };
        drop(lock);

        // Only the map holds the lock once no other write is in flight.
        self.write_locks
            .remove_if(draft_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn write_claimed(
        &self,
        draft_id: &DraftId,
        claim: impl FnOnce(&PendingWrite) -> bool,
    ) -> Option<Result<SaveOutcome, DraftError>> {
        let (_, write) = self
            .pending
            .remove_if(draft_id, |_, pending| claim(pending))?;
        write.token.cancel();

        let patch = (write.producer)();
        let result = self.writer.write_patch(draft_id, patch).await;

        match &result {
            Ok(outcome) => {
                for warning in &outcome.warnings {
                    tracing::warn!(draft_id = %draft_id, %warning, "autosave completed with warning");
                }
                tracing::debug!(
                    draft_id = %draft_id,
                    generation = write.generation,
                    completeness = outcome.draft.completeness,
                    "autosaved draft"
                );
            }
            Err(err) => {
                tracing::error!(draft_id = %draft_id, error = %err, "autosave failed");
            }
        }

        Some(result)
    }
}

/// Per-draft debounce of tree updates into persisted writes.
pub struct AutosaveCoordinator<W: DraftWriter> {
    shared: Arc<Shared<W>>,
    window: Duration,
    generation: AtomicU64,
    shutdown: CancellationToken,
}

impl<W: DraftWriter> AutosaveCoordinator<W> {
    pub fn new(writer: Arc<W>, window: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                writer,
                pending: DashMap::new(),
                write_locks: DashMap::new(),
            }),
            window,
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    /// Build a coordinator using `autosave_quiescence_ms` from the config.
    pub fn from_config(writer: Arc<W>, config: &EngineConfig) -> Self {
        Self::new(writer, Duration::from_millis(config.autosave_quiescence_ms))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of drafts with an armed, not yet started write.
    pub fn pending_count(&self) -> usize {
        self.shared.pending.len()
    }

    /// Arm (or re-arm) the quiescence timer for `draft_id`.
    ///
    /// Any previously scheduled write for the same draft that has not yet
    /// started is discarded; only the latest `producer` is ever invoked. It
    /// runs when the timer fires, so it can read state as of that moment.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, draft_id: DraftId, producer: F)
    where
        F: FnOnce() -> DraftPatch + Send + Sync + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.shutdown.child_token();

        let previous = self.shared.pending.insert(
            draft_id.clone(),
            PendingWrite {
                generation,
                token: token.clone(),
                producer: Box::new(producer),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
            tracing::trace!(draft_id = %draft_id, generation, "re-armed autosave timer");
        }

        let shared = Arc::clone(&self.shared);
        let window = self.window;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(window) => {}
            }
            shared
                .run_pending(&draft_id, |pending| pending.generation == generation)
                .await;
        });
    }

    /// Run the pending write for `draft_id` now instead of waiting for its
    /// timer. Returns `None` if nothing was pending.
    pub async fn flush(&self, draft_id: &DraftId) -> Option<Result<SaveOutcome, DraftError>> {
        self.shared.run_pending(draft_id, |_| true).await
    }

    /// Flush every pending write. Returns how many writes ran.
    pub async fn flush_all(&self) -> usize {
        let draft_ids: Vec<DraftId> = self
            .shared
            .pending
            .iter()
            .map(|entry| entry.key().clone())
            .collect();

        let mut flushed = 0;
        for draft_id in draft_ids {
            if self.flush(&draft_id).await.is_some() {
                flushed += 1;
            }
        }
        flushed
    }

    /// Discard the pending write for `draft_id`. Returns whether one existed.
    pub fn cancel(&self, draft_id: &DraftId) -> bool {
        match self.shared.pending.remove(draft_id) {
            Some((_, write)) => {
                write.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Discard every pending write.
    pub fn cancel_all(&self) {
        self.shared.pending.retain(|_, write| {
            write.token.cancel();
            false
        });
    }
}

impl<W: DraftWriter> Drop for AutosaveCoordinator<W> {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.cancel_all();
    }
}
