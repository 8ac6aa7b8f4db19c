//! Draft lifecycle service.
//!
//! `DraftService` is the only writer of the metadata and blob tiers. A save
//! splits the form tree, writes attachments best-effort, then upserts the
//! clean record; a load reads the record and reassembles the attachments.
//! Attachment-tier failures never block form progress: they are logged and
//! returned as warnings while the metadata save proceeds.

use std::sync::Mutex;

use chrono::TimeDelta;

use fieldvisit_types::config::EngineConfig;
use fieldvisit_types::draft::{
    DRAFT_SCHEMA_VERSION, Draft, DraftId, DraftKind, DraftPatch, DraftSummary, SaveDraftRequest,
    SaveOutcome,
};
use fieldvisit_types::error::{DraftError, DraftWarning, RepositoryError};
use fieldvisit_types::form::FormValue;

use crate::repository::draft::DraftRepository;
use crate::service::clock::{Clock, SystemClock};
use crate::storage::blob_store::BlobStore;
use crate::storage::uploader::AttachmentUploader;
use crate::tree::blobs::{self, Extracted};
use crate::tree::{completeness, merge, path};

/// How a save treats attachments already in the blob tier.
#[derive(Debug, Clone, Copy)]
enum StaleBlobs {
    /// Remove blobs whose path is no longer in the tree.
    Prune,
    /// Restoration was incomplete: leave the blob tier alone and carry the
    /// previous attachment count forward.
    Keep { previous: u32 },
}

/// Service orchestrating the draft lifecycle.
///
/// Generic over the metadata repository, the blob tier and the clock so the
/// core crate never depends on fieldvisit-infra.
pub struct DraftService<R: DraftRepository, B: BlobStore, C: Clock = SystemClock> {
    repo: R,
    blobs: B,
    clock: C,
    config: EngineConfig,
    active: Mutex<Option<DraftId>>,
}

impl<R: DraftRepository, B: BlobStore> DraftService<R, B, SystemClock> {
    /// Create a new DraftService on the system clock.
    pub fn new(repo: R, blobs: B, config: EngineConfig) -> Self {
        Self::with_clock(repo, blobs, SystemClock, config)
    }
}

impl<R: DraftRepository, B: BlobStore, C: Clock> DraftService<R, B, C> {
    pub fn with_clock(repo: R, blobs: B, clock: C, config: EngineConfig) -> Self {
        Self {
            repo,
            blobs,
            clock,
            config,
            active: Mutex::new(None),
        }
    }

    /// Access the underlying blob tier.
    pub fn blob_store(&self) -> &B {
        &self.blobs
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The draft most recently saved or loaded, if it still exists.
    pub fn active_draft(&self) -> Option<DraftId> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_active(&self, draft_id: Option<DraftId>) {
        *self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = draft_id;
    }

    /// Initialize the store: sweep drafts older than the configured age.
    ///
    /// Returns the number of drafts removed.
    pub async fn hydrate(&self) -> Result<usize, DraftError> {
        self.sweep_expired(self.config.draft_max_age_days).await
    }

    /// Save a full form tree for `draft_id`, creating or overwriting the draft.
    ///
    /// 1. Extract attachments from the tree
    /// 2. Write them to the blob tier (best-effort)
    /// 3. Score completeness on the clean tree
    /// 4. Upsert the clean record, keeping the original `created_at`
    /// 5. Prune attachments that are no longer in the tree (best-effort)
    ///
    /// The returned draft carries the full in-memory tree, attachments
    /// included.
    pub async fn save(
        &self,
        draft_id: &DraftId,
        request: SaveDraftRequest,
    ) -> Result<SaveOutcome, DraftError> {
        self.save_inner(draft_id, request, StaleBlobs::Prune).await
    }

    async fn save_inner(
        &self,
        draft_id: &DraftId,
        request: SaveDraftRequest,
        stale: StaleBlobs,
    ) -> Result<SaveOutcome, DraftError> {
        let Extracted { clean, blobs } = blobs::extract(&request.form_tree);
        let mut warnings = Vec::new();

        if !blobs.is_empty() {
            if let Err(err) = self.blobs.put_all(draft_id, &blobs).await {
                tracing::warn!(
                    draft_id = %draft_id,
                    count = blobs.len(),
                    error = %err,
                    "attachments not persisted, saving metadata anyway"
                );
                warnings.push(DraftWarning::AttachmentsNotPersisted {
                    count: blobs.len(),
                    reason: err.to_string(),
                });
            }
        }

        let completeness =
            completeness::score(&clean, self.config.completeness_max_depth).percent();
        let now = self.clock.now();
        let attachment_count = match stale {
            StaleBlobs::Prune => blobs.len() as u32,
            StaleBlobs::Keep { previous } => previous.max(blobs.len() as u32),
        };

        let mut draft = Draft {
            draft_id: draft_id.clone(),
            farm_id: draft_id.farm_id().to_string(),
            user_id: draft_id.user_id().to_string(),
            kind: request.kind,
            current_step: request.current_step,
            form_tree: clean,
            has_attachments: attachment_count > 0,
            attachment_count,
            completeness,
            schema_version: DRAFT_SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        };

        draft.created_at = self.repo.upsert(&draft).await?;

        if let StaleBlobs::Prune = stale {
            let keep: Vec<String> = blobs.keys().cloned().collect();
            match self.blobs.retain_paths(draft_id, &keep).await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::debug!(draft_id = %draft_id, removed, "pruned stale attachments");
                }
                Err(err) => {
                    tracing::warn!(draft_id = %draft_id, error = %err, "stale attachments not pruned");
                    warnings.push(DraftWarning::AttachmentsNotPruned {
                        reason: err.to_string(),
                    });
                }
            }
        }

        self.set_active(Some(draft_id.clone()));

        tracing::debug!(
            draft_id = %draft_id,
            step = draft.current_step,
            completeness = draft.completeness,
            attachments = draft.attachment_count,
            "saved draft"
        );

        draft.form_tree = request.form_tree;
        Ok(SaveOutcome { draft, warnings })
    }

    /// Load a draft with its attachments restored.
    ///
    /// A corrupt record is treated as absent (the wizard starts from an empty
    /// tree). If the blob tier cannot be read, the draft is returned with
    /// `Null` placeholders where attachments were.
    pub async fn load(&self, draft_id: &DraftId) -> Result<Option<Draft>, DraftError> {
        Ok(self.load_inner(draft_id).await?.map(|(draft, _)| draft))
    }

    async fn load_inner(
        &self,
        draft_id: &DraftId,
    ) -> Result<Option<(Draft, Vec<DraftWarning>)>, DraftError> {
        let draft = match self.repo.get(draft_id).await {
            Ok(Some(draft)) => draft,
            Ok(None) => return Ok(None),
            Err(RepositoryError::Corrupt(reason)) => {
                tracing::warn!(
                    draft_id = %draft_id,
                    reason = reason.as_str(),
                    "corrupt draft record, starting from an empty tree"
                );
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let (draft, warnings) = self.restore_attachments(draft).await;
        self.set_active(Some(draft_id.clone()));
        Ok(Some((draft, warnings)))
    }

    async fn restore_attachments(&self, mut draft: Draft) -> (Draft, Vec<DraftWarning>) {
        let mut warnings = Vec::new();
        if !draft.has_attachments {
            return (draft, warnings);
        }

        let stored = match self.blobs.get_all(&draft.draft_id).await {
            Ok(stored) => stored,
            Err(err) => {
                tracing::warn!(
                    draft_id = %draft.draft_id,
                    error = %err,
                    "attachments could not be read, returning placeholders"
                );
                warnings.push(DraftWarning::AttachmentsNotRestored {
                    reason: err.to_string(),
                });
                return (draft, warnings);
            }
        };

        if stored.len() < draft.attachment_count as usize {
            tracing::warn!(
                draft_id = %draft.draft_id,
                expected = draft.attachment_count,
                found = stored.len(),
                "some attachments are missing from the blob tier"
            );
            warnings.push(DraftWarning::AttachmentsNotRestored {
                reason: format!(
                    "expected {} attachment(s), found {}",
                    draft.attachment_count,
                    stored.len()
                ),
            });
        }

        let restored = blobs::restore(std::mem::take(&mut draft.form_tree), &stored);
        draft.form_tree = restored.tree;
        warnings.extend(restored.skipped.into_iter().map(|(path, err)| {
            DraftWarning::AttachmentPathSkipped {
                path,
                reason: err.to_string(),
            }
        }));

        (draft, warnings)
    }

    /// Delete a draft and all of its attachments.
    ///
    /// Returns whether a draft record existed.
    pub async fn delete(&self, draft_id: &DraftId) -> Result<bool, DraftError> {
        if let Err(err) = self.blobs.delete_all(draft_id).await {
            tracing::warn!(draft_id = %draft_id, error = %err, "attachments not deleted");
        }
        let existed = self.repo.delete(draft_id).await?;

        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if active.as_ref() == Some(draft_id) {
            *active = None;
        }
        drop(active);

        tracing::debug!(draft_id = %draft_id, existed, "deleted draft");
        Ok(existed)
    }

    /// Merge a partial update into the stored tree and save the result.
    ///
    /// The stored tree is loaded with attachments restored, so previously
    /// attached binaries survive the merge. If restoration was incomplete,
    /// stale-attachment pruning is skipped for this save.
    pub async fn merge_into(
        &self,
        draft_id: &DraftId,
        patch: DraftPatch,
    ) -> Result<SaveOutcome, DraftError> {
        let (base, step, kind, stale, mut restore_warnings) =
            match self.load_inner(draft_id).await? {
                Some((draft, warnings)) => {
                    let stale = stale_policy(&draft, &warnings);
                    (draft.form_tree, draft.current_step, draft.kind, stale, warnings)
                }
                None => (
                    FormValue::object(),
                    0,
                    DraftKind::default(),
                    StaleBlobs::Prune,
                    Vec::new(),
                ),
            };

        let request = SaveDraftRequest {
            form_tree: merge::merge(base, patch.form),
            current_step: patch.current_step.unwrap_or(step),
            kind: patch.kind.unwrap_or(kind),
        };

        let mut outcome = self.save_inner(draft_id, request, stale).await?;
        restore_warnings.append(&mut outcome.warnings);
        outcome.warnings = restore_warnings;
        Ok(outcome)
    }

    /// Remove drafts (and their attachments) not updated in `max_age_days`.
    ///
    /// Returns the number of drafts removed.
    pub async fn sweep_expired(&self, max_age_days: u32) -> Result<usize, DraftError> {
        let cutoff = self.clock.now() - TimeDelta::days(i64::from(max_age_days));
        let expired = self.repo.list_updated_before(cutoff).await?;

        for draft_id in &expired {
            self.delete(draft_id).await?;
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), max_age_days, "swept expired drafts");
        }
        Ok(expired.len())
    }

    /// Summaries of all drafts, most recently updated first.
    pub async fn list(&self) -> Result<Vec<DraftSummary>, DraftError> {
        Ok(self.repo.list().await?)
    }

    /// Replace every attachment in the draft with a durable reference from
    /// `uploader`, then save once more so the persisted draft holds no raw
    /// payloads.
    ///
    /// Returns `None` when the draft does not exist. The first upload failure
    /// aborts finalization and leaves the stored draft untouched.
    pub async fn finalize_attachments<U: AttachmentUploader>(
        &self,
        draft_id: &DraftId,
        uploader: &U,
    ) -> Result<Option<SaveOutcome>, DraftError> {
        let Some((draft, restore_warnings)) = self.load_inner(draft_id).await? else {
            return Ok(None);
        };

        let stale = stale_policy(&draft, &restore_warnings);
        let Extracted { blobs, .. } = blobs::extract(&draft.form_tree);
        let mut tree = draft.form_tree;

        for (at, attachment) in &blobs {
            let reference = uploader.upload(draft_id, at, attachment).await?;
            if at.is_empty() {
                tree = FormValue::String(reference);
            } else {
                path::set(&mut tree, at, FormValue::String(reference))?;
            }
        }

        let request = SaveDraftRequest {
            form_tree: tree,
            current_step: draft.current_step,
            kind: draft.kind,
        };
        let mut outcome = self.save_inner(draft_id, request, stale).await?;

        tracing::info!(draft_id = %draft_id, uploaded = blobs.len(), "finalized draft attachments");

        let mut warnings = restore_warnings;
        warnings.append(&mut outcome.warnings);
        outcome.warnings = warnings;
        Ok(Some(outcome))
    }
}

fn stale_policy(draft: &Draft, restore_warnings: &[DraftWarning]) -> StaleBlobs {
    if restore_warnings.is_empty() {
        StaleBlobs::Prune
    } else {
        StaleBlobs::Keep {
            previous: draft.attachment_count,
        }
    }
}
