//! Draft metadata persistence trait.
//!
//! Defines `DraftRepository` for saving and restoring the structured part of
//! a draft. Records handed to the repository always carry a clean form tree
//! (attachments externalized), so every implementation can store the tree as
//! plain JSON.

use std::future::Future;

use chrono::{DateTime, Utc};

use fieldvisit_types::draft::{Draft, DraftId, DraftSummary};
use fieldvisit_types::error::RepositoryError;

/// Persistence interface for draft records (the metadata tier).
///
/// Uses RPITIT (return position `impl Trait` in traits) consistent with
/// all async traits in this project.
pub trait DraftRepository: Send + Sync {
    /// Insert or replace the record keyed by `draft.draft_id`.
    ///
    /// When a record already exists its original `created_at` is kept; the
    /// effective `created_at` is returned.
    fn upsert(
        &self,
        draft: &Draft,
    ) -> impl Future<Output = Result<DateTime<Utc>, RepositoryError>> + Send;

    /// Load a record by key.
    ///
    /// Returns `None` if no draft exists, and `RepositoryError::Corrupt` if
    /// the stored record cannot be decoded.
    fn get(
        &self,
        draft_id: &DraftId,
    ) -> impl Future<Output = Result<Option<Draft>, RepositoryError>> + Send;

    /// Delete a record. Returns whether a record existed.
    fn delete(
        &self,
        draft_id: &DraftId,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// List all drafts as lightweight summaries.
    ///
    /// Ordered by `updated_at` descending (most recently touched first).
    fn list(&self) -> impl Future<Output = Result<Vec<DraftSummary>, RepositoryError>> + Send;

    /// Keys of drafts whose `updated_at` is strictly before `cutoff`.
    fn list_updated_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<DraftId>, RepositoryError>> + Send;
}
