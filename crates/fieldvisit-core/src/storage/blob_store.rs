//! Blob tier trait.
//!
//! Attachments are addressed by `(draft_id, path)`, where `path` is the
//! attachment's location in the form tree. Implementations live in
//! fieldvisit-infra.

use fieldvisit_types::draft::DraftId;
use fieldvisit_types::error::RepositoryError;

use crate::tree::blobs::BlobMap;

/// Trait for per-draft attachment storage.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait BlobStore: Send + Sync {
    /// Upsert every attachment of `blobs`. An empty map is a no-op.
    ///
    /// `blobs` is the draft's complete attachment set, so per-draft limits
    /// are checked against the batch alone. Fails with
    /// `RepositoryError::Quota` when a size limit would be exceeded; nothing
    /// from the batch is written in that case.
    fn put_all(
        &self,
        draft_id: &DraftId,
        blobs: &BlobMap,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// All attachments stored for a draft (empty if none).
    fn get_all(
        &self,
        draft_id: &DraftId,
    ) -> impl std::future::Future<Output = Result<BlobMap, RepositoryError>> + Send;

    /// Remove every attachment of a draft. No-op if there are none.
    fn delete_all(
        &self,
        draft_id: &DraftId,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Remove attachments whose path is not in `keep`. Returns how many were
    /// removed.
    fn retain_paths(
        &self,
        draft_id: &DraftId,
        keep: &[String],
    ) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;
}
