use thiserror::Error;

/// Errors from addressing a node of a form tree by path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("malformed path '{path}': {reason}")]
    Malformed { path: String, reason: String },

    #[error("cannot write '{segment}' into a non-container value at '{path}'")]
    NotAContainer { path: String, segment: String },
}

/// Errors from repository operations (used by trait definitions in fieldvisit-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("storage quota exceeded: {0}")]
    Quota(String),
}

/// Errors surfaced by draft operations.
///
/// Attachment-tier failures are not errors: they degrade to a
/// [`DraftWarning`] and the metadata save proceeds.
#[derive(Debug, Error)]
pub enum DraftError {
    #[error("invalid draft id: {0}")]
    InvalidDraftId(String),

    #[error("metadata store error: {0}")]
    MetadataStore(#[from] RepositoryError),

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// Failure reported by the external attachment upload collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("upload of '{path}' failed: {reason}")]
pub struct UploadError {
    pub path: String,
    pub reason: String,
}

/// Non-fatal conditions raised while saving or restoring a draft.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftWarning {
    #[error("{count} attachment(s) were not persisted: {reason}")]
    AttachmentsNotPersisted { count: usize, reason: String },

    #[error("stale attachments could not be pruned: {reason}")]
    AttachmentsNotPruned { reason: String },

    #[error("attachments could not be restored: {reason}")]
    AttachmentsNotRestored { reason: String },

    #[error("attachment at '{path}' could not be restored: {reason}")]
    AttachmentPathSkipped { path: String, reason: String },
}
