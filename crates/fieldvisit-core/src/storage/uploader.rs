//! External attachment upload collaborator.
//!
//! Before final submission every attachment still in the tree is handed to
//! an uploader, which returns a durable reference (typically a URL) that
//! replaces the raw payload in the draft.

use fieldvisit_types::draft::DraftId;
use fieldvisit_types::error::UploadError;
use fieldvisit_types::form::Attachment;

pub trait AttachmentUploader: Send + Sync {
    /// Upload one attachment found at `path` and return its durable reference.
    fn upload(
        &self,
        draft_id: &DraftId,
        path: &str,
        attachment: &Attachment,
    ) -> impl std::future::Future<Output = Result<String, UploadError>> + Send;
}
