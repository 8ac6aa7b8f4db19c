//! Directory-backed attachment uploader.
//!
//! Copies each attachment into `{root}/{farm}/{user}/` and returns a
//! `file://` URL to the copy. Used by `fvisit draft finalize` where there is
//! no remote file service to talk to.

use std::path::PathBuf;

use fieldvisit_core::storage::uploader::AttachmentUploader;
use fieldvisit_types::draft::DraftId;
use fieldvisit_types::error::UploadError;
use fieldvisit_types::form::Attachment;

pub struct DirectoryUploader {
    root: PathBuf,
}

impl DirectoryUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

/// Make a string safe to use as a single path component.
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn target_file_name(path: &str, attachment: &Attachment) -> String {
    let stem = if path.is_empty() { "root" } else { path };
    match &attachment.file_name {
        Some(name) => format!("{}__{}", sanitize(stem), sanitize(name)),
        None => format!("{}.bin", sanitize(stem)),
    }
}

impl AttachmentUploader for DirectoryUploader {
    async fn upload(
        &self,
        draft_id: &DraftId,
        path: &str,
        attachment: &Attachment,
    ) -> Result<String, UploadError> {
        let fail = |reason: String| UploadError {
            path: path.to_string(),
            reason,
        };

        let dir = self
            .root
            .join(sanitize(draft_id.farm_id()))
            .join(sanitize(draft_id.user_id()));
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| fail(format!("cannot create {}: {e}", dir.display())))?;

        let target = dir.join(target_file_name(path, attachment));
        tokio::fs::write(&target, &attachment.data)
            .await
            .map_err(|e| fail(format!("cannot write {}: {e}", target.display())))?;

        let absolute = tokio::fs::canonicalize(&target)
            .await
            .map_err(|e| fail(format!("cannot resolve {}: {e}", target.display())))?;

        tracing::debug!(
            draft_id = %draft_id,
            path,
            target = %absolute.display(),
            bytes = attachment.size_bytes(),
            "uploaded attachment to directory"
        );
        Ok(format!("file://{}", absolute.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("step3.photo"), "step3.photo");
        assert_eq!(sanitize("plots[0].image"), "plots_0_.image");
        assert_eq!(sanitize("../etc"), "_etc");
        assert_eq!(sanitize(""), "_");
    }

    #[tokio::test]
    async fn test_upload_writes_file_and_returns_url() {
        let dir = tempdir().unwrap();
        let uploader = DirectoryUploader::new(dir.path());
        let id = DraftId::new("F1", "U1").unwrap();
        let attachment = Attachment::new("image/jpeg", vec![1, 2, 3]).with_file_name("plot.jpg");

        let url = uploader.upload(&id, "step3.photo", &attachment).await.unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("F1/U1/step3.photo__plot.jpg"));

        let written = std::fs::read(dir.path().join("F1/U1/step3.photo__plot.jpg")).unwrap();
        assert_eq!(written, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_upload_without_file_name() {
        let dir = tempdir().unwrap();
        let uploader = DirectoryUploader::new(dir.path());
        let id = DraftId::new("F1", "U1").unwrap();

        let url = uploader
            .upload(&id, "plots[1].image", &Attachment::new("image/png", vec![9]))
            .await
            .unwrap();
        assert!(url.ends_with("plots_1_.image.bin"));
    }
}
