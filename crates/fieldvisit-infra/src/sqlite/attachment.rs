//! SQLite implementation of `BlobStore` (the attachment tier).
//!
//! Attachment payloads live in `draft_attachments`, keyed by draft and form
//! path. Each row carries a SHA-256 digest of its payload; rows whose payload
//! no longer matches are dropped on read instead of being handed back to the
//! wizard.

use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::Row;

use fieldvisit_core::storage::blob_store::BlobStore;
use fieldvisit_core::tree::blobs::BlobMap;
use fieldvisit_types::config::EngineConfig;
use fieldvisit_types::draft::DraftId;
use fieldvisit_types::error::RepositoryError;
use fieldvisit_types::form::Attachment;

use super::draft::format_datetime;
use super::pool::DatabasePool;

/// SQLite-backed attachment store with per-attachment and per-draft quotas.
pub struct SqliteBlobStore {
    pool: DatabasePool,
    max_attachment_bytes: u64,
    max_draft_bytes: u64,
}

impl SqliteBlobStore {
    pub fn new(pool: DatabasePool, config: &EngineConfig) -> Self {
        Self {
            pool,
            max_attachment_bytes: config.max_attachment_bytes,
            max_draft_bytes: config.max_draft_attachment_bytes,
        }
    }

    /// Total payload bytes stored for a draft.
    pub async fn stored_bytes(&self, draft_id: &DraftId) -> Result<u64, RepositoryError> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(size_bytes), 0) FROM draft_attachments WHERE draft_id = ?",
        )
        .bind(draft_id.to_string())
        .fetch_one(&self.pool.reader)
        .await
        .map_err(query_err)?;

        Ok(total.max(0) as u64)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

fn digest_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

// ---------------------------------------------------------------------------
// BlobStore implementation
// ---------------------------------------------------------------------------

impl BlobStore for SqliteBlobStore {
    async fn put_all(&self, draft_id: &DraftId, blobs: &BlobMap) -> Result<(), RepositoryError> {
        if blobs.is_empty() {
            return Ok(());
        }

        for (path, attachment) in blobs {
            if attachment.size_bytes() > self.max_attachment_bytes {
                return Err(RepositoryError::Quota(format!(
                    "attachment at '{path}' is {} bytes, limit is {}",
                    attachment.size_bytes(),
                    self.max_attachment_bytes
                )));
            }
        }

        // `blobs` is the draft's full attachment set; rows at other paths are
        // pruned by the caller once the metadata is saved.
        let projected: u64 = blobs.values().map(Attachment::size_bytes).sum();
        if projected > self.max_draft_bytes {
            return Err(RepositoryError::Quota(format!(
                "draft {draft_id} would hold {projected} attachment bytes, limit is {}",
                self.max_draft_bytes
            )));
        }

        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;
        let now = format_datetime(&Utc::now());
        for (path, attachment) in blobs {
            sqlx::query(
                r#"INSERT INTO draft_attachments
                       (draft_id, path, content_type, file_name, data, size_bytes, sha256, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (draft_id, path) DO UPDATE SET
                       content_type = excluded.content_type,
                       file_name = excluded.file_name,
                       data = excluded.data,
                       size_bytes = excluded.size_bytes,
                       sha256 = excluded.sha256,
                       updated_at = excluded.updated_at"#,
            )
            .bind(draft_id.to_string())
            .bind(path)
            .bind(&attachment.content_type)
            .bind(&attachment.file_name)
            .bind(&attachment.data)
            .bind(attachment.size_bytes() as i64)
            .bind(digest_hex(&attachment.data))
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        }

        tx.commit().await.map_err(query_err)?;

        tracing::debug!(draft_id = %draft_id, count = blobs.len(), projected, "stored attachments");
        Ok(())
    }

    async fn get_all(&self, draft_id: &DraftId) -> Result<BlobMap, RepositoryError> {
        let rows = sqlx::query(
            "SELECT path, content_type, file_name, data, sha256 FROM draft_attachments WHERE draft_id = ?",
        )
        .bind(draft_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut blobs = BlobMap::new();
        for row in &rows {
            let path: String = row.try_get("path").map_err(query_err)?;
            let content_type: String = row.try_get("content_type").map_err(query_err)?;
            let file_name: Option<String> = row.try_get("file_name").map_err(query_err)?;
            let data: Vec<u8> = row.try_get("data").map_err(query_err)?;
            let expected: String = row.try_get("sha256").map_err(query_err)?;

            if digest_hex(&data) != expected {
                tracing::warn!(
                    draft_id = %draft_id,
                    path = path.as_str(),
                    "attachment payload failed its integrity check, dropping it"
                );
                continue;
            }

            blobs.insert(
                path,
                Attachment {
                    content_type,
                    file_name,
                    data,
                },
            );
        }

        Ok(blobs)
    }

    async fn delete_all(&self, draft_id: &DraftId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM draft_attachments WHERE draft_id = ?")
            .bind(draft_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(())
    }

    async fn retain_paths(
        &self,
        draft_id: &DraftId,
        keep: &[String],
    ) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        let rows = sqlx::query("SELECT path FROM draft_attachments WHERE draft_id = ?")
            .bind(draft_id.to_string())
            .fetch_all(&mut *tx)
            .await
            .map_err(query_err)?;

        let mut removed = 0;
        for row in &rows {
            let path: String = row.try_get("path").map_err(query_err)?;
            if keep.contains(&path) {
                continue;
            }
            sqlx::query("DELETE FROM draft_attachments WHERE draft_id = ? AND path = ?")
                .bind(draft_id.to_string())
                .bind(&path)
                .execute(&mut *tx)
                .await
                .map_err(query_err)?;
            removed += 1;
        }

        tx.commit().await.map_err(query_err)?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open_in(dir.path()).await.unwrap();
        std::mem::forget(dir);
        pool
    }

    async fn test_store() -> SqliteBlobStore {
        SqliteBlobStore::new(test_pool().await, &EngineConfig::default())
    }

    fn draft_id() -> DraftId {
        DraftId::new("F1", "U1").unwrap()
    }

    fn blob_map(entries: &[(&str, usize)]) -> BlobMap {
        entries
            .iter()
            .map(|(path, len)| {
                (
                    path.to_string(),
                    Attachment::new("image/jpeg", vec![7u8; *len]).with_file_name("p.jpg"),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_put_and_get_all() {
        let store = test_store().await;
        let blobs = blob_map(&[("step3.photo", 16), ("plots[0].image", 4)]);

        store.put_all(&draft_id(), &blobs).await.unwrap();
        let loaded = store.get_all(&draft_id()).await.unwrap();
        assert_eq!(loaded, blobs);
        assert_eq!(store.stored_bytes(&draft_id()).await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_put_all_overwrites_same_path() {
        let store = test_store().await;
        store.put_all(&draft_id(), &blob_map(&[("photo", 16)])).await.unwrap();
        store.put_all(&draft_id(), &blob_map(&[("photo", 2)])).await.unwrap();

        let loaded = store.get_all(&draft_id()).await.unwrap();
        assert_eq!(loaded["photo"].data.len(), 2);
        assert_eq!(store.stored_bytes(&draft_id()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_get_all_for_unknown_draft_is_empty() {
        let store = test_store().await;
        assert!(store.get_all(&draft_id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_attachment_quota() {
        let config = EngineConfig {
            max_attachment_bytes: 8,
            ..EngineConfig::default()
        };
        let store = SqliteBlobStore::new(test_pool().await, &config);

        let err = store
            .put_all(&draft_id(), &blob_map(&[("a", 4), ("b", 9)]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Quota(_)));
        assert!(store.get_all(&draft_id()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_per_draft_quota_applies_to_batch() {
        let config = EngineConfig {
            max_draft_attachment_bytes: 10,
            ..EngineConfig::default()
        };
        let store = SqliteBlobStore::new(test_pool().await, &config);

        let err = store
            .put_all(&draft_id(), &blob_map(&[("a", 6), ("b", 6)]))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Quota(_)));
        assert!(store.get_all(&draft_id()).await.unwrap().is_empty());

        store.put_all(&draft_id(), &blob_map(&[("a", 10)])).await.unwrap();
        assert_eq!(store.stored_bytes(&draft_id()).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_per_draft_quota_ignores_rows_outside_batch() {
        let config = EngineConfig {
            max_draft_attachment_bytes: 10,
            ..EngineConfig::default()
        };
        let store = SqliteBlobStore::new(test_pool().await, &config);

        store.put_all(&draft_id(), &blob_map(&[("a", 6)])).await.unwrap();
        store.put_all(&draft_id(), &blob_map(&[("b", 6)])).await.unwrap();

        store
            .retain_paths(&draft_id(), &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(store.stored_bytes(&draft_id()).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_tampered_payload_is_dropped() {
        let pool = test_pool().await;
        let store = SqliteBlobStore::new(pool.clone(), &EngineConfig::default());
        store
            .put_all(&draft_id(), &blob_map(&[("a", 4), ("b", 4)]))
            .await
            .unwrap();

        sqlx::query("UPDATE draft_attachments SET data = X'00' WHERE path = 'a'")
            .execute(&pool.writer)
            .await
            .unwrap();

        let loaded = store.get_all(&draft_id()).await.unwrap();
        assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_delete_all_and_retain_paths() {
        let store = test_store().await;
        let other = DraftId::new("F2", "U1").unwrap();
        store
            .put_all(&draft_id(), &blob_map(&[("a", 1), ("b", 1), ("c", 1)]))
            .await
            .unwrap();
        store.put_all(&other, &blob_map(&[("a", 1)])).await.unwrap();

        let removed = store
            .retain_paths(&draft_id(), &["b".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(
            store.get_all(&draft_id()).await.unwrap().keys().collect::<Vec<_>>(),
            vec!["b"]
        );

        store.delete_all(&draft_id()).await.unwrap();
        assert!(store.get_all(&draft_id()).await.unwrap().is_empty());
        assert_eq!(store.get_all(&other).await.unwrap().len(), 1);
    }
}
