//! SQLite implementation of `DraftRepository` (the metadata tier).
//!
//! One row per draft in `drafts`. The clean form tree is stored as JSON text;
//! scalar metadata columns back listing and the expiry sweep without
//! decoding the tree.

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::Row;

use fieldvisit_core::repository::draft::DraftRepository;
use fieldvisit_types::draft::{DRAFT_SCHEMA_VERSION, Draft, DraftId, DraftKind, DraftSummary};
use fieldvisit_types::error::RepositoryError;
use fieldvisit_types::form::FormValue;

use super::pool::DatabasePool;

/// SQLite-backed draft metadata store.
pub struct SqliteDraftRepository {
    pool: DatabasePool,
}

impl SqliteDraftRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row type for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct DraftRow {
    draft_id: String,
    farm_id: String,
    user_id: String,
    kind: String,
    current_step: i64,
    form_tree: String,
    has_attachments: bool,
    attachment_count: i64,
    completeness: i64,
    schema_version: i64,
    created_at: String,
    updated_at: String,
}

impl DraftRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            draft_id: row.try_get("draft_id")?,
            farm_id: row.try_get("farm_id")?,
            user_id: row.try_get("user_id")?,
            kind: row.try_get("kind")?,
            current_step: row.try_get("current_step")?,
            form_tree: row.try_get("form_tree")?,
            has_attachments: row.try_get("has_attachments")?,
            attachment_count: row.try_get("attachment_count")?,
            completeness: row.try_get("completeness")?,
            schema_version: row.try_get("schema_version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Decode into a domain draft. Anything that does not decode is
    /// reported as `Corrupt` so the service can fall back to an empty tree.
    fn into_draft(self) -> Result<Draft, RepositoryError> {
        let draft_id: DraftId = self
            .draft_id
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("invalid draft_id: {e}")))?;

        if self.schema_version > i64::from(DRAFT_SCHEMA_VERSION) {
            return Err(RepositoryError::Corrupt(format!(
                "draft {draft_id} has unsupported schema version {}",
                self.schema_version
            )));
        }

        let kind: DraftKind = self.kind.parse().map_err(RepositoryError::Corrupt)?;

        let tree: serde_json::Value = serde_json::from_str(&self.form_tree)
            .map_err(|e| RepositoryError::Corrupt(format!("invalid form tree JSON: {e}")))?;

        Ok(Draft {
            draft_id,
            farm_id: self.farm_id,
            user_id: self.user_id,
            kind,
            current_step: to_u32(self.current_step, "current_step")?,
            form_tree: FormValue::from(tree),
            has_attachments: self.has_attachments,
            attachment_count: to_u32(self.attachment_count, "attachment_count")?,
            completeness: self.completeness.clamp(0, 100) as u8,
            schema_version: DRAFT_SCHEMA_VERSION,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Corrupt(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC 3339 so that string comparison in SQL orders by time.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn to_u32(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Corrupt(format!("{column} out of range: {value}")))
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

// ---------------------------------------------------------------------------
// DraftRepository implementation
// ---------------------------------------------------------------------------

impl DraftRepository for SqliteDraftRepository {
    async fn upsert(&self, draft: &Draft) -> Result<DateTime<Utc>, RepositoryError> {
        let form_tree = serde_json::to_string(&draft.form_tree)
            .map_err(|e| RepositoryError::Query(format!("failed to serialize form tree: {e}")))?;

        let row = sqlx::query(
            r#"INSERT INTO drafts (draft_id, farm_id, user_id, kind, current_step, form_tree,
                                   has_attachments, attachment_count, completeness, schema_version,
                                   created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (draft_id) DO UPDATE SET
                   kind = excluded.kind,
                   current_step = excluded.current_step,
                   form_tree = excluded.form_tree,
                   has_attachments = excluded.has_attachments,
                   attachment_count = excluded.attachment_count,
                   completeness = excluded.completeness,
                   schema_version = excluded.schema_version,
                   updated_at = excluded.updated_at
               RETURNING created_at"#,
        )
        .bind(draft.draft_id.to_string())
        .bind(&draft.farm_id)
        .bind(&draft.user_id)
        .bind(draft.kind.to_string())
        .bind(i64::from(draft.current_step))
        .bind(&form_tree)
        .bind(draft.has_attachments)
        .bind(i64::from(draft.attachment_count))
        .bind(i64::from(draft.completeness))
        .bind(i64::from(draft.schema_version))
        .bind(format_datetime(&draft.created_at))
        .bind(format_datetime(&draft.updated_at))
        .fetch_one(&self.pool.writer)
        .await
        .map_err(query_err)?;

        let created_at: String = row.try_get("created_at").map_err(query_err)?;
        parse_datetime(&created_at)
    }

    async fn get(&self, draft_id: &DraftId) -> Result<Option<Draft>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM drafts WHERE draft_id = ?")
            .bind(draft_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        match row {
            Some(row) => {
                let draft_row = DraftRow::from_row(&row)
                    .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
                Ok(Some(draft_row.into_draft()?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, draft_id: &DraftId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM drafts WHERE draft_id = ?")
            .bind(draft_id.to_string())
            .execute(&self.pool.writer)
            .await
            .map_err(query_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<DraftSummary>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT draft_id, kind, current_step, completeness, attachment_count, updated_at
             FROM drafts ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let draft_id: String = row.try_get("draft_id").map_err(query_err)?;
            let kind: String = row.try_get("kind").map_err(query_err)?;
            let current_step: i64 = row.try_get("current_step").map_err(query_err)?;
            let completeness: i64 = row.try_get("completeness").map_err(query_err)?;
            let attachment_count: i64 = row.try_get("attachment_count").map_err(query_err)?;
            let updated_at: String = row.try_get("updated_at").map_err(query_err)?;

            // Undecodable rows are left out of listings rather than failing them.
            let (Ok(draft_id), Ok(kind)) = (draft_id.parse::<DraftId>(), kind.parse::<DraftKind>())
            else {
                tracing::warn!(draft_id = draft_id.as_str(), "skipping undecodable draft row");
                continue;
            };

            summaries.push(DraftSummary {
                draft_id,
                kind,
                current_step: to_u32(current_step, "current_step")?,
                completeness: completeness.clamp(0, 100) as u8,
                attachment_count: to_u32(attachment_count, "attachment_count")?,
                updated_at: parse_datetime(&updated_at)?,
            });
        }

        Ok(summaries)
    }

    async fn list_updated_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<DraftId>, RepositoryError> {
        let rows = sqlx::query("SELECT draft_id FROM drafts WHERE updated_at < ? ORDER BY updated_at")
            .bind(format_datetime(&cutoff))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in &rows {
            let raw: String = row.try_get("draft_id").map_err(query_err)?;
            match raw.parse::<DraftId>() {
                Ok(id) => ids.push(id),
                Err(e) => tracing::warn!(draft_id = raw.as_str(), error = %e, "skipping undecodable draft id"),
            }
        }

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use serde_json::json;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::open_in(dir.path()).await.unwrap();
        std::mem::forget(dir);
        pool
    }

    fn make_draft(farm: &str, user: &str, at: DateTime<Utc>) -> Draft {
        let draft_id = DraftId::new(farm, user).unwrap();
        Draft {
            farm_id: draft_id.farm_id().to_string(),
            user_id: draft_id.user_id().to_string(),
            draft_id,
            kind: DraftKind::FieldVisit,
            current_step: 2,
            form_tree: FormValue::from(json!({"step1": {"name": "Finca X", "photo": null}})),
            has_attachments: true,
            attachment_count: 1,
            completeness: 50,
            schema_version: DRAFT_SCHEMA_VERSION,
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let repo = SqliteDraftRepository::new(test_pool().await);
        let draft = make_draft("F1", "U1", Utc::now());

        let created_at = repo.upsert(&draft).await.unwrap();
        assert_eq!(created_at, draft.created_at);

        let loaded = repo.get(&draft.draft_id).await.unwrap().unwrap();
        assert_eq!(loaded, draft);
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let repo = SqliteDraftRepository::new(test_pool().await);
        let first = make_draft("F1", "U1", Utc::now());
        repo.upsert(&first).await.unwrap();

        let mut second = make_draft("F1", "U1", first.created_at + TimeDelta::minutes(3));
        second.current_step = 5;
        let created_at = repo.upsert(&second).await.unwrap();
        assert_eq!(created_at, first.created_at);

        let loaded = repo.get(&first.draft_id).await.unwrap().unwrap();
        assert_eq!(loaded.created_at, first.created_at);
        assert_eq!(loaded.updated_at, second.updated_at);
        assert_eq!(loaded.current_step, 5);
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let repo = SqliteDraftRepository::new(test_pool().await);
        let id = DraftId::new("F1", "nobody").unwrap();
        assert!(repo.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_tree_is_reported() {
        let pool = test_pool().await;
        let repo = SqliteDraftRepository::new(pool.clone());
        let draft = make_draft("F1", "U1", Utc::now());
        repo.upsert(&draft).await.unwrap();

        sqlx::query("UPDATE drafts SET form_tree = '{not json' WHERE draft_id = ?")
            .bind(draft.draft_id.to_string())
            .execute(&pool.writer)
            .await
            .unwrap();

        let err = repo.get(&draft.draft_id).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_future_schema_version_is_corrupt() {
        let pool = test_pool().await;
        let repo = SqliteDraftRepository::new(pool.clone());
        let draft = make_draft("F1", "U1", Utc::now());
        repo.upsert(&draft).await.unwrap();

        sqlx::query("UPDATE drafts SET schema_version = 99")
            .execute(&pool.writer)
            .await
            .unwrap();

        assert!(matches!(
            repo.get(&draft.draft_id).await,
            Err(RepositoryError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = SqliteDraftRepository::new(test_pool().await);
        let draft = make_draft("F1", "U1", Utc::now());
        repo.upsert(&draft).await.unwrap();

        assert!(repo.delete(&draft.draft_id).await.unwrap());
        assert!(!repo.delete(&draft.draft_id).await.unwrap());
        assert!(repo.get(&draft.draft_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_orders_by_updated_at_desc() {
        let repo = SqliteDraftRepository::new(test_pool().await);
        let base = Utc::now();
        let older = make_draft("F1", "U1", base);
        let newer = make_draft("F2", "U1", base + TimeDelta::milliseconds(1));
        repo.upsert(&older).await.unwrap();
        repo.upsert(&newer).await.unwrap();

        let summaries = repo.list().await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].draft_id, newer.draft_id);
        assert_eq!(summaries[0].kind, DraftKind::FieldVisit);
        assert_eq!(summaries[0].completeness, 50);
        assert_eq!(summaries[1].draft_id, older.draft_id);
    }

    #[tokio::test]
    async fn test_list_updated_before() {
        let repo = SqliteDraftRepository::new(test_pool().await);
        let now = Utc::now();
        let stale = make_draft("F1", "U1", now - TimeDelta::days(31));
        let fresh = make_draft("F2", "U1", now - TimeDelta::days(1));
        repo.upsert(&stale).await.unwrap();
        repo.upsert(&fresh).await.unwrap();

        let expired = repo
            .list_updated_before(now - TimeDelta::days(30))
            .await
            .unwrap();
        assert_eq!(expired, vec![stale.draft_id]);
    }

    #[test]
    fn test_format_datetime_is_fixed_width() {
        let a = DateTime::parse_from_rfc3339("2024-03-01T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let b = a + TimeDelta::milliseconds(500);
        assert_eq!(format_datetime(&a).len(), format_datetime(&b).len());
        assert!(format_datetime(&a) < format_datetime(&b));
    }
}
