//! Application state wiring the engine together.
//!
//! `DraftService` is generic over its storage ports; AppState pins it to the
//! SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use fieldvisit_core::service::draft::DraftService;
use fieldvisit_infra::config::load_engine_config;
use fieldvisit_infra::filesystem::resolve_data_dir;
use fieldvisit_infra::sqlite::attachment::SqliteBlobStore;
use fieldvisit_infra::sqlite::draft::SqliteDraftRepository;
use fieldvisit_infra::sqlite::pool::DatabasePool;
use fieldvisit_types::config::EngineConfig;

/// Draft service pinned to the SQLite tiers and the system clock.
pub type ConcreteDraftService = DraftService<SqliteDraftRepository, SqliteBlobStore>;

#[derive(Clone)]
pub struct AppState {
    pub draft_service: Arc<ConcreteDraftService>,
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
    /// Drafts removed by the expiry sweep during startup.
    pub swept_on_start: usize,
}

impl AppState {
    /// Resolve the data dir, load config, open the database and hydrate the
    /// draft store (which sweeps expired drafts).
    pub async fn init(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.unwrap_or_else(resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_engine_config(&data_dir).await;
        let db_pool = DatabasePool::open_in(&data_dir).await?;

        let draft_service = DraftService::new(
            SqliteDraftRepository::new(db_pool.clone()),
            SqliteBlobStore::new(db_pool.clone(), &config),
            config.clone(),
        );
        let swept_on_start = draft_service.hydrate().await?;

        tracing::debug!(
            data_dir = %data_dir.display(),
            swept_on_start,
            "initialized draft store"
        );

        Ok(Self {
            draft_service: Arc::new(draft_service),
            config,
            data_dir,
            db_pool,
            swept_on_start,
        })
    }
}
