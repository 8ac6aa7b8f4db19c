//! Engine configuration loader.
//!
//! Reads `config.toml` from the data directory (`~/.fieldvisit/` in
//! production) into [`EngineConfig`]. A missing or malformed file falls back
//! to defaults so the wizard can always save.

use std::path::Path;

use fieldvisit_types::config::EngineConfig;

/// Config file name inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Shortest expiry accepted from config or an operator override.
const MIN_DRAFT_MAX_AGE_DAYS: u32 = 1;

/// Load engine configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`EngineConfig::default()`].
/// - Unreadable or unparsable file: logs a warning, returns the default.
pub async fn load_engine_config(data_dir: &Path) -> EngineConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return EngineConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return EngineConfig::default();
        }
    };

    match toml::from_str::<EngineConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!("Failed to parse {}: {err}, using defaults", config_path.display());
            EngineConfig::default()
        }
    }
}

/// Resolve the draft expiry age for a sweep.
///
/// An explicit override wins over `draft_max_age_days`; either way at least
/// one day is enforced so a sweep never deletes drafts saved today.
pub fn resolve_max_age_days(config: &EngineConfig, override_days: Option<u32>) -> u32 {
    override_days
        .unwrap_or(config.draft_max_age_days)
        .max(MIN_DRAFT_MAX_AGE_DAYS)
}
