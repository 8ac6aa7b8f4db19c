//! Engine configuration types.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls
//! autosave timing, draft expiry, completeness scoring, and attachment quotas.

use serde::{Deserialize, Serialize};

/// Top-level configuration for the draft engine.
///
/// Loaded from `~/.fieldvisit/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Quiescence window for coalescing autosaves, in milliseconds.
    #[serde(default = "default_autosave_quiescence_ms")]
    pub autosave_quiescence_ms: u64,

    /// Drafts untouched for longer than this are swept at hydration.
    #[serde(default = "default_draft_max_age_days")]
    pub draft_max_age_days: u32,

    /// Depth ceiling for the completeness estimator.
    #[serde(default = "default_completeness_max_depth")]
    pub completeness_max_depth: usize,

    /// Largest single attachment the blob tier accepts.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,

    /// Largest total attachment payload per draft.
    #[serde(default = "default_max_draft_attachment_bytes")]
    pub max_draft_attachment_bytes: u64,
}

fn default_autosave_quiescence_ms() -> u64 {
    400
}

fn default_draft_max_age_days() -> u32 {
    30
}

fn default_completeness_max_depth() -> usize {
    3
}

fn default_max_attachment_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_max_draft_attachment_bytes() -> u64 {
    50 * 1024 * 1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            autosave_quiescence_ms: default_autosave_quiescence_ms(),
            draft_max_age_days: default_draft_max_age_days(),
            completeness_max_depth: default_completeness_max_depth(),
            max_attachment_bytes: default_max_attachment_bytes(),
            max_draft_attachment_bytes: default_max_draft_attachment_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.autosave_quiescence_ms, 400);
        assert_eq!(config.draft_max_age_days, 30);
        assert_eq!(config.completeness_max_depth, 3);
        assert_eq!(config.max_attachment_bytes, 10_485_760);
        assert_eq!(config.max_draft_attachment_bytes, 52_428_800);
    }

    #[test]
    fn test_engine_config_deserialize_with_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_engine_config_deserialize_with_values() {
        let toml_str = r#"
autosave_quiescence_ms = 300
draft_max_age_days = 7
max_attachment_bytes = 1024
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.autosave_quiescence_ms, 300);
        assert_eq!(config.draft_max_age_days, 7);
        assert_eq!(config.max_attachment_bytes, 1024);
        assert_eq!(config.completeness_max_depth, 3);
    }
}
