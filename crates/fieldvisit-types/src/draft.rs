//! Draft types for the field-visit engine.
//!
//! A `Draft` is the persisted snapshot of one in-progress wizard session.
//! There is at most one live draft per `(farm, user)` pair; saving again
//! overwrites it in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt;
use std::str::FromStr;

use crate::error::{DraftError, DraftWarning};
use crate::form::FormValue;

/// Current shape version of persisted draft records.
pub const DRAFT_SCHEMA_VERSION: u32 = 1;

/// Separator between the farm and user parts of a serialized `DraftId`.
pub const DRAFT_ID_SEPARATOR: &str = "::";

/// Composite draft key: one draft per farm per user.
///
/// Serialized as `"{farm_id}::{user_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DraftId {
    farm_id: String,
    user_id: String,
}

impl DraftId {
    /// Build a draft key, rejecting empty parts and farm ids that would make
    /// the serialized form ambiguous.
    pub fn new(farm_id: impl Into<String>, user_id: impl Into<String>) -> Result<Self, DraftError> {
        let farm_id = farm_id.into().trim().to_string();
        let user_id = user_id.into().trim().to_string();

        if farm_id.is_empty() || user_id.is_empty() {
            return Err(DraftError::InvalidDraftId(
                "farm id and user id must not be empty".to_string(),
            ));
        }
        if farm_id.contains(DRAFT_ID_SEPARATOR) {
            return Err(DraftError::InvalidDraftId(format!(
                "farm id '{farm_id}' must not contain '{DRAFT_ID_SEPARATOR}'"
            )));
        }

        Ok(Self { farm_id, user_id })
    }

    pub fn farm_id(&self) -> &str {
        &self.farm_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DRAFT_ID_SEPARATOR}{}", self.farm_id, self.user_id)
    }
}

impl FromStr for DraftId {
    type Err = DraftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (farm_id, user_id) = s.split_once(DRAFT_ID_SEPARATOR).ok_or_else(|| {
            DraftError::InvalidDraftId(format!("'{s}' is missing '{DRAFT_ID_SEPARATOR}'"))
        })?;
        DraftId::new(farm_id, user_id)
    }
}

impl Serialize for DraftId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DraftId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Which wizard produced the draft.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftKind {
    /// The 9-step diagnostic wizard.
    #[default]
    Diagnostic,
    /// A plain field-visit log.
    FieldVisit,
}

impl fmt::Display for DraftKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DraftKind::Diagnostic => write!(f, "diagnostic"),
            DraftKind::FieldVisit => write!(f, "field_visit"),
        }
    }
}

impl FromStr for DraftKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "diagnostic" => Ok(DraftKind::Diagnostic),
            "field_visit" => Ok(DraftKind::FieldVisit),
            other => Err(format!("invalid draft kind: '{other}'")),
        }
    }
}

/// The persisted snapshot of one wizard session.
///
/// In the metadata tier `form_tree` never holds attachment leaves; they are
/// `Null` placeholders until restored from the blob tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Draft {
    pub draft_id: DraftId,
    pub farm_id: String,
    pub user_id: String,
    pub kind: DraftKind,
    /// Wizard step the user was on at the last save.
    pub current_step: u32,
    pub form_tree: FormValue,
    pub has_attachments: bool,
    pub attachment_count: u32,
    /// Estimated completion, 0-100.
    pub completeness: u8,
    pub schema_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lightweight summary of a draft for listing.
///
/// Built without touching the blob tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftSummary {
    pub draft_id: DraftId,
    pub kind: DraftKind,
    pub current_step: u32,
    pub completeness: u8,
    pub attachment_count: u32,
    pub updated_at: DateTime<Utc>,
}

impl From<&Draft> for DraftSummary {
    fn from(draft: &Draft) -> Self {
        Self {
            draft_id: draft.draft_id.clone(),
            kind: draft.kind,
            current_step: draft.current_step,
            completeness: draft.completeness,
            attachment_count: draft.attachment_count,
            updated_at: draft.updated_at,
        }
    }
}

/// Full-tree save request.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveDraftRequest {
    pub form_tree: FormValue,
    pub current_step: u32,
    pub kind: DraftKind,
}

/// Partial update merged into the stored tree.
///
/// `current_step` and `kind` fall back to the stored record when `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DraftPatch {
    pub form: FormValue,
    pub current_step: Option<u32>,
    pub kind: Option<DraftKind>,
}

impl DraftPatch {
    /// A patch that only touches form content.
    pub fn form(form: FormValue) -> Self {
        Self {
            form,
            current_step: None,
            kind: None,
        }
    }

    pub fn with_step(mut self, step: u32) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn with_kind(mut self, kind: DraftKind) -> Self {
        self.kind = Some(kind);
        self
    }
}

/// Result of a save: the stored record (with its full in-memory tree) plus
/// any attachment-tier warnings the caller should surface.
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub draft: Draft,
    pub warnings: Vec<DraftWarning>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draft_id_display_and_parse() {
        let id = DraftId::new("F1", "U1").unwrap();
        assert_eq!(id.to_string(), "F1::U1");
        let parsed: DraftId = "F1::U1".parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_draft_id_user_may_contain_separator() {
        let parsed: DraftId = "farm::user::x".parse().unwrap();
        assert_eq!(parsed.farm_id(), "farm");
        assert_eq!(parsed.user_id(), "user::x");
    }

    #[test]
    fn test_draft_id_rejects_invalid() {
        assert!(DraftId::new("", "U1").is_err());
        assert!(DraftId::new("F1", "  ").is_err());
        assert!(DraftId::new("F::1", "U1").is_err());
        assert!("no-separator".parse::<DraftId>().is_err());
    }

    #[test]
    fn test_draft_id_serializes_as_string() {
        let id = DraftId::new("F1", "U1").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"F1::U1\"");
        let back: DraftId = serde_json::from_str("\"F1::U1\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_draft_kind_display_and_parse() {
        assert_eq!(DraftKind::FieldVisit.to_string(), "field_visit");
        assert_eq!("field-visit".parse::<DraftKind>(), Ok(DraftKind::FieldVisit));
        assert_eq!("Diagnostic".parse::<DraftKind>(), Ok(DraftKind::Diagnostic));
        assert!("survey".parse::<DraftKind>().is_err());
        assert_eq!(DraftKind::default(), DraftKind::Diagnostic);
    }

    #[test]
    fn test_draft_patch_builders() {
        let patch = DraftPatch::form(FormValue::object())
            .with_step(3)
            .with_kind(DraftKind::FieldVisit);
        assert_eq!(patch.current_step, Some(3));
        assert_eq!(patch.kind, Some(DraftKind::FieldVisit));
    }
}
