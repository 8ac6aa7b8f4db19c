//! Form tree value model.
//!
//! A wizard session produces a dynamically-shaped answer tree. `FormValue`
//! is the tagged representation of that tree: JSON-shaped containers and
//! scalars, plus an `Attachment` variant for binary leaves (photos, scanned
//! documents) that must never be merged field-by-field or written to the
//! metadata tier.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key under which an attachment is wrapped in the JSON interchange form:
/// `{"$attachment": {"contentType": "...", "data": "<base64>"}}`.
pub const ATTACHMENT_MARKER: &str = "$attachment";

/// Object node of a form tree. Keys are kept sorted for stable output.
pub type FormMap = BTreeMap<String, FormValue>;

/// A node of a form tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FormValue {
    /// Explicit null, array holes, and the placeholder left behind when an
    /// attachment is externalized.
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Array(Vec<FormValue>),
    Object(FormMap),
    Attachment(Attachment),
}

impl FormValue {
    /// An empty object node.
    pub fn object() -> Self {
        FormValue::Object(FormMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FormValue::Null)
    }

    pub fn is_attachment(&self) -> bool {
        matches!(self, FormValue::Attachment(_))
    }

    pub fn as_object(&self) -> Option<&FormMap> {
        match self {
            FormValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut FormMap> {
        match self {
            FormValue::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<FormValue>> {
        match self {
            FormValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FormValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_attachment(&self) -> Option<&Attachment> {
        match self {
            FormValue::Attachment(attachment) => Some(attachment),
            _ => None,
        }
    }

    /// Look up a direct child of an object node.
    pub fn get(&self, key: &str) -> Option<&FormValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Convert to a plain JSON value. Attachments are wrapped under
    /// [`ATTACHMENT_MARKER`] with their payload base64-encoded.
    pub fn to_json(&self) -> serde_json::Value {
        // Serializing a FormValue into serde_json::Value cannot fail: every
        // map key is a string and every number is already a JSON number.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<serde_json::Value> for FormValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FormValue::Null,
            serde_json::Value::Bool(b) => FormValue::Bool(b),
            serde_json::Value::Number(n) => FormValue::Number(n),
            serde_json::Value::String(s) => FormValue::String(s),
            serde_json::Value::Array(items) => {
                FormValue::Array(items.into_iter().map(FormValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(inner) = map.get(ATTACHMENT_MARKER) {
                        if let Ok(attachment) = serde_json::from_value::<Attachment>(inner.clone())
                        {
                            return FormValue::Attachment(attachment);
                        }
                    }
                }
                FormValue::Object(
                    map.into_iter()
                        .map(|(k, v)| (k, FormValue::from(v)))
                        .collect(),
                )
            }
        }
    }
}

impl From<Attachment> for FormValue {
    fn from(attachment: Attachment) -> Self {
        FormValue::Attachment(attachment)
    }
}

impl From<&str> for FormValue {
    fn from(s: &str) -> Self {
        FormValue::String(s.to_string())
    }
}

impl From<String> for FormValue {
    fn from(s: String) -> Self {
        FormValue::String(s)
    }
}

impl From<bool> for FormValue {
    fn from(b: bool) -> Self {
        FormValue::Bool(b)
    }
}

impl From<i64> for FormValue {
    fn from(n: i64) -> Self {
        FormValue::Number(n.into())
    }
}

impl Serialize for FormValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FormValue::Null => serializer.serialize_unit(),
            FormValue::Bool(b) => serializer.serialize_bool(*b),
            FormValue::Number(n) => n.serialize(serializer),
            FormValue::String(s) => serializer.serialize_str(s),
            FormValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FormValue::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            FormValue::Attachment(attachment) => {
                let mut out = serializer.serialize_map(Some(1))?;
                out.serialize_entry(ATTACHMENT_MARKER, attachment)?;
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for FormValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(FormValue::from(value))
    }
}

/// A binary leaf of a form tree (photo, signed document, soil report scan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Attachment {
    /// MIME type of the payload (e.g., "image/jpeg").
    pub content_type: String,
    /// Original file name, when the capture surface provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Raw payload bytes (base64 in the JSON interchange form).
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            file_name: None,
            data,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
