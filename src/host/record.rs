//! Project records as the host sees them.

use crate::error::{BridgeError, Result};
use crate::host::lock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::{Arc, Mutex};

/// Server-assigned project identity. Opaque; accepts numeric or string ids.
///
/// Serializes back in the form it arrived in. Equality compares the textual
/// form, so `7` and `"7"` name the same project.
#[derive(Debug, Clone)]
pub struct ProjectId {
    raw: String,
    numeric: bool,
}

impl ProjectId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            numeric: false,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for ProjectId {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for ProjectId {}

impl std::hash::Hash for ProjectId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl From<u64> for ProjectId {
    fn from(raw: u64) -> Self {
        Self {
            raw: raw.to_string(),
            numeric: true,
        }
    }
}

impl From<&str> for ProjectId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for ProjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.raw.parse::<u64>() {
            Ok(n) if self.numeric => serializer.serialize_u64(n),
            _ => serializer.serialize_str(&self.raw),
        }
    }
}

impl<'de> Deserialize<'de> for ProjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Self::from(n)),
            Raw::Text(s) if !s.trim().is_empty() => Ok(Self::new(s)),
            Raw::Text(_) => Err(serde::de::Error::custom("project id cannot be empty")),
        }
    }
}

/// A project as stored by the backend and edited in the embedded editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ProjectId>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub document: serde_json::Value,
    #[serde(
        default,
        with = "thumbnail_base64",
        skip_serializing_if = "Option::is_none"
    )]
    pub cover_thumbnail: Option<Vec<u8>>,
}

impl ProjectRecord {
    /// An unsaved project with no document yet.
    #[must_use]
    pub fn blank(title: &str) -> Self {
        Self {
            title: title.to_owned(),
            ..Self::default()
        }
    }
}

/// Check that a document is structured and not still serialized text.
///
/// # Errors
///
/// [`BridgeError::DocumentSerialized`] when the document is a string, and
/// [`BridgeError::MalformedPayload`] for any other non-object value.
pub fn ensure_structured(document: &serde_json::Value) -> Result<()> {
    match document {
        serde_json::Value::Object(_) => Ok(()),
        serde_json::Value::String(_) => Err(BridgeError::DocumentSerialized),
        other => Err(BridgeError::MalformedPayload(format!(
            "project document must be a JSON object, got {}",
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Partial update for project settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl ProjectPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.is_public.is_none()
    }

    /// Apply to a record. Returns whether anything changed.
    pub fn apply_to(&self, record: &mut ProjectRecord) -> bool {
        let mut changed = false;
        if let Some(title) = self.title.as_ref().filter(|t| **t != record.title) {
            record.title.clone_from(title);
            changed = true;
        }
        if let Some(description) = self
            .description
            .as_ref()
            .filter(|d| **d != record.description)
        {
            record.description.clone_from(description);
            changed = true;
        }
        if let Some(is_public) = self.is_public.filter(|p| *p != record.is_public) {
            record.is_public = is_public;
            changed = true;
        }
        changed
    }
}

/// The host's in-memory project record, shared between components.
#[derive(Debug, Clone, Default)]
pub struct RecordCell {
    inner: Arc<Mutex<ProjectRecord>>,
}

impl RecordCell {
    #[must_use]
    pub fn new(record: ProjectRecord) -> Self {
        Self {
            inner: Arc::new(Mutex::new(record)),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> ProjectRecord {
        lock(&self.inner).clone()
    }

    #[must_use]
    pub fn id(&self) -> Option<ProjectId> {
        lock(&self.inner).id.clone()
    }

    pub fn replace(&self, record: ProjectRecord) {
        *lock(&self.inner) = record;
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ProjectRecord) -> R) -> R {
        f(&mut lock(&self.inner))
    }
}

mod thumbnail_base64 {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => {
                serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| {
                base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}
