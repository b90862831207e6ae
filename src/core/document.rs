//! Documents and their on-disk encoding.
//!
//! A document is one file addressed by a repository-relative path. JSON
//! documents carry optional `timestamp`, `owner`, `category` and `content`
//! string keys; every other key (including a non-string `timestamp`) is kept
//! verbatim in an extension map. Any other extension is a text document whose
//! raw text is the content.
//!
//! A decoded document remembers the bytes it came from and `encode` hands
//! them back unchanged until the document is modified.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::hash::ContentHash;
use super::time::{Timestamp, TimestampError};
use crate::error::Transience;

const TIMESTAMP_KEY: &str = "timestamp";
const OWNER_KEY: &str = "owner";
const CATEGORY_KEY: &str = "category";
const CONTENT_KEY: &str = "content";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DocumentError {
    #[error("invalid document path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("document {path} is not valid UTF-8")]
    InvalidUtf8 { path: DocPath },

    #[error("document {path} is not valid JSON: {source}")]
    Json {
        path: DocPath,
        #[source]
        source: serde_json::Error,
    },
}

impl DocumentError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }
}

/// Repository-relative, `/`-separated path of a document.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

impl DocPath {
    pub fn new(raw: impl Into<String>) -> Result<Self, DocumentError> {
        let raw = raw.into();
        let normalized = raw.replace('\\', "/");
        let invalid = |reason| DocumentError::InvalidPath {
            path: raw.clone(),
            reason,
        };
        if normalized.is_empty() {
            return Err(invalid("empty path"));
        }
        if normalized.starts_with('/') {
            return Err(invalid("path must be relative"));
        }
        for segment in normalized.split('/') {
            match segment {
                "" => return Err(invalid("empty path segment")),
                "." | ".." => return Err(invalid("dot segments are not allowed")),
                ".git" => return Err(invalid("path points inside .git")),
                _ => {}
            }
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        name.rsplit_once('.')
            .and_then(|(stem, ext)| (!stem.is_empty()).then_some(ext))
    }

    /// Parent directory, or `None` for a top-level file.
    pub fn parent(&self) -> Option<DocPath> {
        self.0
            .rsplit_once('/')
            .map(|(dir, _)| DocPath(dir.to_string()))
    }

    pub fn join(&self, name: &str) -> Result<DocPath, DocumentError> {
        DocPath::new(format!("{}/{}", self.0, name))
    }

    /// Whether `self` lies under the directory `dir`.
    pub fn starts_with(&self, dir: &DocPath) -> bool {
        self.0
            .strip_prefix(dir.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, seg| acc.join(seg))
    }

    pub fn format(&self) -> DocumentFormat {
        match self.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Text,
        }
    }
}

impl TryFrom<String> for DocPath {
    type Error = DocumentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        DocPath::new(value)
    }
}

impl From<DocPath> for String {
    fn from(value: DocPath) -> Self {
        value.0
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocPath({})", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    Json,
    Text,
}

/// Logical stream a document belongs to: `(owner, category)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamKey {
    pub owner: Option<String>,
    pub category: Option<String>,
}

impl StreamKey {
    pub fn new(owner: Option<String>, category: Option<String>) -> Self {
        Self { owner, category }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.owner.as_deref().unwrap_or("*"),
            self.category.as_deref().unwrap_or("*")
        )
    }
}

static NO_CONTENT: Value = Value::Null;

#[derive(Clone, Debug)]
pub struct Document {
    path: DocPath,
    format: DocumentFormat,
    timestamp: Option<String>,
    owner: Option<String>,
    category: Option<String>,
    /// `Some(Value::Null)` is an explicit `"content": null`.
    content: Option<Value>,
    extra: BTreeMap<String, Value>,
    /// JSON root was not an object; `content` holds the whole value.
    bare: bool,
    raw: Option<Vec<u8>>,
}

// Two documents are equal when they say the same thing, however they were
// spelled on disk.
impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
            && self.format == other.format
            && self.timestamp == other.timestamp
            && self.owner == other.owner
            && self.category == other.category
            && self.content == other.content
            && self.extra == other.extra
            && self.bare == other.bare
    }
}

impl Document {
    /// A null `content` means the document has no content key.
    pub fn json(path: DocPath, content: Value) -> Self {
        Self {
            path,
            format: DocumentFormat::Json,
            timestamp: None,
            owner: None,
            category: None,
            content: (!content.is_null()).then_some(content),
            extra: BTreeMap::new(),
            bare: false,
            raw: None,
        }
    }

    pub fn text(path: DocPath, text: impl Into<String>) -> Self {
        Self {
            path,
            format: DocumentFormat::Text,
            timestamp: None,
            owner: None,
            category: None,
            content: Some(Value::String(text.into())),
            extra: BTreeMap::new(),
            bare: false,
            raw: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self.touched()
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self.touched()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self.touched()
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self.touched()
    }

    /// Same document at another path. The format follows the new path.
    pub fn relocated(mut self, path: DocPath) -> Self {
        if path.format() != self.format {
            self.format = path.format();
            self.raw = None;
        }
        self.path = path;
        self
    }

    fn touched(mut self) -> Self {
        self.raw = None;
        self.bare = false;
        self
    }

    pub fn decode(path: DocPath, bytes: &[u8]) -> Result<Self, DocumentError> {
        match path.format() {
            DocumentFormat::Text => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| DocumentError::InvalidUtf8 { path: path.clone() })?;
                let mut doc = Self::text(path, text);
                doc.raw = Some(bytes.to_vec());
                Ok(doc)
            }
            DocumentFormat::Json => {
                let value: Value = serde_json::from_slice(bytes).map_err(|source| {
                    DocumentError::Json {
                        path: path.clone(),
                        source,
                    }
                })?;
                let mut doc = Self::from_json_value(path, value);
                doc.raw = Some(bytes.to_vec());
                Ok(doc)
            }
        }
    }

    fn from_json_value(path: DocPath, value: Value) -> Self {
        let Value::Object(mut map) = value else {
            let mut doc = Self::json(path, Value::Null);
            doc.content = Some(value);
            doc.bare = true;
            return doc;
        };
        let timestamp = take_string(&mut map, TIMESTAMP_KEY);
        let owner = take_string(&mut map, OWNER_KEY);
        let category = take_string(&mut map, CATEGORY_KEY);
        let content = map.remove(CONTENT_KEY);
        Self {
            path,
            format: DocumentFormat::Json,
            timestamp,
            owner,
            category,
            content,
            extra: map.into_iter().collect(),
            bare: false,
            raw: None,
        }
    }

    /// The bytes this document was decoded from, or a fresh encoding when it
    /// was built in memory or modified since.
    pub fn encode(&self) -> Vec<u8> {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        match self.format {
            DocumentFormat::Text => match self.content() {
                Value::String(text) => text.clone().into_bytes(),
                Value::Null => Vec::new(),
                other => other.to_string().into_bytes(),
            },
            DocumentFormat::Json => {
                let mut out = serde_json::to_vec_pretty(&self.to_json_value()).unwrap_or_default();
                out.push(b'\n');
                out
            }
        }
    }

    pub fn to_json_value(&self) -> Value {
        if self.bare {
            return self.content().clone();
        }
        let mut map: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(ts) = &self.timestamp {
            map.insert(TIMESTAMP_KEY.into(), Value::String(ts.clone()));
        }
        if let Some(owner) = &self.owner {
            map.insert(OWNER_KEY.into(), Value::String(owner.clone()));
        }
        if let Some(category) = &self.category {
            map.insert(CATEGORY_KEY.into(), Value::String(category.clone()));
        }
        if let Some(content) = &self.content {
            map.insert(CONTENT_KEY.into(), content.clone());
        }
        Value::Object(map)
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    pub fn format(&self) -> DocumentFormat {
        self.format
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn parsed_timestamp(&self) -> Option<Result<Timestamp, TimestampError>> {
        self.timestamp.as_deref().map(Timestamp::parse)
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// `Null` when the document has no content.
    pub fn content(&self) -> &Value {
        self.content.as_ref().unwrap_or(&NO_CONTENT)
    }

    pub fn extra(&self) -> &BTreeMap<String, Value> {
        &self.extra
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.owner.clone(), self.category.clone())
    }

    /// Hash of everything except the path and the timestamp.
    pub fn content_hash(&self) -> ContentHash {
        let extra: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ContentHash::of_json(&serde_json::json!({
            "owner": self.owner,
            "category": self.category,
            "content": self.content(),
            "extra": extra,
        }))
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            map.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> DocPath {
        DocPath::new(raw).unwrap()
    }

    #[test]
    fn doc_path_rejects_escapes() {
        for raw in ["", "/etc/passwd", "a/../b", "./a", "a//b", ".git/config"] {
            assert!(DocPath::new(raw).is_err(), "{raw:?} should be rejected");
        }
        let p = path("memory/music/alice.json");
        assert_eq!(p.file_name(), "alice.json");
        assert_eq!(p.extension(), Some("json"));
        assert_eq!(p.parent(), Some(path("memory/music")));
        assert!(p.starts_with(&path("memory")));
        assert!(!p.starts_with(&path("mem")));
        assert_eq!(path(".env").extension(), None);
    }

    #[test]
    fn json_document_keeps_extension_keys() {
        let raw = br#"{"timestamp":"2025-06-11T10:00:00Z","owner":"alice","category":"music","content":{"summary":"s"},"mood":"calm"}"#;
        let doc = Document::decode(path("memo/alice.json"), raw).unwrap();
        assert_eq!(doc.timestamp(), Some("2025-06-11T10:00:00Z"));
        assert_eq!(doc.owner(), Some("alice"));
        assert_eq!(doc.category(), Some("music"));
        assert_eq!(doc.content(), &json!({"summary": "s"}));
        assert_eq!(doc.extra().get("mood"), Some(&json!("calm")));

        let reparsed = Document::decode(doc.path().clone(), &doc.encode()).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn non_string_metadata_stays_in_extension_map() {
        let raw = br#"{"owner":7,"timestamp":12}"#;
        let doc = Document::decode(path("a.json"), raw).unwrap();
        assert_eq!(doc.owner(), None);
        assert_eq!(doc.extra().get("owner"), Some(&json!(7)));
        assert_eq!(doc.timestamp(), None);
        assert_eq!(doc.extra().get("timestamp"), Some(&json!(12)));
        assert_eq!(doc.to_json_value(), json!({"owner": 7, "timestamp": 12}));
    }

    #[test]
    fn decoded_bytes_are_encoded_unchanged() {
        let raw = b"{\"timestamp\":1718100000,\"content\":null,\"note\":\"x\"}";
        let doc = Document::decode(path("a.json"), raw).unwrap();
        assert_eq!(doc.encode(), raw);
        assert_eq!(
            doc.to_json_value(),
            json!({"timestamp": 1718100000, "content": null, "note": "x"})
        );

        let touched = doc.with_owner("alice");
        assert_eq!(
            serde_json::from_slice::<Value>(&touched.encode()).unwrap(),
            json!({"timestamp": 1718100000, "content": null, "note": "x", "owner": "alice"})
        );
    }

    #[test]
    fn non_object_root_is_not_wrapped() {
        let doc = Document::decode(path("list.json"), b"[1, 2]").unwrap();
        assert_eq!(doc.content(), &json!([1, 2]));
        assert_eq!(doc.to_json_value(), json!([1, 2]));
        assert_eq!(doc.encode(), b"[1, 2]");
    }

    #[test]
    fn text_document_has_no_timestamp() {
        let doc = Document::decode(path("whiteboard.md"), b"# notes\n").unwrap();
        assert_eq!(doc.format(), DocumentFormat::Text);
        assert!(doc.parsed_timestamp().is_none());
        assert_eq!(doc.encode(), b"# notes\n");
    }

    #[test]
    fn content_hash_ignores_timestamp_but_not_content() {
        let base = Document::json(path("a.json"), json!({"body": "x"})).with_owner("alice");
        let early = base.clone().with_timestamp("2025-01-01T00:00:00Z");
        let late = base.clone().with_timestamp("2025-02-01T00:00:00Z");
        assert_eq!(early.content_hash(), late.content_hash());

        let changed = Document::json(path("a.json"), json!({"body": "y"})).with_owner("alice");
        assert_ne!(base.content_hash(), changed.content_hash());
    }

    #[test]
    fn invalid_json_is_an_error() {
        let err = Document::decode(path("a.json"), b"{not json").unwrap_err();
        assert!(matches!(err, DocumentError::Json { .. }));
    }
}
