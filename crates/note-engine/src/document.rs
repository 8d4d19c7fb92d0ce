//! Document: a single node of the hierarchy, real or stub.
//!
//! A document on disk is a metadata block followed by the body:
//! - `id`, `title`, `created`, `updated` populate the typed fields
//! - any other key is kept in `custom` and written back unchanged
//!
//! `parent` and `children` are derived links maintained by the reconciler;
//! they are never read from or written to disk.

use note_fs::{
    build_with_frontmatter, is_root, last_segment, parse_frontmatter, Frontmatter,
    FrontmatterError, Namespace, ParseOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeSet;
use thiserror::Error;
use web_time::{SystemTime, UNIX_EPOCH};

use crate::id::DocId;

const KEY_ID: &str = "id";
const KEY_TITLE: &str = "title";
const KEY_CREATED: &str = "created";
const KEY_UPDATED: &str = "updated";
const KNOWN_KEYS: [&str; 4] = [KEY_ID, KEY_TITLE, KEY_CREATED, KEY_UPDATED];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] FrontmatterError),
}

/// A single-document rule that does not hold.
#[derive(Debug, Error, PartialEq)]
pub enum InvariantViolation {
    #[error("stub '{0}' has a body")]
    StubWithBody(String),
    #[error("stub '{0}' carries custom metadata")]
    StubWithMetadata(String),
    #[error("root '{0}' has a parent")]
    RootWithParent(String),
    #[error("'{0}' has no parent")]
    MissingParent(String),
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub fname: String,
    pub namespace: Namespace,
    pub title: String,
    pub created: i64,
    pub updated: i64,
    pub body: String,
    /// True when the node only holds the hierarchy together and has no file
    pub stub: bool,
    #[serde(default, skip_serializing_if = "Frontmatter::is_empty")]
    pub custom: Frontmatter,
    #[serde(default)]
    pub parent: Option<DocId>,
    #[serde(default)]
    pub children: BTreeSet<DocId>,
}

impl Document {
    /// Create a new, not yet persisted document with a generated id.
    pub fn new(namespace: Namespace, fname: &str) -> Self {
        let now = now_millis();
        Self {
            id: DocId::generate(),
            fname: fname.to_string(),
            namespace,
            title: last_segment(fname).to_string(),
            created: now,
            updated: now,
            body: String::new(),
            stub: false,
            custom: Frontmatter::new(),
            parent: None,
            children: BTreeSet::new(),
        }
    }

    /// Create a placeholder node for `fname`.
    pub fn new_stub(namespace: Namespace, fname: &str, id: DocId, now: i64) -> Self {
        Self {
            id,
            fname: fname.to_string(),
            namespace,
            title: last_segment(fname).to_string(),
            created: now,
            updated: now,
            body: String::new(),
            stub: true,
            custom: Frontmatter::new(),
            parent: None,
            children: BTreeSet::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Name of the backing file in the store root
    pub fn file_name(&self) -> String {
        self.namespace.file_name(&self.fname)
    }

    pub fn is_root(&self) -> bool {
        is_root(&self.fname)
    }

    /// Turn this node into a stub in place, keeping id, name and title.
    pub fn demote(&mut self) {
        self.stub = true;
        self.body.clear();
        self.custom.clear();
    }

    /// Serialize to the on-disk form.
    ///
    /// Always emits a metadata block. Keys are written in a fixed order so
    /// the same document always produces the same bytes.
    pub fn serialize(&self) -> Result<String, DocumentError> {
        let mut entries: Vec<(String, JsonValue)> = vec![
            (KEY_ID.to_string(), JsonValue::String(self.id.to_string())),
            (KEY_TITLE.to_string(), JsonValue::String(self.title.clone())),
            (KEY_CREATED.to_string(), JsonValue::Number(self.created.into())),
            (KEY_UPDATED.to_string(), JsonValue::Number(self.updated.into())),
        ];
        entries.extend(
            self.custom
                .iter()
                .filter(|(k, _)| !KNOWN_KEYS.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        Ok(build_with_frontmatter(&entries, &self.body)?)
    }

    /// Check the rules that hold for a document on its own.
    ///
    /// Links are only checked for presence; whether they point at the right
    /// nodes is a property of the whole tree.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.stub && !self.body.is_empty() {
            return Err(InvariantViolation::StubWithBody(self.fname.clone()));
        }
        if self.stub && !self.custom.is_empty() {
            return Err(InvariantViolation::StubWithMetadata(self.fname.clone()));
        }
        if self.is_root() && self.parent.is_some() {
            return Err(InvariantViolation::RootWithParent(self.fname.clone()));
        }
        if !self.is_root() && self.parent.is_none() {
            return Err(InvariantViolation::MissingParent(self.fname.clone()));
        }
        Ok(())
    }
}

/// How the metadata block of a file was read.
#[derive(Debug, Clone, PartialEq)]
pub enum RawFormat {
    WithMetadata,
    BodyOnly,
    /// The block was unreadable and the whole file became the body
    Recovered { reason: String },
}

/// Fields read from a file, before identity and defaults are settled.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub id: Option<String>,
    pub title: Option<String>,
    pub created: Option<i64>,
    pub updated: Option<i64>,
    pub custom: Frontmatter,
    pub body: String,
    pub format: RawFormat,
}

impl RawDocument {
    /// Parse raw file content. Never fails.
    pub fn parse(raw: &str) -> Self {
        let outcome = parse_frontmatter(raw);
        let body = outcome.body().to_string();

        let format = match &outcome {
            ParseOutcome::WithMetadata { .. } => RawFormat::WithMetadata,
            ParseOutcome::BodyOnly { .. } => RawFormat::BodyOnly,
            ParseOutcome::Recovered { reason, .. } => RawFormat::Recovered {
                reason: reason.clone(),
            },
        };

        let mut custom = outcome.into_metadata();
        let id = custom.remove(KEY_ID).as_ref().and_then(id_value);
        let title = custom.remove(KEY_TITLE).and_then(|v| match v {
            JsonValue::String(s) => Some(s),
            _ => None,
        });
        let created = custom.remove(KEY_CREATED).as_ref().and_then(timestamp_value);
        let updated = custom.remove(KEY_UPDATED).as_ref().and_then(timestamp_value);

        Self {
            id,
            title,
            created,
            updated,
            custom,
            body,
            format,
        }
    }
}

fn id_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn timestamp_value(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
