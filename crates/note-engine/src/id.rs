//! DocId: stable identifier for a document, and the allocator that mints them.
//!
//! Ids are opaque strings. Freshly minted ids are UUID v4, but any id read
//! from disk is accepted as long as it is well-formed, so hand-written ids
//! such as `foo` survive unchanged.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest id accepted from disk.
pub const MAX_ID_LEN: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Id is empty")]
    Empty,
    #[error("Id is {0} characters long (max 64)")]
    TooLong(usize),
    #[error("Id contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Unique identifier of a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocId(String);

impl DocId {
    /// Generate a new random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DocId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        let len = s.chars().count();
        if len > MAX_ID_LEN {
            return Err(IdError::TooLong(len));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(IdError::InvalidChar(c));
        }
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for DocId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DocId> for String {
    fn from(id: DocId) -> String {
        id.0
    }
}

/// Hands out ids that are unique for the lifetime of one engine.
///
/// Every id the allocator has minted or been told about is remembered, so
/// an id is never handed out twice even after its document is deleted.
#[derive(Debug, Default)]
pub struct IdAllocator {
    seen: HashSet<DocId>,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh id.
    pub fn allocate(&mut self) -> DocId {
        loop {
            let id = DocId::generate();
            if self.seen.insert(id.clone()) {
                return id;
            }
        }
    }

    /// Record an id that came from outside (disk or a caller).
    pub fn claim(&mut self, id: &DocId) {
        self.seen.insert(id.clone());
    }

    pub fn has_seen(&self, id: &DocId) -> bool {
        self.seen.contains(id)
    }
}
