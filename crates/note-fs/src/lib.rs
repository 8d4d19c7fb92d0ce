//! Path naming and frontmatter utilities for hierarchical note stores
//!
//! Notes live as flat files in a single root directory. The hierarchy is
//! encoded in the file name: `foo.one.two.md` is the note `foo.one.two`,
//! whose parent is `foo.one`. Every top-level name hangs off the implicit
//! `root` document.
//!
//! These are pure functions with no I/O; the engine crate does the file
//! access.

mod frontmatter;

pub use frontmatter::{
    build_with_frontmatter, parse_frontmatter, serialize_frontmatter, split_frontmatter,
    Frontmatter, FrontmatterError, ParseOutcome,
};

use serde::{Deserialize, Serialize};

/// Separator between path segments.
pub const SEPARATOR: char = '.';

/// Name of the zero-depth document every hierarchy hangs from.
pub const ROOT_FNAME: &str = "root";

/// Independent uniqueness domain for path names.
///
/// The same `fname` may exist once per namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Note,
    Schema,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Note, Namespace::Schema];

    /// File suffix for documents in this namespace
    pub fn extension(&self) -> &'static str {
        match self {
            Namespace::Note => ".md",
            Namespace::Schema => ".schema.yml",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Note => "note",
            Namespace::Schema => "schema",
        }
    }

    /// Classify a directory entry name.
    ///
    /// Returns the namespace and the name with the suffix stripped, or None
    /// for hidden files and files that belong to no namespace.
    pub fn classify(file_name: &str) -> Option<(Namespace, &str)> {
        if file_name.starts_with('.') {
            return None;
        }
        // Schema first: "x.schema.yml" must not be read as anything else
        for ns in [Namespace::Schema, Namespace::Note] {
            if let Some(stem) = file_name.strip_suffix(ns.extension()) {
                if stem.is_empty() {
                    return None;
                }
                return Some((ns, stem));
            }
        }
        None
    }

    /// File name backing `fname` in this namespace
    pub fn file_name(&self, fname: &str) -> String {
        format!("{}{}", fname, self.extension())
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Namespace {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "note" => Ok(Namespace::Note),
            "schema" => Ok(Namespace::Schema),
            other => Err(format!("unknown namespace: {}", other)),
        }
    }
}

/// Normalize a path query or reference
///
/// Accepts:
/// - Plain name: "foo.one"
/// - Wiki link: "[[foo.one]]"
/// - File name: "foo.one.md" / "foo.schema.yml"
///
/// An empty query means the root.
pub fn normalize_query(query: &str) -> String {
    let mut normalized = query.trim();

    if normalized.starts_with("[[") && normalized.ends_with("]]") && normalized.len() >= 4 {
        normalized = normalized[2..normalized.len() - 2].trim();
    }

    for ns in [Namespace::Schema, Namespace::Note] {
        if let Some(stripped) = normalized.strip_suffix(ns.extension()) {
            normalized = stripped;
            break;
        }
    }

    if normalized.is_empty() {
        ROOT_FNAME.to_string()
    } else {
        normalized.to_string()
    }
}

/// Validate a hierarchical name
///
/// Names must be non-empty, have no empty segments, and must not contain
/// path separators or control characters since they map 1:1 onto a file in
/// the root directory.
pub fn validate_fname(fname: &str) -> Result<String, FnameError> {
    let clean = fname.trim();

    if clean.is_empty() {
        return Err(FnameError::Empty);
    }
    if clean.contains(['/', '\\']) {
        return Err(FnameError::PathSeparator);
    }
    if clean.chars().any(|c| c.is_control()) {
        return Err(FnameError::ControlCharacter);
    }
    if clean.split(SEPARATOR).any(|segment| segment.is_empty()) {
        return Err(FnameError::EmptySegment);
    }

    Ok(clean.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum FnameError {
    Empty,
    EmptySegment,
    PathSeparator,
    ControlCharacter,
}

impl std::fmt::Display for FnameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FnameError::Empty => write!(f, "Name is empty"),
            FnameError::EmptySegment => write!(f, "Name contains an empty segment"),
            FnameError::PathSeparator => write!(f, "Name contains a path separator"),
            FnameError::ControlCharacter => write!(f, "Name contains a control character"),
        }
    }
}

impl std::error::Error for FnameError {}

pub fn is_root(fname: &str) -> bool {
    fname == ROOT_FNAME
}

/// Number of segments below the root (`root` is 0, `foo` is 1).
pub fn depth(fname: &str) -> usize {
    if is_root(fname) {
        0
    } else {
        fname.split(SEPARATOR).count()
    }
}

/// Name of the parent document, or None for the root.
pub fn parent_fname(fname: &str) -> Option<&str> {
    if is_root(fname) {
        return None;
    }
    match fname.rfind(SEPARATOR) {
        Some(pos) => Some(&fname[..pos]),
        None => Some(ROOT_FNAME),
    }
}

/// All ancestors from the immediate parent up to and including the root.
pub fn ancestors(fname: &str) -> Vec<&str> {
    let mut chain = Vec::new();
    let mut current = fname;
    while let Some(parent) = parent_fname(current) {
        chain.push(parent);
        current = parent;
    }
    chain
}

/// Last path segment, used as the default title.
pub fn last_segment(fname: &str) -> &str {
    fname.rsplit(SEPARATOR).next().unwrap_or(fname)
}

/// Whether `fname` lies strictly below `ancestor` in the hierarchy.
pub fn is_descendant_of(fname: &str, ancestor: &str) -> bool {
    if is_root(ancestor) {
        return !is_root(fname);
    }
    fname.len() > ancestor.len()
        && fname.starts_with(ancestor)
        && fname[ancestor.len()..].starts_with(SEPARATOR)
}
