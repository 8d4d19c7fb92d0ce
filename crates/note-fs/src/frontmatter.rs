//! YAML frontmatter parsing for note files
//!
//! Parses the metadata block at the start of a note or schema file:
//! ```markdown
//! ---
//! id: 4f1c2a9e-4b55-4d43-9a39-0c1f9d7e0b11
//! title: foo
//! created: 123
//! updated: 456
//! ---
//! Note content here...
//! ```
//!
//! Parsing never fails. A file without a block is all body, and a block
//! that isn't a YAML mapping is reported as [`ParseOutcome::Recovered`].

use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Parsed frontmatter as a map of string keys to JSON values.
/// Using JSON values allows flexible typing (strings, numbers, arrays, objects).
pub type Frontmatter = BTreeMap<String, JsonValue>;

/// Result of parsing a raw file.
///
/// Bodies borrow from the raw input to avoid unnecessary allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<'a> {
    /// A well-formed metadata block followed by the body
    WithMetadata {
        metadata: Frontmatter,
        body: &'a str,
    },
    /// No metadata block; the whole file is the body
    BodyOnly { body: &'a str },
    /// A metadata block was present but could not be read; the whole file is the body
    Recovered { body: &'a str, reason: String },
}

impl<'a> ParseOutcome<'a> {
    pub fn body(&self) -> &'a str {
        match self {
            ParseOutcome::WithMetadata { body, .. }
            | ParseOutcome::BodyOnly { body }
            | ParseOutcome::Recovered { body, .. } => body,
        }
    }

    /// Metadata, if the block parsed.
    pub fn metadata(&self) -> Option<&Frontmatter> {
        match self {
            ParseOutcome::WithMetadata { metadata, .. } => Some(metadata),
            _ => None,
        }
    }

    pub fn into_metadata(self) -> Frontmatter {
        match self {
            ParseOutcome::WithMetadata { metadata, .. } => metadata,
            _ => Frontmatter::new(),
        }
    }
}

/// Split a file into frontmatter YAML string and content, without parsing the YAML.
///
/// Returns (frontmatter_yaml, content) where frontmatter_yaml is None if
/// no delimited block was found.
pub fn split_frontmatter(raw: &str) -> (Option<&str>, &str) {
    // Frontmatter must start at the very beginning with ---
    if !raw.starts_with("---") {
        return (None, raw);
    }

    let after_opening = &raw[3..];

    // Skip the newline after opening ---
    let content_start = if let Some(rest) = after_opening.strip_prefix('\n') {
        rest
    } else if let Some(rest) = after_opening.strip_prefix("\r\n") {
        rest
    } else {
        // "---" followed by anything else is a thematic break, not a block
        return (None, raw);
    };

    match find_closing_delimiter(content_start) {
        Some((close_pos, close_len)) => {
            let yaml = &content_start[..close_pos];
            let content = &content_start[close_pos + close_len..];
            (Some(yaml), content)
        }
        None => (None, raw),
    }
}

/// Find the closing `---` line.
///
/// Returns the byte offset of the delimiter line and its length including
/// the line terminator, so the body starts right after it.
fn find_closing_delimiter(s: &str) -> Option<(usize, usize)> {
    let mut pos = 0;
    for line in s.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n').trim_end_matches('\r');
        if trimmed == "---" {
            return Some((pos, line.len()));
        }
        pos += line.len();
    }
    None
}

/// Parse a file's raw content into frontmatter and body.
pub fn parse_frontmatter(raw: &str) -> ParseOutcome<'_> {
    let (yaml_str, content) = split_frontmatter(raw);

    let Some(yaml) = yaml_str else {
        return ParseOutcome::BodyOnly { body: raw };
    };

    if yaml.trim().is_empty() {
        return ParseOutcome::WithMetadata {
            metadata: Frontmatter::new(),
            body: content,
        };
    }

    match serde_yaml::from_str::<serde_yaml::Value>(yaml) {
        Ok(value) => match yaml_to_json_map(value) {
            Some(metadata) => ParseOutcome::WithMetadata {
                metadata,
                body: content,
            },
            None => ParseOutcome::Recovered {
                body: raw,
                reason: "metadata block is not a mapping".to_string(),
            },
        },
        Err(e) => ParseOutcome::Recovered {
            body: raw,
            reason: e.to_string(),
        },
    }
}

/// Serialize ordered frontmatter entries to a YAML string.
///
/// Returns the YAML content without the surrounding `---` delimiters.
/// Entries are written in the order given.
pub fn serialize_frontmatter(entries: &[(String, JsonValue)]) -> Result<String, FrontmatterError> {
    let yaml_map: serde_yaml::Mapping = entries
        .iter()
        .map(|(k, v)| (serde_yaml::Value::String(k.clone()), json_to_yaml(v)))
        .collect();

    serde_yaml::to_string(&yaml_map).map_err(FrontmatterError::SerializationError)
}

/// Build a complete file with a frontmatter block and content.
///
/// The block is always emitted, even when `entries` is empty, so a file that
/// arrived without metadata gains one when written back.
pub fn build_with_frontmatter(
    entries: &[(String, JsonValue)],
    content: &str,
) -> Result<String, FrontmatterError> {
    let yaml = if entries.is_empty() {
        String::new()
    } else {
        serialize_frontmatter(entries)?
    };
    Ok(format!("---\n{}---\n{}", yaml, content))
}

/// Error type for frontmatter operations
#[derive(Debug)]
pub enum FrontmatterError {
    SerializationError(serde_yaml::Error),
}

impl std::fmt::Display for FrontmatterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrontmatterError::SerializationError(e) => {
                write!(f, "Failed to serialize frontmatter: {}", e)
            }
        }
    }
}

impl std::error::Error for FrontmatterError {}

/// Convert a JSON value to a YAML value
fn json_to_yaml(json: &JsonValue) -> serde_yaml::Value {
    match json {
        JsonValue::Null => serde_yaml::Value::Null,
        JsonValue::Bool(b) => serde_yaml::Value::Bool(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                serde_yaml::Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                serde_yaml::Value::Number(u.into())
            } else if let Some(f) = n.as_f64() {
                serde_yaml::Value::Number(f.into())
            } else {
                serde_yaml::Value::Null
            }
        }
        JsonValue::String(s) => serde_yaml::Value::String(s.clone()),
        JsonValue::Array(arr) => {
            serde_yaml::Value::Sequence(arr.iter().map(json_to_yaml).collect())
        }
        JsonValue::Object(obj) => {
            let map: serde_yaml::Mapping = obj
                .iter()
                .map(|(k, v)| (serde_yaml::Value::String(k.clone()), json_to_yaml(v)))
                .collect();
            serde_yaml::Value::Mapping(map)
        }
    }
}

/// Convert a top-level YAML value to a frontmatter map.
///
/// Returns None unless the value is a mapping. Non-string keys are dropped.
fn yaml_to_json_map(yaml: serde_yaml::Value) -> Option<Frontmatter> {
    match yaml {
        serde_yaml::Value::Mapping(map) => {
            let mut result = Frontmatter::new();
            for (k, v) in map {
                if let serde_yaml::Value::String(key) = k {
                    result.insert(key, yaml_to_json(v));
                }
            }
            Some(result)
        }
        serde_yaml::Value::Null => Some(Frontmatter::new()),
        _ => None,
    }
}

/// Convert a YAML value to a JSON value
fn yaml_to_json(yaml: serde_yaml::Value) -> JsonValue {
    match yaml {
        serde_yaml::Value::Null => JsonValue::Null,
        serde_yaml::Value::Bool(b) => JsonValue::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                JsonValue::Number(u.into())
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            } else {
                JsonValue::Null
            }
        }
        serde_yaml::Value::String(s) => JsonValue::String(s),
        serde_yaml::Value::Sequence(seq) => {
            JsonValue::Array(seq.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(map) => {
            let obj: serde_json::Map<String, JsonValue> = map
                .into_iter()
                .filter_map(|(k, v)| {
                    if let serde_yaml::Value::String(key) = k {
                        Some((key, yaml_to_json(v)))
                    } else {
                        None
                    }
                })
                .collect();
            JsonValue::Object(obj)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}
