//! Field locators and the minimal document interface the undo ledger needs.
//!
//! The card data model itself lives outside this crate. The ledger only has
//! to read, write, insert and delete values at dot/bracket locators such as
//! `data.character_book.entries[2].content`.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
    #[error("invalid field path '{0}'")]
    InvalidPath(String),
    #[error("no value at '{0}'")]
    MissingTarget(String),
    #[error("'{path}' is not {expected}")]
    TypeMismatch { path: String, expected: &'static str },
    #[error("index {index} out of bounds at '{path}'")]
    IndexOutOfBounds { path: String, index: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// Parsed dot/bracket locator. The empty locator addresses the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<PathSegment>,
}

impl FieldPath {
    pub fn root() -> Self {
        Self {
            raw: String::new(),
            segments: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DocumentError> {
        let invalid = || DocumentError::InvalidPath(raw.to_string());
        let mut segments = Vec::new();
        let mut key = String::new();
        let mut chars = raw.trim().chars().peekable();
        // True right after a closing bracket, where '.' or '[' must follow
        let mut after_bracket = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_bracket {
                        return Err(invalid());
                    }
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }
                    after_bracket = false;
                    if chars.peek().is_none() {
                        return Err(invalid());
                    }
                }
                '[' => {
                    if !key.is_empty() {
                        segments.push(PathSegment::Key(std::mem::take(&mut key)));
                    }
                    let mut inner = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == ']' {
                            closed = true;
                            break;
                        }
                        inner.push(c);
                    }
                    if !closed {
                        return Err(invalid());
                    }
                    segments.push(parse_bracket(inner.trim()).ok_or_else(invalid)?);
                    after_bracket = true;
                }
                ']' => return Err(invalid()),
                _ => {
                    if after_bracket {
                        return Err(invalid());
                    }
                    key.push(c);
                }
            }
        }
        if !key.is_empty() {
            segments.push(PathSegment::Key(key));
        }

        Ok(Self {
            raw: raw.trim().to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The locator made of the first `len` segments.
    pub fn prefix(&self, len: usize) -> FieldPath {
        let segments = self.segments[..len.min(self.segments.len())].to_vec();
        let mut raw = String::new();
        for segment in &segments {
            match segment {
                PathSegment::Key(key) if is_plain_key(key) => {
                    if !raw.is_empty() {
                        raw.push('.');
                    }
                    raw.push_str(key);
                }
                PathSegment::Key(key) => {
                    raw.push_str("[\"");
                    raw.push_str(key);
                    raw.push_str("\"]");
                }
                PathSegment::Index(index) => {
                    raw.push('[');
                    raw.push_str(&index.to_string());
                    raw.push(']');
                }
            }
        }
        Self { raw, segments }
    }
}

fn is_plain_key(key: &str) -> bool {
    !key.is_empty()
        && key.trim() == key
        && !key.contains(['.', '[', ']', '"', '\''])
}

fn parse_bracket(inner: &str) -> Option<PathSegment> {
    let quoted = inner
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| inner.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')));
    match quoted {
        Some(key) => Some(PathSegment::Key(key.to_string())),
        None => inner.parse::<usize>().ok().map(PathSegment::Index),
    }
}

impl FromStr for FieldPath {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldPath::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// What the ledger needs from the live document.
pub trait Document {
    fn get(&self, path: &FieldPath) -> Option<Value>;
    /// Write a value, replacing whatever is there.
    fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), DocumentError>;
    /// Insert a value; array positions shift the following elements.
    fn insert(&mut self, path: &FieldPath, value: Value) -> Result<(), DocumentError>;
    /// Delete the value at `path`, returning it if it existed.
    fn remove(&mut self, path: &FieldPath) -> Result<Option<Value>, DocumentError>;
}

/// A document backed by a JSON value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonDocument {
    root: Value,
}

impl JsonDocument {
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Value {
        &self.root
    }

    pub fn into_inner(self) -> Value {
        self.root
    }

    /// Walk to the parent of the last segment, creating missing objects
    /// along the way when `create` is set.
    fn parent_mut(&mut self, path: &FieldPath, create: bool) -> Result<&mut Value, DocumentError> {
        let segments = path.segments();
        let parents = &segments[..segments.len().saturating_sub(1)];
        let mut current = &mut self.root;

        for segment in parents {
            current = match segment {
                PathSegment::Key(key) => {
                    if create && current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    let map = current
                        .as_object_mut()
                        .ok_or_else(|| type_mismatch(path, "an object"))?;
                    if create {
                        map.entry(key.clone()).or_insert(Value::Null)
                    } else {
                        map.get_mut(key)
                            .ok_or_else(|| DocumentError::MissingTarget(path.to_string()))?
                    }
                }
                PathSegment::Index(index) => {
                    let items = current
                        .as_array_mut()
                        .ok_or_else(|| type_mismatch(path, "an array"))?;
                    items
                        .get_mut(*index)
                        .ok_or_else(|| out_of_bounds(path, *index))?
                }
            };
        }

        Ok(current)
    }
}

fn type_mismatch(path: &FieldPath, expected: &'static str) -> DocumentError {
    DocumentError::TypeMismatch {
        path: path.to_string(),
        expected,
    }
}

fn out_of_bounds(path: &FieldPath, index: usize) -> DocumentError {
    DocumentError::IndexOutOfBounds {
        path: path.to_string(),
        index,
    }
}

impl Document for JsonDocument {
    fn get(&self, path: &FieldPath) -> Option<Value> {
        let mut current = &self.root;
        for segment in path.segments() {
            current = match segment {
                PathSegment::Key(key) => current.get(key.as_str())?,
                PathSegment::Index(index) => current.get(*index)?,
            };
        }
        Some(current.clone())
    }

    fn set(&mut self, path: &FieldPath, value: Value) -> Result<(), DocumentError> {
        let Some(last) = path.segments().last() else {
            self.root = value;
            return Ok(());
        };
        let last = last.clone();
        let parent = self.parent_mut(path, true)?;

        match last {
            PathSegment::Key(key) => {
                if parent.is_null() {
                    *parent = Value::Object(Map::new());
                }
                parent
                    .as_object_mut()
                    .ok_or_else(|| type_mismatch(path, "an object"))?
                    .insert(key, value);
            }
            PathSegment::Index(index) => {
                let items = parent
                    .as_array_mut()
                    .ok_or_else(|| type_mismatch(path, "an array"))?;
                let len = items.len();
                if index < len {
                    items[index] = value;
                } else if index == len {
                    items.push(value);
                } else {
                    return Err(out_of_bounds(path, index));
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, path: &FieldPath, value: Value) -> Result<(), DocumentError> {
        match path.segments().last() {
            Some(PathSegment::Index(index)) => {
                let index = *index;
                let parent = self.parent_mut(path, true)?;
                if parent.is_null() {
                    *parent = Value::Array(Vec::new());
                }
                let items = parent
                    .as_array_mut()
                    .ok_or_else(|| type_mismatch(path, "an array"))?;
                let len = items.len();
                if index > len {
                    return Err(out_of_bounds(path, index));
                }
                items.insert(index, value);
                Ok(())
            }
            _ => self.set(path, value),
        }
    }

    fn remove(&mut self, path: &FieldPath) -> Result<Option<Value>, DocumentError> {
        let Some(last) = path.segments().last() else {
            return Ok(Some(std::mem::take(&mut self.root)));
        };
        let last = last.clone();
        let parent = match self.parent_mut(path, false) {
            Ok(parent) => parent,
            Err(DocumentError::MissingTarget(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        match last {
            PathSegment::Key(key) => Ok(parent.as_object_mut().and_then(|map| map.remove(&key))),
            PathSegment::Index(index) => {
                let items = parent
                    .as_array_mut()
                    .ok_or_else(|| type_mismatch(path, "an array"))?;
                let len = items.len();
                if index >= len {
                    return Err(out_of_bounds(path, index));
                }
                Ok(Some(items.remove(index)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> FieldPath {
        FieldPath::parse(raw).unwrap()
    }

    #[test]
    fn parse_dot_and_bracket_paths() {
        assert_eq!(
            path("data.character_book.entries[2].content").segments(),
            &[
                PathSegment::Key("data".into()),
                PathSegment::Key("character_book".into()),
                PathSegment::Key("entries".into()),
                PathSegment::Index(2),
                PathSegment::Key("content".into()),
            ]
        );
        assert_eq!(
            path("extensions[\"depth prompt\"]").segments(),
            &[
                PathSegment::Key("extensions".into()),
                PathSegment::Key("depth prompt".into()),
            ]
        );
        assert_eq!(
            path("tags[0][1]").segments(),
            &[
                PathSegment::Key("tags".into()),
                PathSegment::Index(0),
                PathSegment::Index(1),
            ]
        );
        assert!(path("").is_root());
    }

    #[test]
    fn reject_malformed_paths() {
        for raw in ["a..b", ".a", "a.", "a[", "a[x]", "a]b", "a[0]b", "a[-1]"] {
            assert!(FieldPath::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn get_set_remove_object_fields() {
        let mut doc = JsonDocument::new(json!({"data": {"name": "Aria"}}));
        assert_eq!(doc.get(&path("data.name")), Some(json!("Aria")));
        assert_eq!(doc.get(&path("data.missing")), None);

        doc.set(&path("data.description"), json!("A bard")).unwrap();
        assert_eq!(doc.get(&path("data.description")), Some(json!("A bard")));

        doc.set(&path("data.extensions.mood"), json!("calm")).unwrap();
        assert_eq!(doc.root()["data"]["extensions"]["mood"], "calm");

        assert_eq!(doc.remove(&path("data.name")).unwrap(), Some(json!("Aria")));
        assert_eq!(doc.remove(&path("data.name")).unwrap(), None);
        assert_eq!(doc.remove(&path("nothing.here")).unwrap(), None);
    }

    #[test]
    fn array_insert_and_remove_shift_elements() {
        let mut doc = JsonDocument::new(json!({"tags": ["a", "c"]}));
        doc.insert(&path("tags[1]"), json!("b")).unwrap();
        assert_eq!(doc.root()["tags"], json!(["a", "b", "c"]));

        doc.insert(&path("tags[3]"), json!("d")).unwrap();
        assert_eq!(doc.root()["tags"], json!(["a", "b", "c", "d"]));

        assert_eq!(doc.remove(&path("tags[0]")).unwrap(), Some(json!("a")));
        assert_eq!(doc.root()["tags"], json!(["b", "c", "d"]));

        assert!(matches!(
            doc.insert(&path("tags[9]"), json!("x")),
            Err(DocumentError::IndexOutOfBounds { index: 9, .. })
        ));
        assert!(doc.remove(&path("tags[9]")).is_err());
    }

    #[test]
    fn type_mismatches_are_errors() {
        let mut doc = JsonDocument::new(json!({"name": "Aria"}));
        assert!(matches!(
            doc.set(&path("name.first"), json!("x")),
            Err(DocumentError::TypeMismatch { .. })
        ));
        assert!(matches!(
            doc.set(&path("name[0]"), json!("x")),
            Err(DocumentError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn prefix_renders_a_parseable_locator() {
        let full = path("data[\"depth prompt\"].entries[2].content");
        let prefix = full.prefix(3);
        assert_eq!(prefix.as_str(), "data[\"depth prompt\"].entries");
        assert_eq!(FieldPath::parse(prefix.as_str()).unwrap(), prefix);
        assert_eq!(full.prefix(4).as_str(), "data[\"depth prompt\"].entries[2]");
        assert!(full.prefix(0).is_root());
        assert_eq!(full.prefix(9), full.prefix(5));
    }

    #[test]
    fn root_path_replaces_whole_document() {
        let mut doc = JsonDocument::new(json!({"a": 1}));
        doc.set(&FieldPath::root(), json!({"b": 2})).unwrap();
        assert_eq!(doc.root(), &json!({"b": 2}));
        assert_eq!(doc.get(&FieldPath::root()), Some(json!({"b": 2})));
    }
}
