//! Field-level changes proposed by the model.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::{diff_lines_with_limit, EditScript};
use crate::document::{Document, DocumentError, FieldPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Set,
    Append,
    Remove,
    Move,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "set",
            Operation::Append => "append",
            Operation::Remove => "remove",
            Operation::Move => "move",
        }
    }
}

/// What a change targets. Only plain fields may be rejected one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Field,
    Document,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub path: String,
    pub operation: Operation,
    #[serde(default)]
    pub resource: ResourceKind,
    #[serde(default)]
    pub before: Option<Value>,
    #[serde(default)]
    pub after: Option<Value>,
    /// Set by `apply` when the write had to create missing parents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<CreatedAncestor>,
}

/// The shallowest container a write brought into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedAncestor {
    /// Number of leading path segments that locate it.
    pub depth: usize,
    /// It replaced an explicit null rather than a missing key.
    #[serde(default)]
    pub was_null: bool,
}

impl DiffItem {
    pub fn new(
        path: impl Into<String>,
        operation: Operation,
        before: Option<Value>,
        after: Option<Value>,
    ) -> Self {
        Self {
            id: None,
            path: path.into(),
            operation,
            resource: ResourceKind::Field,
            before,
            after,
            created: None,
        }
    }

    pub fn set(path: impl Into<String>, before: Option<Value>, after: Value) -> Self {
        Self::new(path, Operation::Set, before, Some(after))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_resource(mut self, resource: ResourceKind) -> Self {
        self.resource = resource;
        self
    }

    /// Stable key: the explicit id, or `path:operation`.
    pub fn key(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!("{}:{}", self.path, self.operation.as_str()),
        }
    }

    pub fn before_text(&self) -> String {
        value_text(self.before.as_ref())
    }

    pub fn after_text(&self) -> String {
        value_text(self.after.as_ref())
    }

    pub fn diff(&self, max_lines: usize) -> EditScript {
        diff_lines_with_limit(&self.before_text(), &self.after_text(), max_lines)
    }

    fn field_path(&self) -> Result<FieldPath, DocumentError> {
        FieldPath::parse(&self.path)
    }

    /// Write this change into the document, remembering any parent
    /// containers the write creates so `revert` can take them away again.
    pub fn apply<D: Document + ?Sized>(&mut self, doc: &mut D) -> Result<(), DocumentError> {
        let path = self.field_path()?;
        let creates_parents = match self.operation {
            Operation::Set | Operation::Move => self.after.is_some(),
            Operation::Append => true,
            Operation::Remove => false,
        };
        let created = if creates_parents {
            missing_ancestor(doc, &path)
        } else {
            None
        };

        self.write(doc, &path)?;
        self.created = created;
        Ok(())
    }

    fn write<D: Document + ?Sized>(
        &self,
        doc: &mut D,
        path: &FieldPath,
    ) -> Result<(), DocumentError> {
        match self.operation {
            Operation::Set | Operation::Move => match &self.after {
                Some(value) => doc.set(path, value.clone()),
                None => doc.remove(path).map(drop),
            },
            Operation::Append => {
                let value = self.after.clone().unwrap_or(Value::Null);
                doc.insert(path, value)
            }
            Operation::Remove => doc.remove(path).map(drop),
        }
    }

    /// Undo this change, restoring `before`.
    pub fn revert<D: Document + ?Sized>(&self, doc: &mut D) -> Result<(), DocumentError> {
        let path = self.field_path()?;
        match self.operation {
            Operation::Set | Operation::Move => match &self.before {
                Some(value) => doc.set(&path, value.clone()),
                None => doc.remove(&path).map(drop),
            },
            Operation::Append => doc.remove(&path).map(drop),
            Operation::Remove => match &self.before {
                Some(value) => doc.insert(&path, value.clone()),
                None => Ok(()),
            },
        }?;
        self.remove_created(doc, &path)
    }

    fn remove_created<D: Document + ?Sized>(
        &self,
        doc: &mut D,
        path: &FieldPath,
    ) -> Result<(), DocumentError> {
        let Some(created) = self.created else {
            return Ok(());
        };
        let ancestor = path.prefix(created.depth);
        // Left alone once something else has been written into it
        if !doc.get(&ancestor).is_some_and(|value| is_hollow(&value)) {
            return Ok(());
        }
        if created.was_null {
            doc.set(&ancestor, Value::Null)
        } else {
            doc.remove(&ancestor).map(drop)
        }
    }
}

/// Shallowest proper ancestor of `path` that is missing or null.
fn missing_ancestor<D>(doc: &D, path: &FieldPath) -> Option<CreatedAncestor>
where
    D: Document + ?Sized,
{
    (0..path.segments().len()).find_map(|depth| match doc.get(&path.prefix(depth)) {
        None => Some(CreatedAncestor {
            depth,
            was_null: false,
        }),
        Some(Value::Null) => Some(CreatedAncestor {
            depth,
            was_null: true,
        }),
        Some(_) => None,
    })
}

/// Containers holding nothing but other empty containers.
fn is_hollow(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.values().all(is_hollow),
        Value::Array(items) => items.iter().all(is_hollow),
        _ => false,
    }
}

/// Text used for diffing a value: nothing for absent or null, strings
/// verbatim, everything else as pretty JSON.
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::JsonDocument;
    use serde_json::json;

    #[test]
    fn key_defaults_to_path_and_operation() {
        let item = DiffItem::set("data.name", None, json!("Aria"));
        assert_eq!(item.key(), "data.name:set");
        assert_eq!(item.with_id("c-1").key(), "c-1");
    }

    #[test]
    fn value_text_normalization() {
        assert_eq!(value_text(None), "");
        assert_eq!(value_text(Some(&Value::Null)), "");
        assert_eq!(value_text(Some(&json!("a\nb"))), "a\nb");
        assert_eq!(value_text(Some(&json!(["x", "y"]))), "[\n  \"x\",\n  \"y\"\n]");
        assert_eq!(value_text(Some(&json!(3))), "3");
    }

    #[test]
    fn deserializes_with_defaults() {
        let item: DiffItem = serde_json::from_value(json!({
            "path": "data.tags[0]",
            "operation": "append",
            "after": "brave"
        }))
        .unwrap();
        assert_eq!(item.operation, Operation::Append);
        assert_eq!(item.resource, ResourceKind::Field);
        assert_eq!(item.before, None);
        assert_eq!(item.key(), "data.tags[0]:append");
    }

    #[test]
    fn set_apply_and_revert() {
        let mut doc = JsonDocument::new(json!({"data": {"name": "Aria"}}));
        let mut item = DiffItem::set("data.name", Some(json!("Aria")), json!("Bree"));

        item.apply(&mut doc).unwrap();
        assert_eq!(doc.root()["data"]["name"], "Bree");
        item.revert(&mut doc).unwrap();
        assert_eq!(doc.root(), &json!({"data": {"name": "Aria"}}));
    }

    #[test]
    fn set_of_new_field_reverts_to_absent() {
        let original = json!({"data": {}});
        let mut doc = JsonDocument::new(original.clone());
        let mut item = DiffItem::set("data.creator", None, json!("me"));

        item.apply(&mut doc).unwrap();
        item.revert(&mut doc).unwrap();
        assert_eq!(doc.root(), &original);
    }

    #[test]
    fn append_and_remove_round_trip() {
        let original = json!({"tags": ["a", "b"]});
        let mut doc = JsonDocument::new(original.clone());

        let mut append = DiffItem::new("tags[1]", Operation::Append, None, Some(json!("x")));
        append.apply(&mut doc).unwrap();
        assert_eq!(doc.root()["tags"], json!(["a", "x", "b"]));
        append.revert(&mut doc).unwrap();
        assert_eq!(doc.root(), &original);

        let mut remove = DiffItem::new("tags[0]", Operation::Remove, Some(json!("a")), None);
        remove.apply(&mut doc).unwrap();
        assert_eq!(doc.root()["tags"], json!(["b"]));
        remove.revert(&mut doc).unwrap();
        assert_eq!(doc.root(), &original);
    }

    #[test]
    fn set_under_missing_parents_reverts_them_too() {
        let original = json!({"data": {"name": "Aria"}});
        let mut doc = JsonDocument::new(original.clone());
        let mut item = DiffItem::set("data.extensions.depth_prompt.prompt", None, json!("x"));

        item.apply(&mut doc).unwrap();
        assert_eq!(doc.root()["data"]["extensions"]["depth_prompt"]["prompt"], "x");
        assert_eq!(
            item.created,
            Some(CreatedAncestor {
                depth: 2,
                was_null: false
            })
        );
        item.revert(&mut doc).unwrap();
        assert_eq!(doc.root(), &original);
    }

    #[test]
    fn null_parent_is_restored_as_null() {
        let original = json!({"data": {"extensions": null}});
        let mut doc = JsonDocument::new(original.clone());
        let mut item = DiffItem::set("data.extensions.mood", None, json!("calm"));

        item.apply(&mut doc).unwrap();
        item.revert(&mut doc).unwrap();
        assert_eq!(doc.root(), &original);
    }

    #[test]
    fn created_parent_with_other_content_is_kept() {
        let mut doc = JsonDocument::new(json!({"data": {}}));
        let mut item = DiffItem::set("data.extensions.mood", None, json!("calm"));
        item.apply(&mut doc).unwrap();
        doc.set(&"data.extensions.other".parse().unwrap(), json!(1)).unwrap();

        item.revert(&mut doc).unwrap();
        assert_eq!(doc.root(), &json!({"data": {"extensions": {"other": 1}}}));
    }

    #[test]
    fn diff_uses_normalized_text() {
        let item = DiffItem::set("data.description", Some(json!("a\nb")), json!("a\nc"));
        assert_eq!(item.diff(400).stats(), (1, 1));
    }
}
